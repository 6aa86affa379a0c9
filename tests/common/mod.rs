//! Currency ledger domain shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use mnemosyne::{
    AggregateState, Event, EventStorage, EventType, InMemoryEventStorage, InMemorySnapshotStorage,
    Manager, PartitionKey, ProcessError, ProcessRegistry, Rule, ValidatorRegistry,
};
use serde::{Deserialize, Serialize};

pub const CREATE: EventType = EventType::new("currency", "create_currency_state", "v1");
pub const ADD_AMOUNT: EventType = EventType::new("currency", "add_amount", "v1");
pub const MINUS_AMOUNT: EventType = EventType::new("currency", "minus_amount", "v1");
pub const CHANGE_STATUS: EventType = EventType::new("currency", "change_status", "v1");
pub const CHANGE_VALUE: EventType = EventType::new("currency", "change_value", "v1").locked();
pub const CHANGE_VALUE_V2: EventType = EventType::new("currency", "change_value", "v2").locked();
pub const BURN: EventType = EventType::new("currency", "burn", "v1").locked();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Nothing,
    Idle,
    Claim,
    Burned,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub amount: i64,
    pub status: Option<Status>,
    pub value: Option<String>,
}

impl Request {
    pub fn amount(amount: i64) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }

    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn value(amount: i64, value: &str) -> Self {
        Self {
            amount,
            value: Some(value.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Currency {
    pub partition_key: PartitionKey,
    pub amount: i64,
    pub status: Status,
    pub value: Option<String>,
    pub last_event: Event<Request>,
}

impl AggregateState<Request> for Currency {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn last_event(&self) -> Option<&Event<Request>> {
        Some(&self.last_event)
    }
}

pub type CurrencyManager<ES = InMemoryEventStorage<Request>> =
    Manager<Currency, Request, ES, InMemorySnapshotStorage<Currency>>;

fn created(state: Option<Currency>) -> Result<Currency, ProcessError> {
    Ok(state.ok_or("currency not created")?)
}

fn request(event: &Event<Request>) -> Result<&Request, ProcessError> {
    Ok(event.request().ok_or("missing request")?)
}

pub fn create_currency(_: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    Ok(Currency {
        partition_key: event.partition_key.clone(),
        amount: 0,
        status: Status::Nothing,
        value: None,
        last_event: event.clone(),
    })
}

pub fn add_amount(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    Ok(Currency {
        amount: state.amount + request(event)?.amount,
        last_event: event.clone(),
        ..state
    })
}

pub fn minus_amount(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    Ok(Currency {
        amount: state.amount - request(event)?.amount,
        last_event: event.clone(),
        ..state
    })
}

pub fn change_status(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    let status = request(event)?.status.ok_or("missing status")?;
    Ok(Currency {
        status,
        last_event: event.clone(),
        ..state
    })
}

pub fn change_value(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    Ok(Currency {
        value: request(event)?.value.clone(),
        last_event: event.clone(),
        ..state
    })
}

/// v2 also moves the amount along with the value.
pub fn change_value_v2(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    let request = request(event)?;
    Ok(Currency {
        amount: state.amount + request.amount,
        value: request.value.clone(),
        last_event: event.clone(),
        ..state
    })
}

pub fn burn(state: Option<Currency>, event: &Event<Request>) -> Result<Currency, ProcessError> {
    let state = created(state)?;
    Ok(Currency {
        status: Status::Burned,
        last_event: event.clone(),
        ..state
    })
}

/// Rejects anything once the currency is burned, including a burn that is
/// already in the log but not yet in the snapshot.
pub fn no_burned(latest: Option<&Event<Request>>, snapshot: Option<&Currency>) -> Result<(), ProcessError> {
    if snapshot.is_some_and(|currency| currency.status == Status::Burned) {
        return Err("status is burned".into());
    }
    let applied = snapshot.map_or(0, |currency| currency.last_event_no());
    match latest {
        Some(latest) if latest.event_no > applied && latest.event_type == BURN => {
            Err("status is burned".into())
        }
        _ => Ok(()),
    }
}

pub fn processes() -> ProcessRegistry<Currency, Request> {
    let processes = ProcessRegistry::<Currency, Request>::new();
    processes.set(&CREATE, create_currency);
    processes.set(&ADD_AMOUNT, add_amount);
    processes.set(&MINUS_AMOUNT, minus_amount);
    processes.set(&CHANGE_STATUS, change_status);
    processes.set(&CHANGE_VALUE, change_value);
    processes.set(&CHANGE_VALUE_V2, change_value_v2);
    processes.set(&BURN, burn);
    processes
}

pub fn validators() -> ValidatorRegistry<Currency, Request> {
    let validators = ValidatorRegistry::<Currency, Request>::new();
    for event_type in [
        ADD_AMOUNT,
        MINUS_AMOUNT,
        CHANGE_STATUS,
        CHANGE_VALUE,
        CHANGE_VALUE_V2,
        BURN,
    ] {
        validators.push(&event_type, no_burned);
    }
    validators
}

pub fn manager() -> CurrencyManager {
    manager_with(InMemoryEventStorage::new(), None)
}

pub fn manager_with<ES>(event_storage: ES, rule: Option<Rule>) -> CurrencyManager<ES>
where
    ES: EventStorage<Request>,
{
    Manager::new(
        rule,
        Arc::new(processes()),
        Arc::new(validators()),
        event_storage,
        InMemorySnapshotStorage::new(),
    )
}

pub fn pk(key: &str) -> PartitionKey {
    PartitionKey::try_new(key).expect("valid partition key")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
