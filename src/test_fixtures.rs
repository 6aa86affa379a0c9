//! A minimal counter domain used by the unit tests.

use serde::Serialize;

use crate::command::ProcessRegistry;
use crate::error::ProcessError;
use crate::event::{Event, EventNo, EventType, PartitionKey};
use crate::state::AggregateState;

pub(crate) const OPENED: EventType = EventType::new("counter", "opened", "v1");
pub(crate) const ADDED: EventType = EventType::new("counter", "added", "v1");
pub(crate) const RESET: EventType = EventType::new("counter", "reset", "v1").locked();
pub(crate) const BROKEN: EventType = EventType::new("counter", "broken", "v1");
pub(crate) const UNHANDLED: EventType = EventType::new("counter", "unhandled", "v1");

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Counter {
    pub partition_key: PartitionKey,
    pub value: i64,
    pub last_event: Event<i64>,
}

impl AggregateState<i64> for Counter {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn last_event(&self) -> Option<&Event<i64>> {
        Some(&self.last_event)
    }
}

pub(crate) fn pk() -> PartitionKey {
    PartitionKey::try_new("c-1").unwrap()
}

pub(crate) fn event(pk: &PartitionKey, et: EventType, no: EventNo, req: Option<i64>) -> Event<i64> {
    Event::new(pk.clone(), et, no, req)
}

pub(crate) fn open(_: Option<Counter>, e: &Event<i64>) -> Result<Counter, ProcessError> {
    Ok(Counter {
        partition_key: e.partition_key.clone(),
        value: 0,
        last_event: e.clone(),
    })
}

pub(crate) fn add(state: Option<Counter>, e: &Event<i64>) -> Result<Counter, ProcessError> {
    let state = state.ok_or("counter not opened")?;
    let amount = e.request().copied().ok_or("missing amount")?;
    Ok(Counter {
        value: state.value + amount,
        last_event: e.clone(),
        ..state
    })
}

pub(crate) fn reset(state: Option<Counter>, e: &Event<i64>) -> Result<Counter, ProcessError> {
    let state = state.ok_or("counter not opened")?;
    Ok(Counter {
        value: 0,
        last_event: e.clone(),
        ..state
    })
}

pub(crate) fn broken(_: Option<Counter>, _: &Event<i64>) -> Result<Counter, ProcessError> {
    panic!("domain bug")
}

pub(crate) fn registry() -> ProcessRegistry<Counter, i64> {
    let registry = ProcessRegistry::new();
    registry.set(&OPENED, open);
    registry.set(&ADDED, add);
    registry.set(&RESET, reset);
    registry.set(&BROKEN, broken);
    registry
}
