//! Validator registry: admission checks that gate events before they are written.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use crate::error::{ProcessError, panic_error};
use crate::event::{Event, EventType};
use crate::state::AggregateState;

/// An admission check run against the latest stored event and the snapshot.
///
/// Validators only read what they are given.
pub type Validator<S, R> =
    Arc<dyn Fn(Option<&Event<R>>, Option<&S>) -> Result<(), ProcessError> + Send + Sync>;

/// Ordered validator chains keyed by event type.
///
/// An event type without a chain (or with an empty one) is always admissible.
pub struct ValidatorRegistry<S, R> {
    chains: RwLock<HashMap<String, Vec<Validator<S, R>>>>,
    _request: PhantomData<fn() -> R>,
}

impl<S, R> ValidatorRegistry<S, R>
where
    S: AggregateState<R> + 'static,
    R: 'static,
{
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            _request: PhantomData,
        }
    }

    /// Replaces the chain for `event_type` with `validators`, kept in order.
    pub fn set<I>(&self, event_type: &EventType, validators: I)
    where
        I: IntoIterator<Item = Validator<S, R>>,
    {
        let chain = validators.into_iter().collect::<Vec<_>>();
        self.chains
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(event_type.key(), chain);
    }

    /// Appends one validator to the end of the chain for `event_type`.
    pub fn push<F>(&self, event_type: &EventType, validator: F)
    where
        F: Fn(Option<&Event<R>>, Option<&S>) -> Result<(), ProcessError> + Send + Sync + 'static,
    {
        self.chains
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(event_type.key())
            .or_default()
            .push(Arc::new(validator));
    }

    pub fn get(&self, event_type: &EventType) -> Option<Vec<Validator<S, R>>> {
        self.chains
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event_type.key())
            .cloned()
    }
}

impl<S, R> Default for ValidatorRegistry<S, R>
where
    S: AggregateState<R> + 'static,
    R: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `chain` in order; the first failure stops the chain. A panicking
/// validator counts as a failure.
pub(crate) fn run_chain<S, R>(
    chain: &[Validator<S, R>],
    latest: Option<&Event<R>>,
    snapshot: Option<&S>,
) -> Result<(), ProcessError> {
    chain
        .iter()
        .try_for_each(|validator| {
            panic::catch_unwind(AssertUnwindSafe(|| validator(latest, snapshot)))
                .unwrap_or_else(|payload| Err(panic_error(payload)))
        })
}
