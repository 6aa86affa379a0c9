//! Process registry: maps event types to pure state transitions.
//!
//! A process takes the current state of a partition (or `None` when the
//! partition has not been initialized yet) together with an event, and returns
//! the next state. Processes must be pure: replaying the same events over the
//! same starting state always yields the same result.
//!
//! Every process is wrapped at registration time with the stale-event guard:
//! when the state has already applied an event numbered at or above the
//! incoming one, the state is returned untouched and the process never runs.
//! Redelivered or re-replayed events are therefore harmless.
//!
//! # Examples
//!
//! ```rust
//! use mnemosyne::{AggregateState, Event, EventType, PartitionKey, ProcessRegistry};
//! use serde::Serialize;
//!
//! #[derive(Debug, Clone, Serialize)]
//! struct Counter {
//!     partition_key: PartitionKey,
//!     value: i64,
//!     last_event: Event<i64>,
//! }
//!
//! impl AggregateState<i64> for Counter {
//!     fn partition_key(&self) -> &PartitionKey {
//!         &self.partition_key
//!     }
//!
//!     fn last_event(&self) -> Option<&Event<i64>> {
//!         Some(&self.last_event)
//!     }
//! }
//!
//! const ADDED: EventType = EventType::new("counter", "added", "v1");
//!
//! let registry = ProcessRegistry::<Counter, i64>::new();
//! registry.set(&ADDED, |state: Option<Counter>, event: &Event<i64>| {
//!     let value = state.map_or(0, |s| s.value) + event.request().copied().unwrap_or_default();
//!     Ok(Counter {
//!         partition_key: event.partition_key.clone(),
//!         value,
//!         last_event: event.clone(),
//!     })
//! });
//!
//! let pk = PartitionKey::try_new("c-1").unwrap();
//! let first = Event::new(pk, ADDED, 1, Some(5));
//! let process = registry.get(&ADDED).unwrap();
//!
//! let state = process(None, &first).unwrap();
//! assert_eq!(state.value, 5);
//!
//! // Delivering the same event again is a no-op.
//! let again = process(Some(state), &first).unwrap();
//! assert_eq!(again.value, 5);
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::error::ProcessError;
use crate::event::{Event, EventType};
use crate::state::AggregateState;

/// A registered state transition.
pub type Process<S, R> =
    Arc<dyn Fn(Option<S>, &Event<R>) -> Result<S, ProcessError> + Send + Sync>;

/// Event type to process mapping, shared between writers and replayers.
///
/// Registration is expected at startup and takes the exclusive side of the
/// lock; lookups happen on the hot path and take the shared side.
pub struct ProcessRegistry<S, R> {
    processes: RwLock<HashMap<String, Process<S, R>>>,
    _request: PhantomData<fn() -> R>,
}

impl<S, R> ProcessRegistry<S, R>
where
    S: AggregateState<R> + 'static,
    R: 'static,
{
    pub fn new() -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            _request: PhantomData,
        }
    }

    /// Registers `process` for `event_type`, replacing any earlier
    /// registration for the same `domain_name_version` key.
    pub fn set<F>(&self, event_type: &EventType, process: F)
    where
        F: Fn(Option<S>, &Event<R>) -> Result<S, ProcessError> + Send + Sync + 'static,
    {
        let guarded: Process<S, R> = Arc::new(move |state: Option<S>, event: &Event<R>| {
            match state {
                Some(state) if event.event_no <= state.last_event_no() => Ok(state),
                state => process(state, event),
            }
        });

        let key = event_type.key();
        let mut processes = self
            .processes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if processes.insert(key, guarded).is_some() {
            tracing::debug!(event_type = %event_type, "replaced registered process");
        }
    }

    /// Looks up the process registered for `event_type`.
    pub fn get(&self, event_type: &EventType) -> Option<Process<S, R>> {
        let processes = self
            .processes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        processes.get(&event_type.key()).cloned()
    }

    pub fn contains(&self, event_type: &EventType) -> bool {
        self.get(event_type).is_some()
    }

    pub fn len(&self) -> usize {
        self.processes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S, R> Default for ProcessRegistry<S, R>
where
    S: AggregateState<R> + 'static,
    R: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
