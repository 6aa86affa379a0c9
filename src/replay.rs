//! Deterministic reconstruction of state from ordered events.

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::command::ProcessRegistry;
use crate::error::{ProcessError, panic_error};
use crate::event::Event;
use crate::state::AggregateState;

#[derive(Debug, Error)]
pub enum ReplayError {
    /// An event's type has no registered process
    #[error("not defined event: {event_type}")]
    NotDefinedEvent { event_type: String },

    /// A registered process failed on an event
    #[error("process failed on event {event}: {source}")]
    Process {
        event: String,
        #[source]
        source: ProcessError,
    },
}

/// Folds `events` left to right over `start`.
///
/// Events must be given in ascending event-number order. Events that the
/// current state has already applied are skipped by the process guard. Replay
/// stops at the first event whose type has no registered process. A process
/// that panics is reported as [`ReplayError::Process`].
pub fn replay<S, R>(
    registry: &ProcessRegistry<S, R>,
    start: Option<S>,
    events: &[Event<R>],
) -> Result<Option<S>, ReplayError>
where
    S: AggregateState<R> + 'static,
    R: 'static,
{
    events.iter().try_fold(start, |state, event| {
        let process = registry
            .get(&event.event_type)
            .ok_or_else(|| ReplayError::NotDefinedEvent {
                event_type: event.event_type.key(),
            })?;
        panic::catch_unwind(AssertUnwindSafe(|| process(state, event)))
            .unwrap_or_else(|payload| Err(panic_error(payload)))
            .map(Some)
            .map_err(|source| ReplayError::Process {
                event: event.to_string(),
                source,
            })
    })
}
