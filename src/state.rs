//! Capabilities every domain state must expose to the engine.

use std::fmt::Debug;

use serde::Serialize;

use crate::event::{Event, EventNo, PartitionKey};

/// The materialized state of one partition, folded from its events.
///
/// A partition that has never applied an event has no state at all; the
/// engine represents that as `None` rather than asking the domain for an
/// empty value.
///
/// # Examples
///
/// ```rust
/// use mnemosyne::{AggregateState, Event, PartitionKey};
/// use serde::Serialize;
///
/// #[derive(Debug, Clone, PartialEq, Serialize)]
/// struct Wallet {
///     partition_key: PartitionKey,
///     amount: i64,
///     last_event: Event<i64>,
/// }
///
/// impl AggregateState<i64> for Wallet {
///     fn partition_key(&self) -> &PartitionKey {
///         &self.partition_key
///     }
///
///     fn last_event(&self) -> Option<&Event<i64>> {
///         Some(&self.last_event)
///     }
/// }
/// ```
pub trait AggregateState<R>: Debug + Clone + Send + Sync + Serialize {
    fn partition_key(&self) -> &PartitionKey;

    /// The last event folded into this state.
    fn last_event(&self) -> Option<&Event<R>>;

    /// Number of the last applied event, or 0 if none has been applied.
    fn last_event_no(&self) -> EventNo {
        self.last_event().map_or(0, |event| event.event_no)
    }

    /// String rendering used in error messages and logs.
    ///
    /// Defaults to the JSON form of the state, falling back to `Debug` if the
    /// state cannot be serialized.
    fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
