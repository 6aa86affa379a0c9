//! A synchronous, storage-agnostic event-sourcing engine.
//!
//! Every change to an aggregate is recorded as an immutable [`Event`] in a
//! per-partition log. State is rebuilt by folding events through registered
//! [`Process`] functions, and the result is cached as a snapshot that
//! [`Manager::apply_events`] keeps current.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mnemosyne::{
//!     AggregateState, Event, EventType, InMemoryEventStorage, InMemorySnapshotStorage, Manager,
//!     PartitionKey, ProcessRegistry, ValidatorRegistry,
//! };
//! use serde::Serialize;
//!
//! #[derive(Debug, Clone, Serialize)]
//! struct Tally {
//!     partition_key: PartitionKey,
//!     total: u64,
//!     last_event: Event<u64>,
//! }
//!
//! impl AggregateState<u64> for Tally {
//!     fn partition_key(&self) -> &PartitionKey {
//!         &self.partition_key
//!     }
//!
//!     fn last_event(&self) -> Option<&Event<u64>> {
//!         Some(&self.last_event)
//!     }
//! }
//!
//! const COUNTED: EventType = EventType::new("tally", "counted", "v1");
//!
//! let processes = ProcessRegistry::<Tally, u64>::new();
//! processes.set(&COUNTED, |state: Option<Tally>, event: &Event<u64>| {
//!     Ok(Tally {
//!         partition_key: event.partition_key.clone(),
//!         total: state.map_or(0, |s| s.total) + event.request().copied().unwrap_or(1),
//!         last_event: event.clone(),
//!     })
//! });
//!
//! let manager = Manager::new(
//!     None,
//!     Arc::new(processes),
//!     Arc::new(ValidatorRegistry::new()),
//!     InMemoryEventStorage::new(),
//!     InMemorySnapshotStorage::new(),
//! );
//!
//! let pk = PartitionKey::try_new("tally-1").unwrap();
//! manager.validate(&pk, &COUNTED).unwrap();
//! manager.put(&pk, &COUNTED, Some(2)).unwrap();
//! manager.put(&pk, &COUNTED, Some(3)).unwrap();
//! manager.apply_events(&pk).unwrap();
//!
//! let snapshot = manager.get_state_snapshot(&pk).unwrap().unwrap();
//! assert_eq!(snapshot.total, 5);
//! assert_eq!(snapshot.last_event_no(), 2);
//! ```

mod command;
mod config;
mod delay;
mod error;
mod event;
mod manager;
mod replay;
mod state;
mod store;
mod validate;

#[cfg(test)]
mod test_fixtures;

pub use command::{Process, ProcessRegistry};
pub use config::{ConfigError, ExecuteConfig, Rule};
pub use delay::RetryDelay;
pub use error::{Code, Error, ProcessError, StorageError};
pub use event::{Event, EventId, EventNo, EventType, PartitionKey};
pub use manager::Manager;
pub use replay::{ReplayError, replay};
pub use state::AggregateState;
pub use store::{EventStorage, InMemoryEventStorage, InMemorySnapshotStorage, SnapshotStorage};
pub use validate::{Validator, ValidatorRegistry};
