//! Storage contracts for the event log and the state snapshots.
//!
//! The engine only talks to storage through [`EventStorage`] and
//! [`SnapshotStorage`]. Both are synchronous: a call against a remote backend
//! blocks the calling thread for the round trip. The in-memory reference
//! implementations in this module back the tests and local development.
//!
//! # Event storage rules
//!
//! - Events are write-once. They are never updated or deleted after
//!   [`EventStorage::add_event`].
//! - Event numbers are allocated per partition by
//!   [`EventStorage::increase_event_no`], starting at 1, without gaps, even
//!   when many threads allocate for the same partition.
//! - Reads return events in ascending event-number order.
//! - The advisory lock ([`EventStorage::lock`], [`EventStorage::unlock`],
//!   [`EventStorage::get_lock`]) is a business flag meaning "an event that
//!   must not interleave is in flight". It is separate from whatever locking
//!   the implementation needs to keep its own data consistent.
//!
//! # Snapshot storage rules
//!
//! A snapshot is the materialized state of a partition as of some event
//! number. Saving overwrites the previous snapshot, and readers see either the
//! old or the new snapshot in full.
//!
//! # Examples
//!
//! ```rust
//! use mnemosyne::{Event, EventStorage, EventType, InMemoryEventStorage, PartitionKey};
//!
//! const OPENED: EventType = EventType::new("account", "opened", "v1");
//!
//! let storage = InMemoryEventStorage::<()>::new();
//! let pk = PartitionKey::try_new("acct-1").unwrap();
//!
//! let no = storage.increase_event_no(&pk).unwrap();
//! storage.add_event(Event::new(pk.clone(), OPENED, no, None)).unwrap();
//!
//! assert_eq!(no, 1);
//! assert_eq!(storage.get_last_event(&pk).unwrap().unwrap().event_no, 1);
//!
//! assert!(!storage.lock(&pk).unwrap());
//! assert!(storage.lock(&pk).unwrap(), "second lock sees the flag already held");
//! assert!(!storage.unlock(&pk).unwrap());
//! ```

mod memory;
pub(crate) mod partition;

pub use memory::{InMemoryEventStorage, InMemorySnapshotStorage};

use crate::error::StorageError;
use crate::event::{Event, EventId, EventNo, PartitionKey};

/// Append-only, per-partition event log with sequencing and an advisory lock.
pub trait EventStorage<R>: Send + Sync {
    /// Allocates the next event number for `pk`. The first call for an unseen
    /// partition returns 1.
    fn increase_event_no(&self, pk: &PartitionKey) -> Result<EventNo, StorageError>;

    /// Appends `event` to its partition's log. An existing id is never
    /// overwritten.
    fn add_event(&self, event: Event<R>) -> Result<(), StorageError>;

    fn get_event(&self, id: &EventId) -> Result<Option<Event<R>>, StorageError>;

    /// All events of `pk`, ascending by event number.
    fn get_events(&self, pk: &PartitionKey) -> Result<Vec<Event<R>>, StorageError>;

    /// Events of `pk` numbered strictly above `event_no`, ascending.
    fn get_events_after_event_no(
        &self,
        pk: &PartitionKey,
        event_no: EventNo,
    ) -> Result<Vec<Event<R>>, StorageError>;

    fn get_last_event(&self, pk: &PartitionKey) -> Result<Option<Event<R>>, StorageError>;

    /// Current value of the advisory lock; `false` for unseen partitions.
    fn get_lock(&self, pk: &PartitionKey) -> Result<bool, StorageError>;

    /// Sets the advisory lock. Returns `true` without changing anything if it
    /// was already held.
    fn lock(&self, pk: &PartitionKey) -> Result<bool, StorageError>;

    /// Clears the advisory lock. Returns `true` without changing anything if
    /// it was already clear.
    fn unlock(&self, pk: &PartitionKey) -> Result<bool, StorageError>;
}

/// Latest materialized state per partition.
pub trait SnapshotStorage<S, R>: Send + Sync {
    fn save_snapshot(&self, pk: &PartitionKey, state: S) -> Result<(), StorageError>;

    fn get_snapshot(&self, pk: &PartitionKey) -> Result<Option<S>, StorageError>;
}
