use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use super::partition::PartitionMap;
use super::{EventStorage, SnapshotStorage};
use crate::error::StorageError;
use crate::event::{Event, EventId, EventNo, PartitionKey};

#[derive(Debug)]
struct PartitionLog<R> {
    last_event_no: EventNo,
    events: BTreeMap<EventNo, Event<R>>,
    locked: bool,
}

impl<R> Default for PartitionLog<R> {
    fn default() -> Self {
        Self {
            last_event_no: 0,
            events: BTreeMap::new(),
            locked: false,
        }
    }
}

/// Event storage kept entirely in process memory.
///
/// Each partition owns a log behind its own reader/writer lock; the id index
/// is shared by all partitions.
#[derive(Debug)]
pub struct InMemoryEventStorage<R> {
    partitions: PartitionMap<PartitionLog<R>>,
    by_id: RwLock<HashMap<EventId, Event<R>>>,
}

impl<R> InMemoryEventStorage<R> {
    pub fn new() -> Self {
        Self {
            partitions: PartitionMap::new(),
            by_id: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> Default for InMemoryEventStorage<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> EventStorage<R> for InMemoryEventStorage<R>
where
    R: Clone + Send + Sync,
{
    fn increase_event_no(&self, pk: &PartitionKey) -> Result<EventNo, StorageError> {
        self.partitions.write(pk, |log| {
            log.last_event_no += 1;
            log.last_event_no
        })
    }

    fn add_event(&self, event: Event<R>) -> Result<(), StorageError> {
        let pk = event.partition_key.clone();
        self.partitions.write(&pk, |log| {
            let mut by_id = self
                .by_id
                .write()
                .map_err(|_| StorageError::poisoned(&pk))?;
            if by_id.contains_key(&event.event_id) {
                return Err(StorageError::DuplicateEventId(event.event_id));
            }
            if log.events.contains_key(&event.event_no) {
                return Err(StorageError::Other(format!(
                    "event number {} already used in partition '{pk}'",
                    event.event_no
                )));
            }
            by_id.insert(event.event_id, event.clone());
            log.events.insert(event.event_no, event);
            Ok(())
        })?
    }

    fn get_event(&self, id: &EventId) -> Result<Option<Event<R>>, StorageError> {
        let by_id = self
            .by_id
            .read()
            .map_err(|_| StorageError::Other(format!("event index poisoned reading '{id}'")))?;
        Ok(by_id.get(id).cloned())
    }

    fn get_events(&self, pk: &PartitionKey) -> Result<Vec<Event<R>>, StorageError> {
        self.partitions
            .read(pk, |log| log.events.values().cloned().collect())
    }

    fn get_events_after_event_no(
        &self,
        pk: &PartitionKey,
        event_no: EventNo,
    ) -> Result<Vec<Event<R>>, StorageError> {
        self.partitions.read(pk, |log| {
            log.events
                .range((Bound::Excluded(event_no), Bound::Unbounded))
                .map(|(_, event)| event.clone())
                .collect()
        })
    }

    fn get_last_event(&self, pk: &PartitionKey) -> Result<Option<Event<R>>, StorageError> {
        self.partitions
            .read(pk, |log| log.events.values().next_back().cloned())
    }

    fn get_lock(&self, pk: &PartitionKey) -> Result<bool, StorageError> {
        self.partitions.read(pk, |log| log.locked)
    }

    fn lock(&self, pk: &PartitionKey) -> Result<bool, StorageError> {
        self.partitions
            .write(pk, |log| std::mem::replace(&mut log.locked, true))
    }

    fn unlock(&self, pk: &PartitionKey) -> Result<bool, StorageError> {
        self.partitions
            .write(pk, |log| !std::mem::replace(&mut log.locked, false))
    }
}

/// Snapshot storage kept entirely in process memory.
#[derive(Debug)]
pub struct InMemorySnapshotStorage<S> {
    snapshots: PartitionMap<Option<S>>,
}

impl<S> InMemorySnapshotStorage<S> {
    pub fn new() -> Self {
        Self {
            snapshots: PartitionMap::new(),
        }
    }
}

impl<S> Default for InMemorySnapshotStorage<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R> SnapshotStorage<S, R> for InMemorySnapshotStorage<S>
where
    S: Clone + Send + Sync,
{
    fn save_snapshot(&self, pk: &PartitionKey, state: S) -> Result<(), StorageError> {
        self.snapshots.write(pk, |slot| *slot = Some(state))
    }

    fn get_snapshot(&self, pk: &PartitionKey) -> Result<Option<S>, StorageError> {
        self.snapshots.read(pk, |slot| slot.clone())
    }
}
