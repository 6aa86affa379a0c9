use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StorageError;
use crate::event::PartitionKey;

/// Per-partition slots guarded by their own reader/writer lock.
///
/// A slot is created the first time its partition is written and is never
/// replaced afterwards, so every caller that asks for the same partition gets
/// the same lock. Reads of a partition without a slot see `T::default()` and
/// leave the map untouched.
#[derive(Debug)]
pub(crate) struct PartitionMap<T> {
    slots: Mutex<HashMap<PartitionKey, Arc<RwLock<T>>>>,
}

impl<T: Default> PartitionMap<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn slot(&self, pk: &PartitionKey) -> Result<Arc<RwLock<T>>, StorageError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StorageError::poisoned(pk))?;
        Ok(Arc::clone(slots.entry(pk.clone()).or_default()))
    }

    fn existing(&self, pk: &PartitionKey) -> Result<Option<Arc<RwLock<T>>>, StorageError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| StorageError::poisoned(pk))?;
        Ok(slots.get(pk).cloned())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs `f` holding the shared side of the partition's lock.
    pub(crate) fn read<U>(
        &self,
        pk: &PartitionKey,
        f: impl FnOnce(&T) -> U,
    ) -> Result<U, StorageError> {
        let Some(slot) = self.existing(pk)? else {
            return Ok(f(&T::default()));
        };
        let guard: RwLockReadGuard<'_, T> = slot.read().map_err(|_| StorageError::poisoned(pk))?;
        Ok(f(&guard))
    }

    /// Runs `f` holding the exclusive side of the partition's lock.
    pub(crate) fn write<U>(
        &self,
        pk: &PartitionKey,
        f: impl FnOnce(&mut T) -> U,
    ) -> Result<U, StorageError> {
        let slot = self.slot(pk)?;
        let mut guard: RwLockWriteGuard<'_, T> =
            slot.write().map_err(|_| StorageError::poisoned(pk))?;
        Ok(f(&mut guard))
    }
}

impl PartitionMap<()> {
    /// Runs `f` while no other caller runs for the same partition.
    ///
    /// The slot guards no data, so a lock poisoned by an earlier panic is
    /// taken over instead of reported.
    pub(crate) fn exclusive<U>(
        &self,
        pk: &PartitionKey,
        f: impl FnOnce() -> U,
    ) -> Result<U, StorageError> {
        let slot = self.slot(pk)?;
        let _guard = slot.write().unwrap_or_else(PoisonError::into_inner);
        Ok(f())
    }
}

impl<T: Default> Default for PartitionMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
