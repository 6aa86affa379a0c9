//! Orchestrates validation, writes, reconciliation, and queries per partition.
//!
//! The expected calling order is [`Manager::validate`], then [`Manager::put`],
//! then (periodically, driven by the caller) [`Manager::apply_events`] to bring
//! the snapshot up to date. Validation is a caller convention: `put` does not
//! run validators by itself.

use std::sync::Arc;

use crate::command::ProcessRegistry;
use crate::config::{ExecuteConfig, Rule};
use crate::error::{Error, StorageError};
use crate::event::{Event, EventNo, EventType, PartitionKey};
use crate::replay::{ReplayError, replay};
use crate::state::AggregateState;
use crate::store::partition::PartitionMap;
use crate::store::{EventStorage, SnapshotStorage};
use crate::validate::{ValidatorRegistry, run_chain};

/// Event sourcing manager over one aggregate type.
///
/// # Type Parameters
///
/// * `S` - The domain state folded from events
/// * `R` - The request payload carried by events
/// * `ES` - The event storage backend
/// * `SS` - The snapshot storage backend
pub struct Manager<S, R, ES, SS> {
    processes: Arc<ProcessRegistry<S, R>>,
    validators: Arc<ValidatorRegistry<S, R>>,
    event_storage: ES,
    snapshot_storage: SS,
    rule: Rule,
    // Serializes number allocation with the append it belongs to, so the log
    // never shows a later event before an earlier one.
    writers: PartitionMap<()>,
    reconcilers: PartitionMap<()>,
}

impl<S, R, ES, SS> Manager<S, R, ES, SS>
where
    S: AggregateState<R> + 'static,
    R: Clone + Send + Sync + 'static,
    ES: EventStorage<R>,
    SS: SnapshotStorage<S, R>,
{
    /// Creates a manager. `rule` is merged onto [`Rule::default_rule`].
    pub fn new(
        rule: Option<Rule>,
        processes: Arc<ProcessRegistry<S, R>>,
        validators: Arc<ValidatorRegistry<S, R>>,
        event_storage: ES,
        snapshot_storage: SS,
    ) -> Self {
        let mut merged = Rule::default_rule();
        if let Some(rule) = rule {
            merged.merge(&rule);
        }
        Self {
            processes,
            validators,
            event_storage,
            snapshot_storage,
            rule: merged,
            writers: PartitionMap::new(),
            reconcilers: PartitionMap::new(),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn event_storage(&self) -> &ES {
        &self.event_storage
    }

    pub fn snapshot_storage(&self) -> &SS {
        &self.snapshot_storage
    }

    /// Checks whether an event of `event_type` may be written to `pk` now.
    ///
    /// Fails with [`Error::AlreadyLockedEvent`] while a need-lock event is in
    /// flight on the partition. Event types without validators are otherwise
    /// always admissible. Validators see the latest stored event and the
    /// snapshot; a missing snapshot is built first.
    #[tracing::instrument(skip_all, fields(partition_key = %pk, event_type = %event_type))]
    pub fn validate(&self, pk: &PartitionKey, event_type: &EventType) -> Result<(), Error> {
        if self.is_locked(pk)? {
            tracing::warn!("partition is locked");
            return Err(already_locked(pk, event_type));
        }

        let Some(chain) = self
            .validators
            .get(event_type)
            .filter(|chain| !chain.is_empty())
        else {
            return Ok(());
        };

        let snapshot = match self.get_state_snapshot(pk)? {
            Some(snapshot) => Some(snapshot),
            None => {
                self.apply_events(pk)?;
                self.get_state_snapshot(pk)?
            }
        };
        let latest = self
            .event_storage
            .get_last_event(pk)
            .map_err(Error::EventStorage)?;

        run_chain(&chain, latest.as_ref(), snapshot.as_ref()).map_err(|source| {
            let state = snapshot
                .as_ref()
                .map_or_else(|| "null".to_string(), |state| state.describe());
            tracing::warn!(error = %source, "event rejected by validator");
            Error::Validate {
                partition_key: pk.clone(),
                event_type: event_type.key(),
                state,
                source,
            }
        })
    }

    /// Appends a new event to `pk` and returns it.
    ///
    /// Need-lock event types hold the partition's advisory lock for the
    /// duration of the write and release it on every exit path. Any write
    /// fails with [`Error::AlreadyLockedEvent`] while the lock is held by
    /// another writer.
    ///
    /// [`Error::AlreadyUnlockedEvent`] means the lock was cleared by someone
    /// else while this write held it. The event has been appended by then, so
    /// it must not be put again; [`Manager::get_events`] shows it.
    #[tracing::instrument(skip_all, fields(partition_key = %pk, event_type = %event_type))]
    pub fn put(
        &self,
        pk: &PartitionKey,
        event_type: &EventType,
        request: Option<R>,
    ) -> Result<Event<R>, Error> {
        if !event_type.need_lock() {
            if self.is_locked(pk)? {
                tracing::warn!("partition is locked");
                return Err(already_locked(pk, event_type));
            }
            return self.append(pk, event_type, request);
        }

        let guard = AdvisoryLock::acquire(&self.event_storage, pk, event_type)?;
        let appended = self.append(pk, event_type, request);
        let released = guard.release();
        let event = appended?;
        if let Err(err) = released {
            tracing::warn!(
                event_no = event.event_no,
                event_id = %event.event_id,
                "event appended but the advisory lock was already released"
            );
            return Err(err);
        }
        Ok(event)
    }

    /// Like [`Manager::put`], but waits and retries while the partition is
    /// locked, up to `config.max_retries()` times.
    ///
    /// When the retries run out the last [`Error::AlreadyLockedEvent`] is
    /// returned. Other errors are returned immediately.
    pub fn put_retrying(
        &self,
        pk: &PartitionKey,
        event_type: &EventType,
        request: Option<R>,
        config: &ExecuteConfig,
    ) -> Result<Event<R>, Error> {
        let mut retries = 0;
        loop {
            match self.put(pk, event_type, request.clone()) {
                Err(err) if err.is_already_locked() && retries < config.max_retries() => {
                    let delay = config.retry_delay().calculate_delay(retries);
                    tracing::warn!(
                        partition_key = %pk,
                        event_type = %event_type,
                        attempt = retries + 1,
                        max_retries = config.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        "partition locked, retrying put"
                    );
                    std::thread::sleep(delay);
                    retries += 1;
                }
                result => return result,
            }
        }
    }

    /// Folds every event the snapshot has not seen yet into it.
    ///
    /// Does nothing when the snapshot is already current.
    #[tracing::instrument(skip_all, fields(partition_key = %pk))]
    pub fn apply_events(&self, pk: &PartitionKey) -> Result<(), Error> {
        self.reconcile(pk, false).map(|_| ())
    }

    /// Alias of [`Manager::apply_events`].
    pub fn update_state_snapshot(&self, pk: &PartitionKey) -> Result<(), Error> {
        self.apply_events(pk)
    }

    /// Like [`Manager::apply_events`], but only saves the snapshot when the
    /// manager's [`Rule`] says one is due. Returns whether a snapshot was saved.
    #[tracing::instrument(skip_all, fields(partition_key = %pk))]
    pub fn apply_events_by_rule(&self, pk: &PartitionKey) -> Result<bool, Error> {
        self.reconcile(pk, true)
    }

    /// Events of `pk` numbered above `after_event_no`; 0 means all of them.
    pub fn get_events(
        &self,
        pk: &PartitionKey,
        after_event_no: EventNo,
    ) -> Result<Vec<Event<R>>, Error> {
        let events = if after_event_no == 0 {
            self.event_storage.get_events(pk)
        } else {
            self.event_storage
                .get_events_after_event_no(pk, after_event_no)
        };
        events.map_err(Error::EventStorage)
    }

    /// Rebuilds the state of `pk` from its full history, ignoring snapshots.
    #[tracing::instrument(skip_all, fields(partition_key = %pk))]
    pub fn get_latest_state(&self, pk: &PartitionKey) -> Result<Option<S>, Error> {
        let events = self.get_events(pk, 0)?;
        self.replay_onto(pk, None, &events)
    }

    pub fn get_state_snapshot(&self, pk: &PartitionKey) -> Result<Option<S>, Error> {
        self.snapshot_storage
            .get_snapshot(pk)
            .map_err(Error::SnapshotStorage)
    }

    fn is_locked(&self, pk: &PartitionKey) -> Result<bool, Error> {
        self.event_storage.get_lock(pk).map_err(Error::EventStorage)
    }

    fn append(
        &self,
        pk: &PartitionKey,
        event_type: &EventType,
        request: Option<R>,
    ) -> Result<Event<R>, Error> {
        self.writers
            .exclusive(pk, || {
                // The lock may have been taken since `put` last looked.
                if !event_type.need_lock() && self.is_locked(pk)? {
                    tracing::warn!("partition is locked");
                    return Err(already_locked(pk, event_type));
                }

                let event_no = self
                    .event_storage
                    .increase_event_no(pk)
                    .map_err(|source| dispense_failed(pk, source))?;
                let event = Event::new(pk.clone(), event_type.clone(), event_no, request);
                self.event_storage
                    .add_event(event.clone())
                    .map_err(Error::EventStorage)?;

                tracing::debug!(event_no, event_id = %event.event_id, "event appended");
                Ok(event)
            })
            .map_err(|source| dispense_failed(pk, source))?
    }

    fn reconcile(&self, pk: &PartitionKey, by_rule: bool) -> Result<bool, Error> {
        // Nothing to fold, and no serialization slot for a partition never written.
        if self
            .event_storage
            .get_last_event(pk)
            .map_err(Error::EventStorage)?
            .is_none()
        {
            tracing::debug!("partition has no events");
            return Ok(false);
        }

        self.reconcilers
            .exclusive(pk, || {
                let snapshot = self.get_state_snapshot(pk)?;
                let applied = snapshot.as_ref().map_or(0, |s| s.last_event_no());
                let events = self.get_events(pk, applied)?;

                let Some(latest) = events.last() else {
                    tracing::debug!(applied, "snapshot already up to date");
                    return Ok(false);
                };
                if by_rule
                    && !self
                        .rule
                        .snapshot_due(snapshot.as_ref().and_then(|s| s.last_event()), latest)
                {
                    tracing::debug!(applied, latest = latest.event_no, "snapshot not due yet");
                    return Ok(false);
                }
                let latest_no = latest.event_no;

                let Some(state) = self.replay_onto(pk, snapshot, &events)? else {
                    return Ok(false);
                };
                self.snapshot_storage
                    .save_snapshot(pk, state)
                    .map_err(Error::SnapshotStorage)?;

                tracing::debug!(
                    applied = events.len(),
                    event_no = latest_no,
                    "snapshot saved"
                );
                Ok(true)
            })
            .map_err(Error::SnapshotStorage)?
    }

    fn replay_onto(
        &self,
        pk: &PartitionKey,
        start: Option<S>,
        events: &[Event<R>],
    ) -> Result<Option<S>, Error> {
        replay(&self.processes, start, events).map_err(|err| match err {
            ReplayError::NotDefinedEvent { event_type } => {
                tracing::error!(partition_key = %pk, %event_type, "event type has no process");
                Error::NoHasCommand {
                    partition_key: pk.clone(),
                    event_type,
                }
            }
            ReplayError::Process { event, source } => {
                tracing::error!(partition_key = %pk, %event, error = %source, "process failed");
                Error::Command {
                    partition_key: pk.clone(),
                    event,
                    source,
                }
            }
        })
    }
}

fn already_locked(pk: &PartitionKey, event_type: &EventType) -> Error {
    Error::AlreadyLockedEvent {
        partition_key: pk.clone(),
        event_type: event_type.key(),
    }
}

fn dispense_failed(pk: &PartitionKey, source: StorageError) -> Error {
    Error::DispenseEventNo {
        partition_key: pk.clone(),
        source,
    }
}

/// Holds a partition's advisory lock; released explicitly or on drop.
struct AdvisoryLock<'a, R> {
    storage: &'a dyn EventStorage<R>,
    pk: &'a PartitionKey,
    event_type: &'a EventType,
    released: bool,
}

impl<'a, R> AdvisoryLock<'a, R> {
    fn acquire(
        storage: &'a dyn EventStorage<R>,
        pk: &'a PartitionKey,
        event_type: &'a EventType,
    ) -> Result<Self, Error> {
        if storage.lock(pk).map_err(Error::EventStorage)? {
            tracing::warn!("advisory lock already held");
            return Err(already_locked(pk, event_type));
        }
        Ok(Self {
            storage,
            pk,
            event_type,
            released: false,
        })
    }

    fn release(mut self) -> Result<(), Error> {
        self.released = true;
        if self.storage.unlock(self.pk).map_err(Error::EventStorage)? {
            return Err(Error::AlreadyUnlockedEvent {
                partition_key: self.pk.clone(),
                event_type: self.event_type.key(),
            });
        }
        Ok(())
    }
}

impl<R> Drop for AdvisoryLock<'_, R> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.storage.unlock(self.pk) {
            tracing::error!(
                partition_key = %self.pk,
                event_type = %self.event_type,
                error = %err,
                "failed to release advisory lock"
            );
        }
    }
}
