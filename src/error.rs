//! Error types for the mnemosyne event sourcing engine.
//!
//! Every public [`Manager`](crate::Manager) operation returns either its
//! result or exactly one [`Error`]. Each variant carries the identifiers
//! needed to find the failing partition, and [`Error::code`] maps it onto the
//! stable [`Code`] taxonomy.
use std::any::Any;

use thiserror::Error;

use crate::event::{EventId, PartitionKey};

/// Failure reported by a domain process or validator.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// Converts the payload of a panic caught in domain code into a
/// [`ProcessError`].
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> ProcessError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("panicked: {message}").into()
}

/// Stable classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// A need-lock event found the partition's advisory lock already held.
    AlreadyLockedEvent,
    /// A lock/unlock pair was broken: the lock was already released.
    AlreadyUnlockedEvent,
    /// An event type has no registered process. This is a deployment error.
    NoHasCommand,
    /// A registered process failed. Indicates a bug in domain logic.
    CommandError,
    /// A registered validator rejected the event or failed.
    ValidateError,
    /// The event storage could not hand out the next event number.
    DispenseEventNoError,
    EventStorageError,
    SnapshotStorageError,
}

/// Represents errors that can occur in the mnemosyne event sourcing engine
#[derive(Debug, Error)]
pub enum Error {
    /// Indicates that the partition's advisory lock is held by an event in flight
    #[error("already locked. pk({partition_key}), eventType({event_type})")]
    AlreadyLockedEvent {
        partition_key: PartitionKey,
        event_type: String,
    },

    /// Indicates that the advisory lock was already released when unlocking
    #[error("already unlocked. pk({partition_key}), eventType({event_type})")]
    AlreadyUnlockedEvent {
        partition_key: PartitionKey,
        event_type: String,
    },

    /// Indicates an event type without a registered process
    #[error("no has command. pk({partition_key}), eventType({event_type})")]
    NoHasCommand {
        partition_key: PartitionKey,
        event_type: String,
    },

    /// Indicates that a registered process failed while applying an event
    #[error("occur error command. pk({partition_key}), event({event}): {source}")]
    Command {
        partition_key: PartitionKey,
        event: String,
        #[source]
        source: ProcessError,
    },

    /// Indicates that a validator rejected the event
    #[error(
        "occur error validate. pk({partition_key}), eventType({event_type}), state({state}): {source}"
    )]
    Validate {
        partition_key: PartitionKey,
        event_type: String,
        state: String,
        #[source]
        source: ProcessError,
    },

    /// Indicates a failure while allocating the next event number
    #[error("occur error dispense eventNo. pk({partition_key}): {source}")]
    DispenseEventNo {
        partition_key: PartitionKey,
        #[source]
        source: StorageError,
    },

    /// Indicates a failure in the event storage
    #[error(transparent)]
    EventStorage(StorageError),

    /// Indicates a failure in the snapshot storage
    #[error(transparent)]
    SnapshotStorage(StorageError),
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::AlreadyLockedEvent { .. } => Code::AlreadyLockedEvent,
            Error::AlreadyUnlockedEvent { .. } => Code::AlreadyUnlockedEvent,
            Error::NoHasCommand { .. } => Code::NoHasCommand,
            Error::Command { .. } => Code::CommandError,
            Error::Validate { .. } => Code::ValidateError,
            Error::DispenseEventNo { .. } => Code::DispenseEventNoError,
            Error::EventStorage(_) => Code::EventStorageError,
            Error::SnapshotStorage(_) => Code::SnapshotStorageError,
        }
    }

    pub fn is_already_locked(&self) -> bool {
        self.code() == Code::AlreadyLockedEvent
    }
}

/// Errors raised by event and snapshot storage implementations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A structural lock was poisoned by a panicking holder
    #[error("storage lock poisoned for partition '{partition_key}'")]
    Poisoned { partition_key: String },

    /// An event with the same id was already stored
    #[error("event '{0}' already exists")]
    DuplicateEventId(EventId),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn poisoned(partition_key: impl ToString) -> Self {
        StorageError::Poisoned {
            partition_key: partition_key.to_string(),
        }
    }
}
