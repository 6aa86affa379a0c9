//! Event model for the event sourcing engine.
//!
//! Events are immutable facts scoped to a [`PartitionKey`]. Within a partition
//! every event carries a strictly increasing [`EventNo`] starting at 1, and the
//! [`EventType`] tells the registries which transition and validators apply.
//!
//! # Examples
//!
//! Declaring an event-type catalog for a domain:
//!
//! ```rust
//! use mnemosyne::EventType;
//!
//! const CREATE: EventType = EventType::new("currency", "create", "v1");
//! const CHANGE_VALUE: EventType = EventType::new("currency", "change_value", "v1").locked();
//! const CHANGE_VALUE_V2: EventType = EventType::new("currency", "change_value", "v2").locked();
//!
//! assert_eq!(CREATE.key(), "currency_create_v1");
//! assert!(CHANGE_VALUE.need_lock());
//! assert_ne!(CHANGE_VALUE, CHANGE_VALUE_V2);
//! ```
//!
//! # Schema Evolution
//!
//! When the semantics of a transition must change, declare a new version of
//! the event type instead of editing the old transition. Historical events keep
//! replaying through the process registered for their original version.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-partition sequence number of an event.
///
/// The first event of a partition is numbered 1. Zero means "nothing applied".
pub type EventNo = u64;

/// Groups every event of one logical aggregate instance.
///
/// Leading and trailing whitespace is trimmed and the key must not be empty.
///
/// ```rust
/// use mnemosyne::PartitionKey;
///
/// let pk = PartitionKey::try_new(" acct-1 ").unwrap();
/// assert_eq!(pk.to_string(), "acct-1");
/// assert!(PartitionKey::try_new("   ").is_err());
/// ```
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        AsRef,
        Serialize,
        Deserialize
    )
)]
pub struct PartitionKey(String);

/// Globally unique, time-sortable identifier of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh id. Ids generated later sort after earlier ones.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a kind of event: `(domain, name, version)`.
///
/// The `need_lock` flag marks event types that must not interleave with other
/// writes on the same partition. It is not part of the identity: two event
/// types that differ only in `need_lock` look up the same registrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    domain: Cow<'static, str>,
    name: Cow<'static, str>,
    version: Cow<'static, str>,
    #[serde(default)]
    need_lock: bool,
}

impl EventType {
    pub const fn new(domain: &'static str, name: &'static str, version: &'static str) -> Self {
        Self {
            domain: Cow::Borrowed(domain),
            name: Cow::Borrowed(name),
            version: Cow::Borrowed(version),
            need_lock: false,
        }
    }

    /// Builds an event type from runtime strings, e.g. when loading a catalog
    /// from configuration.
    pub fn owned(
        domain: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        need_lock: bool,
    ) -> Self {
        Self {
            domain: Cow::Owned(domain.into()),
            name: Cow::Owned(name.into()),
            version: Cow::Owned(version.into()),
            need_lock,
        }
    }

    /// Marks the event type as requiring the partition's advisory lock.
    pub const fn locked(mut self) -> Self {
        self.need_lock = true;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn need_lock(&self) -> bool {
        self.need_lock
    }

    /// Registry lookup key, rendered as `domain_name_version`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.domain, self.name, self.version)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.name == other.name && self.version == other.version
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domain.hash(state);
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.domain, self.name, self.version)
    }
}

/// An immutable, ordered fact recorded for a partition.
///
/// `R` is the domain-specific request payload carried by the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<R> {
    pub event_id: EventId,
    pub partition_key: PartitionKey,
    pub event_type: EventType,
    pub event_no: EventNo,
    pub event_at: DateTime<Utc>,
    pub request: Option<R>,
}

impl<R> Event<R> {
    /// Creates a new event stamped with a fresh id and the current UTC time.
    pub fn new(
        partition_key: PartitionKey,
        event_type: EventType,
        event_no: EventNo,
        request: Option<R>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            partition_key,
            event_type,
            event_no,
            event_at: Utc::now(),
            request,
        }
    }

    pub fn request(&self) -> Option<&R> {
        self.request.as_ref()
    }
}

impl<R> fmt::Display for Event<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({}, id {}, at {})",
            self.partition_key,
            self.event_no,
            self.event_type,
            self.event_id,
            self.event_at.to_rfc3339()
        )
    }
}
