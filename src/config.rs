//! Engine configuration: snapshot cadence and retry policy.

use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

use crate::delay::RetryDelay;
use crate::event::{Event, EventNo};

const DEFAULT_MIN_SNAPSHOT_TERM: Duration = Duration::from_secs(60);
const DEFAULT_MIN_EVENT_NO_TERM: EventNo = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Indicates an invalid configuration parameter
#[derive(Debug, Error)]
#[error("Invalid configuration{}: {message}", parameter.as_ref().map(|p| format!(" parameter '{p}'")).unwrap_or_default())]
pub struct ConfigError {
    pub message: String,
    pub parameter: Option<String>,
}

/// Snapshot cadence for one aggregate type.
///
/// Unset fields fall back to the defaults when merged onto
/// [`Rule::default_rule`]: no forced snapshots, at least one minute between
/// snapshots, at least five new events before re-snapshotting.
///
/// ```rust
/// use std::time::Duration;
/// use mnemosyne::Rule;
///
/// let mut rule = Rule::default_rule();
/// rule.merge(&Rule::new().min_event_no_term(2));
///
/// assert!(!rule.is_always_snapshot());
/// assert_eq!(rule.min_event_no(), 2);
/// assert_eq!(rule.min_snapshot_duration(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    pub always_snapshot: Option<bool>,
    pub min_snapshot_term: Option<Duration>,
    pub min_event_no_term: Option<EventNo>,
}

impl Rule {
    /// An empty rule that overrides nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_rule() -> Self {
        Self {
            always_snapshot: Some(false),
            min_snapshot_term: Some(DEFAULT_MIN_SNAPSHOT_TERM),
            min_event_no_term: Some(DEFAULT_MIN_EVENT_NO_TERM),
        }
    }

    pub fn always_snapshot(mut self, always: bool) -> Self {
        self.always_snapshot = Some(always);
        self
    }

    pub fn min_snapshot_term(mut self, term: Duration) -> Self {
        self.min_snapshot_term = Some(term);
        self
    }

    pub fn min_event_no_term(mut self, term: EventNo) -> Self {
        self.min_event_no_term = Some(term);
        self
    }

    /// Overrides each field that is set on `other`.
    pub fn merge(&mut self, other: &Rule) {
        if let Some(always) = other.always_snapshot {
            self.always_snapshot = Some(always);
        }
        if let Some(term) = other.min_snapshot_term {
            self.min_snapshot_term = Some(term);
        }
        if let Some(term) = other.min_event_no_term {
            self.min_event_no_term = Some(term);
        }
    }

    pub fn is_always_snapshot(&self) -> bool {
        self.always_snapshot.unwrap_or(false)
    }

    pub fn min_snapshot_duration(&self) -> Duration {
        self.min_snapshot_term.unwrap_or(DEFAULT_MIN_SNAPSHOT_TERM)
    }

    pub fn min_event_no(&self) -> EventNo {
        self.min_event_no_term.unwrap_or(DEFAULT_MIN_EVENT_NO_TERM)
    }

    /// Decides whether a snapshot taken at `snapshot_last` should be replaced
    /// now that the log has grown to `latest`.
    ///
    /// A partition without a snapshot always gets one.
    pub fn snapshot_due<R>(&self, snapshot_last: Option<&Event<R>>, latest: &Event<R>) -> bool {
        let Some(snapshot_last) = snapshot_last else {
            return true;
        };
        if latest.event_no <= snapshot_last.event_no {
            return false;
        }
        if self.is_always_snapshot() {
            return true;
        }
        if latest.event_no - snapshot_last.event_no >= self.min_event_no() {
            return true;
        }
        let term = TimeDelta::from_std(self.min_snapshot_duration()).unwrap_or(TimeDelta::MAX);
        latest.event_at - snapshot_last.event_at >= term
    }
}

/// Retry policy for writes that lose the advisory lock race.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteConfig {
    max_retries: u32,
    retry_delay: RetryDelay,
}

impl ExecuteConfig {
    pub fn new(max_retries: u32, retry_delay: RetryDelay) -> Result<Self, ConfigError> {
        if retry_delay.base_delay_ms() > retry_delay.max_delay_ms() {
            return Err(ConfigError {
                message: format!(
                    "base delay {}ms exceeds max delay {}ms",
                    retry_delay.base_delay_ms(),
                    retry_delay.max_delay_ms()
                ),
                parameter: Some("retry_delay".to_string()),
            });
        }
        Ok(Self {
            max_retries,
            retry_delay,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> RetryDelay {
        self.retry_delay
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: RetryDelay::default(),
        }
    }
}
