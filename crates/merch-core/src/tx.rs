//! # Transaction Options
//!
//! Knobs the transaction coordinator reads for each unit of work.
//!
//! ## Presets
//! ```text
//! ┌──────────────────┬──────────────────┬─────────┬──────────────────────┐
//! │ Preset           │ Isolation        │ Retries │ Used by              │
//! ├──────────────────┼──────────────────┼─────────┼──────────────────────┤
//! │ default()        │ READ COMMITTED   │ 5       │ lookups, create_user │
//! │ snapshot()       │ REPEATABLE READ  │ 5       │ user_info            │
//! │ money_moving()   │ SERIALIZABLE     │ 10      │ send_coins, buy      │
//! └──────────────────┴──────────────────┴─────────┴──────────────────────┘
//! ```
//!
//! `max_retries` counts re-runs after the first attempt, so a budget of 10
//! allows up to 11 attempts.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_MONEY_RETRIES, DEFAULT_READ_RETRIES};

// =============================================================================
// Isolation Level
// =============================================================================

/// SQL transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    /// The only level at which serialization conflicts are retried.
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL keyword for this level.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Whether transactions at this level read from a fixed snapshot.
    pub const fn uses_snapshot(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// =============================================================================
// TxOptions
// =============================================================================

/// Options for one coordinator invocation.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use merch_core::{IsolationLevel, TxOptions};
///
/// let options = TxOptions::money_moving()
///     .with_attempt_timeout(Duration::from_millis(500))
///     .with_timeout(Duration::from_secs(3));
///
/// assert_eq!(options.isolation, IsolationLevel::Serializable);
/// assert_eq!(options.max_retries, 10);
/// assert!(options.deadline.is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    /// Isolation level used when a new transaction is opened.
    pub isolation: IsolationLevel,

    /// Re-runs allowed after the first attempt.
    pub max_retries: u32,

    /// Upper bound for one attempt (begin + unit of work).
    pub attempt_timeout: Option<Duration>,

    /// Point after which no attempt is started or continued.
    pub deadline: Option<Instant>,
}

impl Default for TxOptions {
    fn default() -> Self {
        TxOptions {
            isolation: IsolationLevel::ReadCommitted,
            max_retries: DEFAULT_READ_RETRIES,
            attempt_timeout: None,
            deadline: None,
        }
    }
}

impl TxOptions {
    /// Options for operations that debit or credit balances.
    pub fn money_moving() -> Self {
        TxOptions {
            isolation: IsolationLevel::Serializable,
            max_retries: DEFAULT_MONEY_RETRIES,
            ..TxOptions::default()
        }
    }

    /// Options for multi-query reads that must agree with each other.
    pub fn snapshot() -> Self {
        TxOptions::default().with_isolation(IsolationLevel::RepeatableRead)
    }

    /// Sets the isolation level.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Bounds each attempt. `None` removes the bound.
    pub fn with_attempt_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.attempt_timeout = timeout.into();
        self
    }

    /// Sets an absolute deadline for the whole invocation.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Maximum number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
