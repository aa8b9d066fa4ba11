//! # Error Types
//!
//! Storage errors and the public ledger error taxonomy.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL error (sqlx::Error)     MemoryStore failure                │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  DbError ← SQLSTATE categorization (40001 → SerializationFailure)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError ← business taxonomy (NotFound, InsufficientFunds, ...)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Coordinator ← retries serialization failures, maps leftovers to       │
//! │       │        Conflict                                                 │
//! │       ▼                                                                 │
//! │  HTTP handler picks a status code                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::borrow::Cow;

use merch_core::{CoreError, ValidationError};
use thiserror::Error;

// =============================================================================
// SQLSTATE codes
// =============================================================================

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and add the categorization the ledger needs
/// to decide between retrying and giving up.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID or title doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Creating a user with a taken username
    /// - Inserting a product whose title collides case-insensitively
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Recording an order for an unknown product
    /// - Recording a transfer for an unknown user
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. `balance >= 0`).
    #[error("Check constraint violated: {message}")]
    CheckViolation { message: String },

    /// The database aborted the transaction to keep it serializable.
    ///
    /// ## When This Occurs
    /// - SQLSTATE 40001: a concurrent commit invalidated this transaction
    /// - SQLSTATE 40P01: deadlock detected between row locks
    ///
    /// The coordinator retries these under SERIALIZABLE.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True when the transaction was aborted by a concurrency conflict and
    /// may succeed if re-run from the top.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, DbError::SerializationFailure(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound      → DbError::NotFound
/// sqlx::Error::Database (23505) → DbError::UniqueViolation
/// sqlx::Error::Database (23503) → DbError::ForeignKeyViolation
/// sqlx::Error::Database (23514) → DbError::CheckViolation
/// sqlx::Error::Database (40001) → DbError::SerializationFailure
/// sqlx::Error::Database (40P01) → DbError::SerializationFailure
/// sqlx::Error::PoolTimedOut     → DbError::PoolExhausted
/// sqlx::Error::Io / PoolClosed  → DbError::ConnectionFailed
/// Other                         → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let code = db_err.code().unwrap_or(Cow::Borrowed(""));

                match code.as_ref() {
                    UNIQUE_VIOLATION => DbError::UniqueViolation {
                        field: db_err.constraint().unwrap_or("unknown").to_string(),
                        value: "unknown".to_string(),
                    },
                    FOREIGN_KEY_VIOLATION => DbError::ForeignKeyViolation { message: msg },
                    CHECK_VIOLATION => DbError::CheckViolation { message: msg },
                    SERIALIZATION_FAILURE | DEADLOCK_DETECTED => {
                        DbError::SerializationFailure(msg)
                    }
                    _ => DbError::QueryFailed(msg),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(io) => DbError::ConnectionFailed(io.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// LedgerError
// =============================================================================

/// Errors reported by ledger operations.
///
/// ## Classification
/// ```text
/// ┌────────────────────┬──────────────┬─────────────────────────────────┐
/// │ Variant            │ Retried?     │ Meaning for the caller          │
/// ├────────────────────┼──────────────┼─────────────────────────────────┤
/// │ NotFound           │ no           │ 404-style                       │
/// │ InsufficientFunds  │ no           │ business rule rejection         │
/// │ InvalidAmount      │ no           │ precondition (no tx opened)     │
/// │ SelfTransfer       │ no           │ precondition (no tx opened)     │
/// │ Invalid            │ no           │ malformed input                 │
/// │ AlreadyExists      │ no           │ username taken                  │
/// │ Conflict           │ yes, inside  │ contention; request may retry   │
/// │ TimedOut           │ yes, inside  │ deadline or attempt budget hit  │
/// │ Unavailable        │ no           │ storage failure                 │
/// └────────────────────┴──────────────┴─────────────────────────────────┘
/// ```
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Referenced account or product does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// A debit would make a balance negative.
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    /// Amount is zero, negative or out of range.
    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    /// Sender and receiver are the same account.
    #[error("Cannot transfer coins to self")]
    SelfTransfer,

    /// Malformed input.
    #[error("Invalid input: {0}")]
    Invalid(ValidationError),

    /// A unique value is already taken.
    #[error("{field} '{value}' already exists")]
    AlreadyExists { field: String, value: String },

    /// Serialization conflicts outlasted the retry budget.
    #[error("Conflicting concurrent update, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// The caller's deadline passed or every attempt timed out.
    #[error("Timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },

    /// Database or connection failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(#[source] DbError),
}

impl LedgerError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    /// True for a storage-level serialization failure that the coordinator
    /// may absorb by re-running the unit of work.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, LedgerError::Unavailable(db) if db.is_serialization_failure())
    }

    /// True for rejections caused by the request itself.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::InvalidAmount { .. }
                | LedgerError::SelfTransfer
                | LedgerError::Invalid(_)
                | LedgerError::AlreadyExists { .. }
        )
    }

    /// True for contention or deadline failures a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict { .. } | LedgerError::TimedOut { .. }
        )
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, key: id },
            DbError::UniqueViolation { field, value } => {
                LedgerError::AlreadyExists { field, value }
            }
            other => LedgerError::Unavailable(other),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientFunds { balance, requested } => {
                LedgerError::InsufficientFunds { balance, requested }
            }
            CoreError::InvalidAmount { amount } => LedgerError::InvalidAmount { amount },
            CoreError::SelfTransfer => LedgerError::SelfTransfer,
            CoreError::Validation(v) => LedgerError::Invalid(v),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Invalid(err)
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err: LedgerError = err.into();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert!(err.is_business_rule());
    }

    #[test]
    fn test_pool_errors() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted));

        let err: LedgerError = sqlx::Error::PoolClosed.into();
        assert!(matches!(
            err,
            LedgerError::Unavailable(DbError::ConnectionFailed(_))
        ));
        assert!(!err.is_business_rule());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_serialization_failure_classification() {
        let err: LedgerError = DbError::SerializationFailure("40001".to_string()).into();
        assert!(err.is_serialization_failure());
        assert!(!err.is_business_rule());

        let err: LedgerError = DbError::QueryFailed("syntax".to_string()).into();
        assert!(!err.is_serialization_failure());
    }

    #[test]
    fn test_unique_violation_maps_to_already_exists() {
        let err: LedgerError = DbError::duplicate("username", "alice").into();
        assert_eq!(err.to_string(), "username 'alice' already exists");
    }

    #[test]
    fn test_core_errors_keep_their_meaning() {
        let err: LedgerError = CoreError::InsufficientFunds {
            balance: 1,
            requested: 2,
        }
        .into();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 1,
                requested: 2
            }
        ));

        let err: LedgerError = CoreError::SelfTransfer.into();
        assert!(matches!(err, LedgerError::SelfTransfer));

        let err: LedgerError = CoreError::InvalidAmount { amount: 0 }.into();
        assert!(matches!(err, LedgerError::InvalidAmount { amount: 0 }));
    }

    #[test]
    fn test_transient_errors() {
        assert!(LedgerError::Conflict { attempts: 11 }.is_transient());
        assert!(LedgerError::TimedOut { attempts: 1 }.is_transient());
        assert!(!LedgerError::SelfTransfer.is_transient());
    }
}
