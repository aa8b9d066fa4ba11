//! # Error Types
//!
//! Domain-specific error types for merch-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  merch-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  merch-db errors (separate crate)                                      │
//! │  ├── DbError          - Storage failures                               │
//! │  └── LedgerError      - What the HTTP layer sees                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → HTTP status         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations detected without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A debit would drive the balance below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Send 150 coins (balance: 100)
    ///      │
    ///      ▼
    /// apply_delta(100, -150)
    ///      │
    ///      ▼
    /// InsufficientFunds { balance: 100, requested: 150 }
    ///      │
    ///      ▼
    /// Handler answers 400 "insufficient funds"
    /// ```
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    /// The amount is zero, negative, or overflows a balance.
    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    /// Sender and receiver are the same account.
    #[error("Cannot transfer coins to self")]
    SelfTransfer,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before a transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
