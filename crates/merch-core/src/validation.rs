//! # Validation Module
//!
//! Precondition checks for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler                                                 │
//! │  └── Payload shape (JSON decoding, required fields)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction opens)                   │
//! │  ├── amount > 0, from != to                                            │
//! │  └── titles and usernames are well-formed                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (PostgreSQL)                                        │
//! │  ├── CHECK (balance >= 0), CHECK (amount > 0)                          │
//! │  ├── UNIQUE (username)                                                 │
//! │  └── Foreign keys on orders and transfers                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures here never open a transaction, so they are never retried.

use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted product title.
pub const MAX_TITLE_LEN: usize = 100;

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 64;

// =============================================================================
// Transfer Preconditions
// =============================================================================

/// Validates a peer transfer before it touches storage.
///
/// ## Rules
/// - `amount` must be strictly positive
/// - sender and receiver must differ
///
/// The amount is checked first, so `(x, x, 0)` reports `InvalidAmount`.
///
/// ## Example
/// ```rust
/// use merch_core::validation::validate_transfer;
/// use uuid::Uuid;
///
/// let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
/// assert!(validate_transfer(a, b, 10).is_ok());
/// assert!(validate_transfer(a, a, 10).is_err());
/// assert!(validate_transfer(a, b, 0).is_err());
/// ```
pub fn validate_transfer(from: Uuid, to: Uuid, amount: i64) -> CoreResult<()> {
    if amount <= 0 {
        return Err(CoreError::InvalidAmount { amount });
    }

    if from == to {
        return Err(CoreError::SelfTransfer);
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product title used for lookup.
pub fn validate_product_title(title: &str) -> ValidationResult<()> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LEN,
        });
    }

    Ok(())
}

/// Validates a username for account creation.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - No whitespace
pub fn validate_username(username: &str) -> ValidationResult<()> {
    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_USERNAME_LEN,
        });
    }

    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates that a password hash was supplied.
pub fn validate_password_hash(hash: &str) -> ValidationResult<()> {
    if hash.is_empty() {
        return Err(ValidationError::Required {
            field: "password_hash".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a catalog price (strictly positive).
pub fn validate_price(price: i64) -> ValidationResult<()> {
    if price <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }
    Ok(())
}

/// Validates a starting balance (zero or more).
pub fn validate_starting_balance(balance: i64) -> ValidationResult<()> {
    if balance < 0 {
        return Err(ValidationError::InvalidFormat {
            field: "starting_balance".to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    Ok(())
}
