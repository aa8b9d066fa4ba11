//! # Coin Arithmetic
//!
//! Balance changes are expressed as signed deltas against the current
//! balance. This module is the one place that decides whether a delta may be
//! applied.
//!
//! ## Delta Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         apply_delta                                     │
//! │                                                                         │
//! │  balance = 100                                                          │
//! │                                                                         │
//! │  delta = +50   ──► 150                  (credit)                        │
//! │  delta = -100  ──► 0                    (debit to zero is fine)         │
//! │  delta = -101  ──► InsufficientFunds    (never write a negative)        │
//! │  delta = MAX   ──► InvalidAmount        (i64 overflow)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coins are whole numbers in the smallest unit; there is no fractional part
//! and no currency.

use crate::error::{CoreError, CoreResult};

/// Computes the balance after applying `delta`.
///
/// ## Errors
/// * [`CoreError::InsufficientFunds`] - the result would be negative
/// * [`CoreError::InvalidAmount`] - `balance + delta` overflows
///
/// ## Example
/// ```rust
/// use merch_core::coins::apply_delta;
///
/// assert_eq!(apply_delta(50, -50).unwrap(), 0);
/// assert_eq!(apply_delta(0, 25).unwrap(), 25);
/// ```
pub fn apply_delta(balance: i64, delta: i64) -> CoreResult<i64> {
    let updated = balance
        .checked_add(delta)
        .ok_or(CoreError::InvalidAmount { amount: delta })?;

    if updated < 0 {
        return Err(CoreError::InsufficientFunds {
            balance,
            requested: delta.saturating_neg(),
        });
    }

    Ok(updated)
}
