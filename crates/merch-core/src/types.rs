//! # Domain Types
//!
//! Rows of the coin ledger and the denormalized views read back from it.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      User       │   │    Transfer     │   │      Order      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  username       │   │  from_user_id   │   │  user_id (FK)   │       │
//! │  │  balance (i64)  │   │  to_user_id     │   │  product_id(FK) │       │
//! │  │  password_hash  │   │  amount (> 0)   │   │  created_at     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  TransferEntry  │   │   OrderLine     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  + counterpart  │   │  + title        │       │
//! │  │  title          │   │    username     │   │  + price        │       │
//! │  │  price (> 0)    │   │  (read view)    │   │  (read view)    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transfers and orders are append-only: once written they never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// User
// =============================================================================

/// An account holding a coin balance.
///
/// The password hash is opaque to the ledger; hashing and verification
/// happen in the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    /// Unique identifier (UUID v4).
    pub id: Uuid,

    /// Login name, unique across accounts.
    pub username: String,

    /// Opaque password hash produced by the auth layer.
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Current balance in coins, never negative.
    pub balance: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A catalog item that can be bought with coins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: Uuid,

    /// Display title, matched case-insensitively on purchase.
    pub title: String,

    /// Price in coins, always positive.
    pub price: i64,
}

// =============================================================================
// Order
// =============================================================================

/// A completed purchase. Written once, in the same transaction as the debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An order joined with the product it bought.
///
/// ## Snapshot Note
/// Title and price come from the catalog at read time. The catalog is
/// immutable reference data, so this equals the price that was debited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub product_price: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Transfer
// =============================================================================

/// A peer-to-peer coin payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Transfer {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A transfer joined with the username on the other side.
///
/// ## Counterpart
/// ```text
/// list_transfers_from(alice) → counterpart = receiver's username
/// list_transfers_to(alice)   → counterpart = sender's username
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TransferEntry {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub counterpart: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl TransferEntry {
    /// Builds a read view from a stored transfer and the counterpart's name.
    pub fn from_transfer(transfer: &Transfer, counterpart: impl Into<String>) -> Self {
        TransferEntry {
            id: transfer.id,
            from_user_id: transfer.from_user_id,
            to_user_id: transfer.to_user_id,
            counterpart: counterpart.into(),
            amount: transfer.amount,
            created_at: transfer.created_at,
        }
    }
}
