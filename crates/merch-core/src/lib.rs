//! # merch-core: Pure Domain Logic for the Merch Shop Ledger
//!
//! This crate holds every rule of the coin ledger that can be expressed
//! without touching a database: the domain rows, coin arithmetic, input
//! validation, transaction options and the read-side info aggregation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Merch Shop Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           HTTP handlers (auth, JWT, routing - external)         │   │
//! │  │     /api/sendCoin ──► /api/buy/{item} ──► /api/info             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  merch-db (Ledger engine)                       │   │
//! │  │       Ledger ──► Coordinator ──► Account/Catalog/Records        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ merch-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   coins   │  │    tx     │  │ validation│  │   │
//! │  │   │   User    │  │  deltas   │  │ Isolation │  │   rules   │  │   │
//! │  │   │ Transfer  │  │ overdraft │  │ TxOptions │  │   checks  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain rows (User, Product, Order, Transfer) and read views
//! - [`coins`] - Balance arithmetic that enforces the non-negative rule
//! - [`tx`] - Isolation levels and retry options for the coordinator
//! - [`validation`] - Precondition checks run before a transaction opens
//! - [`info`] - Aggregation of a user's inventory and coin history
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use merch_core::coins;
//!
//! // A debit that fits the balance
//! assert_eq!(coins::apply_delta(100, -40).unwrap(), 60);
//!
//! // A debit that would overdraw is rejected
//! assert!(coins::apply_delta(100, -101).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coins;
pub mod error;
pub mod info;
pub mod tx;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use info::{CoinHistory, InventoryItem, ReceivedCoins, SentCoins, UserInfo};
pub use tx::{IsolationLevel, TxOptions};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Coins granted to every newly created account.
pub const DEFAULT_STARTING_BALANCE: i64 = 1000;

/// Retry budget for plain reads running under read-committed.
pub const DEFAULT_READ_RETRIES: u32 = 5;

/// Retry budget for operations that move coins.
///
/// Money-moving work runs under SERIALIZABLE, where the database aborts a
/// transaction whose view was invalidated by a concurrent commit. Ten re-runs
/// absorb normal contention on a hot account.
pub const DEFAULT_MONEY_RETRIES: u32 = 10;
