//! # Storage Traits
//!
//! The seams between the ledger engine and a concrete transactional store.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       One open transaction                              │
//! │                                                                         │
//! │   LedgerTx = AccountStore + CatalogLookup + LedgerRecords              │
//! │                                                                         │
//! │   ┌────────────────────┐ ┌────────────────────┐ ┌──────────────────┐   │
//! │   │   AccountStore     │ │   CatalogLookup    │ │  LedgerRecords   │   │
//! │   │ read_for_update    │ │ find_product_by_   │ │ record_transfer  │   │
//! │   │ apply_delta        │ │   title            │ │ record_order     │   │
//! │   │ find_user_by_*     │ │ list_products      │ │ list_transfers_* │   │
//! │   │ insert_user        │ │                    │ │ list_orders_for  │   │
//! │   └────────────────────┘ └────────────────────┘ └──────────────────┘   │
//! │                                                                         │
//! │   commit(self) / rollback(self)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//!   TxStore::begin(isolation) ──► LedgerTx
//! ```
//!
//! Two adapters implement these traits:
//! - [`crate::postgres::PgStore`] - PostgreSQL via sqlx
//! - [`crate::memory::MemoryStore`] - in-process simulation for tests
//!
//! Every method runs against the open transaction. There is no "outside a
//! transaction" path: plain reads go through the coordinator at
//! READ COMMITTED.

use async_trait::async_trait;
use merch_core::{
    coins, IsolationLevel, Order, OrderLine, Product, Transfer, TransferEntry, User,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerResult;

// =============================================================================
// Account Store
// =============================================================================

/// Read/write access to account rows.
#[async_trait]
pub trait AccountStore: Send {
    /// Returns the balance and holds an exclusive row lock until the
    /// transaction ends.
    ///
    /// Concurrent callers on the same account block here until the holder
    /// commits or rolls back.
    ///
    /// ## Errors
    /// * `NotFound` - no such account
    async fn read_for_update(&mut self, user_id: Uuid) -> LedgerResult<i64>;

    /// Persists an already validated balance.
    ///
    /// Only [`AccountStore::apply_delta`] calls this; it exists so adapters
    /// can supply the raw write.
    async fn write_balance(&mut self, user_id: Uuid, balance: i64) -> LedgerResult<User>;

    /// Applies a signed delta to an account balance.
    ///
    /// ## What This Does
    /// 1. Locked read of the current balance
    /// 2. `balance + delta`, rejected if negative (nothing is written)
    /// 3. Writes the new balance and returns the updated account
    ///
    /// ## Errors
    /// * `NotFound` - no such account
    /// * `InsufficientFunds` - the result would be negative
    /// * `InvalidAmount` - the sum overflows
    async fn apply_delta(&mut self, user_id: Uuid, delta: i64) -> LedgerResult<User> {
        let balance = self.read_for_update(user_id).await?;
        let updated = coins::apply_delta(balance, delta)?;

        debug!(user_id = %user_id, balance, delta, updated, "Applying balance delta");

        self.write_balance(user_id, updated).await
    }

    /// Fetches an account by ID.
    async fn find_user_by_id(&mut self, user_id: Uuid) -> LedgerResult<User>;

    /// Fetches an account by exact username.
    async fn find_user_by_username(&mut self, username: &str) -> LedgerResult<User>;

    /// Creates an account.
    ///
    /// ## Errors
    /// * `AlreadyExists` - the username is taken
    async fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        balance: i64,
    ) -> LedgerResult<User>;
}

// =============================================================================
// Catalog Lookup
// =============================================================================

/// Read-only access to the product catalog.
#[async_trait]
pub trait CatalogLookup: Send {
    /// Resolves a product by title, ignoring case.
    ///
    /// ## Errors
    /// * `NotFound` - no product has this title
    async fn find_product_by_title(&mut self, title: &str) -> LedgerResult<Product>;

    /// Lists the catalog ordered by title.
    async fn list_products(&mut self) -> LedgerResult<Vec<Product>>;
}

// =============================================================================
// Ledger Records
// =============================================================================

/// Append-only transfer and order history.
#[async_trait]
pub trait LedgerRecords: Send {
    /// Inserts a transfer row with a generated ID and timestamp.
    async fn record_transfer(&mut self, from: Uuid, to: Uuid, amount: i64)
        -> LedgerResult<Transfer>;

    /// Inserts an order row with a generated ID and timestamp.
    async fn record_order(&mut self, user_id: Uuid, product_id: Uuid) -> LedgerResult<Order>;

    /// Transfers sent by `user_id`, newest first. Counterpart is the receiver.
    async fn list_transfers_from(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>>;

    /// Transfers received by `user_id`, newest first. Counterpart is the sender.
    async fn list_transfers_to(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>>;

    /// Orders placed by `user_id`, newest first.
    async fn list_orders_for(&mut self, user_id: Uuid) -> LedgerResult<Vec<OrderLine>>;
}

// =============================================================================
// Transactions
// =============================================================================

/// An open transaction exposing every store.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait LedgerTx: AccountStore + CatalogLookup + LedgerRecords + Send + 'static {
    /// Makes every write of this transaction visible atomically.
    ///
    /// ## Errors
    /// A serialization failure here means nothing was applied.
    async fn commit(self) -> LedgerResult<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> LedgerResult<()>;
}

/// A store able to open transactions.
#[async_trait]
pub trait TxStore: Send + Sync + 'static {
    type Tx: LedgerTx;

    /// Opens a transaction at the requested isolation level.
    async fn begin(&self, isolation: IsolationLevel) -> LedgerResult<Self::Tx>;
}
