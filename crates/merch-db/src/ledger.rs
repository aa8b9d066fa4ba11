//! # Ledger
//!
//! The operations the HTTP layer calls. Each one is a unit of work run by
//! the [`Coordinator`].
//!
//! ## SendCoins
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate_transfer(from, to, amount)   ← no transaction opened yet      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SERIALIZABLE transaction (retried up to 10 times on 40001)             │
//! │  ├── apply_delta(from, -amount)   ← FOR UPDATE, InsufficientFunds       │
//! │  ├── apply_delta(to, +amount)                                           │
//! │  └── record_transfer(from, to, amount)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (all three or none)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## BuyProduct
//! ```text
//! SERIALIZABLE transaction
//! ├── find_product_by_title(title)      ← NotFound
//! ├── apply_delta(user, -price)         ← InsufficientFunds
//! └── record_order(user, product)
//! ```
//!
//! ## Composition
//! The `*_in` variants take an open transaction so several operations can
//! commit together:
//! ```rust,ignore
//! let ledger2 = ledger.clone();
//! ledger
//!     .coordinator()
//!     .run(None, &TxOptions::money_moving(), move |tx| {
//!         let ledger = ledger2.clone();
//!         Box::pin(async move {
//!             ledger.send_coins_in(Some(&mut *tx), alice, bob, 20).await?;
//!             ledger.buy_product_in(Some(&mut *tx), bob, "cup").await
//!         })
//!     })
//!     .await?;
//! ```

use std::time::Instant;

use merch_core::validation::{
    validate_password_hash, validate_product_title, validate_starting_balance,
    validate_transfer, validate_username,
};
use merch_core::{
    Order, OrderLine, Product, Transfer, TransferEntry, TxOptions, User, UserInfo,
    DEFAULT_STARTING_BALANCE,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::coordinator::Coordinator;
use crate::error::LedgerResult;
use crate::store::{AccountStore, CatalogLookup, LedgerRecords, TxStore};

/// Coin ledger over a transactional store.
///
/// ## Options
/// ```text
/// send_coins / buy_product    SERIALIZABLE     10 retries
/// user_info                   REPEATABLE READ   5 retries
/// everything else             READ COMMITTED    5 retries
/// ```
#[derive(Debug, Clone)]
pub struct Ledger<S> {
    coordinator: Coordinator<S>,
    money: TxOptions,
    reads: TxOptions,
    snapshot: TxOptions,
    starting_balance: i64,
}

impl<S: TxStore> Ledger<S> {
    /// Creates a ledger with default options.
    pub fn new(store: S) -> Self {
        Ledger {
            coordinator: Coordinator::new(store),
            money: TxOptions::money_moving(),
            reads: TxOptions::default(),
            snapshot: TxOptions::snapshot(),
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }

    /// Creates a ledger using the retry budget, attempt timeout and
    /// starting balance from `config`.
    pub fn from_config(store: S, config: &LedgerConfig) -> Self {
        let money = TxOptions::money_moving()
            .with_max_retries(config.max_retries)
            .with_attempt_timeout(config.attempt_timeout);

        Ledger::new(store)
            .with_money_options(money)
            .with_starting_balance(config.starting_balance)
    }

    /// Replaces the options used by `send_coins` and `buy_product`.
    pub fn with_money_options(mut self, options: TxOptions) -> Self {
        self.money = options;
        self
    }

    /// Sets the balance granted by `create_user`.
    pub fn with_starting_balance(mut self, balance: i64) -> Self {
        self.starting_balance = balance;
        self
    }

    /// Returns a copy whose operations give up once `deadline` passes.
    ///
    /// ```rust,ignore
    /// let scoped = ledger.with_deadline(Instant::now() + request_timeout);
    /// scoped.send_coins(from, to, 10).await?;
    /// ```
    pub fn with_deadline(&self, deadline: Instant) -> Self
    where
        S: Clone,
    {
        Ledger {
            coordinator: self.coordinator.clone(),
            money: self.money.with_deadline(deadline),
            reads: self.reads.with_deadline(deadline),
            snapshot: self.snapshot.with_deadline(deadline),
            starting_balance: self.starting_balance,
        }
    }

    /// Returns the coordinator, for composing operations in one transaction.
    pub fn coordinator(&self) -> &Coordinator<S> {
        &self.coordinator
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    // =========================================================================
    // Orchestration
    // =========================================================================

    /// Moves `amount` coins from one account to another.
    ///
    /// ## Errors
    /// * `InvalidAmount` / `SelfTransfer` - checked before any transaction
    /// * `NotFound` - either account is missing
    /// * `InsufficientFunds` - sender cannot cover `amount`
    /// * `Conflict` / `TimedOut` - contention outlasted the retry budget
    pub async fn send_coins(&self, from: Uuid, to: Uuid, amount: i64) -> LedgerResult<Transfer> {
        self.send_coins_in(None, from, to, amount).await
    }

    /// [`Ledger::send_coins`] inside `scope` when given.
    pub async fn send_coins_in(
        &self,
        scope: Option<&mut S::Tx>,
        from: Uuid,
        to: Uuid,
        amount: i64,
    ) -> LedgerResult<Transfer> {
        validate_transfer(from, to, amount)?;
        let scoped = scope.is_some();

        let transfer = self
            .coordinator
            .run(scope, &self.money, move |tx| {
                Box::pin(async move {
                    tx.apply_delta(from, -amount).await?;
                    tx.apply_delta(to, amount).await?;
                    tx.record_transfer(from, to, amount).await
                })
            })
            .await?;

        // A scoped transfer is only final once the owner commits
        if scoped {
            debug!(transfer_id = %transfer.id, amount, "Coins staged in caller transaction");
        } else {
            info!(
                transfer_id = %transfer.id,
                from = %from,
                to = %to,
                amount,
                "Coins sent"
            );
        }

        Ok(transfer)
    }

    /// Buys one unit of the product titled `title` (case-insensitive).
    ///
    /// ## Errors
    /// * `Invalid` - empty or oversized title
    /// * `NotFound` - unknown user or product
    /// * `InsufficientFunds` - balance below the price
    /// * `Conflict` / `TimedOut` - contention outlasted the retry budget
    pub async fn buy_product(&self, user_id: Uuid, title: &str) -> LedgerResult<Order> {
        self.buy_product_in(None, user_id, title).await
    }

    /// [`Ledger::buy_product`] inside `scope` when given.
    pub async fn buy_product_in(
        &self,
        scope: Option<&mut S::Tx>,
        user_id: Uuid,
        title: &str,
    ) -> LedgerResult<Order> {
        validate_product_title(title)?;
        let title = title.trim().to_string();
        let scoped = scope.is_some();

        let order = self
            .coordinator
            .run(scope, &self.money, move |tx| {
                let title = title.clone();
                Box::pin(async move {
                    let product = tx.find_product_by_title(&title).await?;
                    tx.apply_delta(user_id, -product.price).await?;
                    tx.record_order(user_id, product.id).await
                })
            })
            .await?;

        if scoped {
            debug!(order_id = %order.id, "Order staged in caller transaction");
        } else {
            info!(
                order_id = %order.id,
                user_id = %user_id,
                product_id = %order.product_id,
                "Product bought"
            );
        }

        Ok(order)
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Creates an account with the configured starting balance.
    ///
    /// ## Errors
    /// * `Invalid` - bad username or empty hash
    /// * `AlreadyExists` - the username is taken
    pub async fn create_user(&self, username: &str, password_hash: &str) -> LedgerResult<User> {
        validate_username(username)?;
        validate_password_hash(password_hash)?;
        validate_starting_balance(self.starting_balance)?;

        let username = username.to_string();
        let password_hash = password_hash.to_string();
        let balance = self.starting_balance;

        let user = self
            .coordinator
            .run(None, &self.reads, move |tx| {
                let username = username.clone();
                let password_hash = password_hash.clone();
                Box::pin(async move { tx.insert_user(&username, &password_hash, balance).await })
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    /// Fetches an account by ID.
    pub async fn find_user_by_id(&self, user_id: Uuid) -> LedgerResult<User> {
        self.coordinator
            .run(None, &self.reads, move |tx| {
                Box::pin(async move { tx.find_user_by_id(user_id).await })
            })
            .await
    }

    /// Fetches an account by username.
    pub async fn find_user_by_username(&self, username: &str) -> LedgerResult<User> {
        let username = username.to_string();
        self.coordinator
            .run(None, &self.reads, move |tx| {
                let username = username.clone();
                Box::pin(async move { tx.find_user_by_username(&username).await })
            })
            .await
    }

    // =========================================================================
    // Read Paths
    // =========================================================================

    /// Lists the catalog ordered by title.
    pub async fn products(&self) -> LedgerResult<Vec<Product>> {
        self.coordinator
            .run(None, &self.reads, |tx| {
                Box::pin(async move { tx.list_products().await })
            })
            .await
    }

    /// Transfers sent by `user_id`, newest first.
    pub async fn transfers_from(&self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        self.coordinator
            .run(None, &self.reads, move |tx| {
                Box::pin(async move { tx.list_transfers_from(user_id).await })
            })
            .await
    }

    /// Transfers received by `user_id`, newest first.
    pub async fn transfers_to(&self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        self.coordinator
            .run(None, &self.reads, move |tx| {
                Box::pin(async move { tx.list_transfers_to(user_id).await })
            })
            .await
    }

    /// Orders placed by `user_id`, newest first.
    pub async fn orders_for(&self, user_id: Uuid) -> LedgerResult<Vec<OrderLine>> {
        self.coordinator
            .run(None, &self.reads, move |tx| {
                Box::pin(async move { tx.list_orders_for(user_id).await })
            })
            .await
    }

    /// Balance, inventory and coin history of one user, read from a single
    /// REPEATABLE READ snapshot.
    pub async fn user_info(&self, user_id: Uuid) -> LedgerResult<UserInfo> {
        let info = self
            .coordinator
            .run(None, &self.snapshot, move |tx| {
                Box::pin(async move {
                    let user = tx.find_user_by_id(user_id).await?;
                    let orders = tx.list_orders_for(user_id).await?;
                    let received = tx.list_transfers_to(user_id).await?;
                    let sent = tx.list_transfers_from(user_id).await?;
                    Ok(UserInfo::assemble(&user, &orders, &received, &sent))
                })
            })
            .await?;

        debug!(
            user_id = %user_id,
            coins = info.coins,
            items = info.inventory.len(),
            "User info assembled"
        );

        Ok(info)
    }
}
