//! # PostgreSQL Store
//!
//! [`TxStore`] over a `PgPool`. Each [`PgTx`] owns one pooled connection
//! with an open transaction and forwards every storage call to the
//! repository functions.
//!
//! ## Begin
//! ```text
//! pool.begin()                                  ──► BEGIN
//! SET TRANSACTION ISOLATION LEVEL SERIALIZABLE  ──► must be the first
//!                                                   statement of the tx
//! ```
//!
//! Dropping a `PgTx` without commit returns the connection to the pool and
//! rolls the transaction back.

use async_trait::async_trait;
use merch_core::{IsolationLevel, Order, OrderLine, Product, Transfer, TransferEntry, User};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::repository::{order, product, transfer, user};
use crate::store::{AccountStore, CatalogLookup, LedgerRecords, LedgerTx, TxStore};

/// Transactional store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Returns the pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TxStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self, isolation: IsolationLevel) -> LedgerResult<PgTx> {
        let mut tx = self.pool.begin().await?;

        let set_isolation = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        sqlx::query(&set_isolation).execute(&mut *tx).await?;

        debug!(isolation = %isolation, "Transaction opened");

        Ok(PgTx { tx })
    }
}

/// An open PostgreSQL transaction.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountStore for PgTx {
    async fn read_for_update(&mut self, user_id: Uuid) -> LedgerResult<i64> {
        Ok(user::lock_balance(&mut *self.tx, user_id).await?)
    }

    async fn write_balance(&mut self, user_id: Uuid, balance: i64) -> LedgerResult<User> {
        Ok(user::set_balance(&mut *self.tx, user_id, balance).await?)
    }

    async fn find_user_by_id(&mut self, user_id: Uuid) -> LedgerResult<User> {
        Ok(user::find_by_id(&mut *self.tx, user_id).await?)
    }

    async fn find_user_by_username(&mut self, username: &str) -> LedgerResult<User> {
        Ok(user::find_by_username(&mut *self.tx, username).await?)
    }

    async fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        balance: i64,
    ) -> LedgerResult<User> {
        Ok(user::insert(&mut *self.tx, username, password_hash, balance).await?)
    }
}

#[async_trait]
impl CatalogLookup for PgTx {
    async fn find_product_by_title(&mut self, title: &str) -> LedgerResult<Product> {
        Ok(product::find_by_title(&mut *self.tx, title).await?)
    }

    async fn list_products(&mut self) -> LedgerResult<Vec<Product>> {
        Ok(product::list(&mut *self.tx).await?)
    }
}

#[async_trait]
impl LedgerRecords for PgTx {
    async fn record_transfer(
        &mut self,
        from: Uuid,
        to: Uuid,
        amount: i64,
    ) -> LedgerResult<Transfer> {
        Ok(transfer::insert(&mut *self.tx, from, to, amount).await?)
    }

    async fn record_order(&mut self, user_id: Uuid, product_id: Uuid) -> LedgerResult<Order> {
        Ok(order::insert(&mut *self.tx, user_id, product_id).await?)
    }

    async fn list_transfers_from(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        Ok(transfer::list_from(&mut *self.tx, user_id).await?)
    }

    async fn list_transfers_to(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        Ok(transfer::list_to(&mut *self.tx, user_id).await?)
    }

    async fn list_orders_for(&mut self, user_id: Uuid) -> LedgerResult<Vec<OrderLine>> {
        Ok(order::list_for_user(&mut *self.tx, user_id).await?)
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
