//! # In-Memory Store
//!
//! A transactional store that lives in process memory. It behaves like the
//! PostgreSQL store where the ledger depends on it, so the whole engine can be
//! exercised without a database.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Shared                                                                 │
//! │  ┌───────────────────────────────────────────────────────────────────┐  │
//! │  │ Mutex<Tables>                                                     │  │
//! │  │   users (row + version)   products   orders   transfers           │  │
//! │  │   locks: row → tx         waits: tx → row      commit_seq         │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │  Notify  ◄── every commit / rollback / drop wakes blocked lockers       │
//! └─────────────────────────────────────────────────────────────────────────┘
//!        ▲                          ▲
//!        │ begin()                  │ begin()
//!   MemoryTx #1                MemoryTx #2
//!   (buffered writes,          (buffered writes,
//!    held locks, snapshot)      held locks, snapshot)
//! ```
//!
//! ## Semantics
//! - Writes are buffered per transaction and applied in one step on commit.
//! - `read_for_update` takes an exclusive row lock. Other lockers block until
//!   the holder ends.
//! - A lock wait that would close a cycle in the wait-for graph aborts the
//!   waiter with a serialization failure (deadlock detection).
//! - At REPEATABLE READ and SERIALIZABLE, locking a row committed after the
//!   transaction began is a serialization failure.
//! - At SERIALIZABLE, accounts read without a lock are re-validated at
//!   commit.
//! - Plain reads at READ COMMITTED see the latest committed state. At
//!   REPEATABLE READ and SERIALIZABLE they see the accounts, orders and
//!   transfers committed before the transaction began. Both see the
//!   transaction's own writes.
//! - [`MemoryStore::inject_conflicts`] makes the next commits fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merch_core::{
    IsolationLevel, Order, OrderLine, Product, Transfer, TransferEntry, User,
};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::store::{AccountStore, CatalogLookup, LedgerRecords, LedgerTx, TxStore};

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug, Clone)]
struct AccountRow {
    user: User,
    /// `commit_seq` of the last commit that wrote this row.
    version: u64,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, AccountRow>,
    products: Vec<Product>,
    orders: Vec<Order>,
    transfers: Vec<Transfer>,
    locks: HashMap<Uuid, u64>,
    waits: HashMap<u64, Uuid>,
    commit_seq: u64,
    injected_conflicts: u32,
}

impl Tables {
    fn username_taken(&self, username: &str) -> bool {
        self.users.values().any(|row| row.user.username == username)
    }

    /// Follows the wait-for chain from `holder`; true if it leads back to
    /// `waiter`.
    fn closes_cycle(&self, waiter: u64, holder: u64) -> bool {
        let mut current = holder;
        for _ in 0..=self.waits.len() {
            if current == waiter {
                return true;
            }
            match self.waits.get(&current).and_then(|row| self.locks.get(row)) {
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }

    fn release(&mut self, tx_id: u64) {
        self.locks.retain(|_, holder| *holder != tx_id);
        self.waits.remove(&tx_id);
    }
}

/// Committed state as of `begin`, kept by snapshot transactions.
///
/// Orders and transfers are append-only, so their prefix lengths suffice.
#[derive(Debug)]
struct Frozen {
    users: HashMap<Uuid, AccountRow>,
    orders: usize,
    transfers: usize,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    released: Notify,
    next_tx: AtomicU64,
}

impl Shared {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-process transactional store.
///
/// Cloning is cheap; every clone shares the same tables.
///
/// ## Usage
/// ```rust,ignore
/// let store = MemoryStore::new();
/// store.add_product("t-shirt", 80);
/// let ledger = Ledger::new(store.clone());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product, or updates the price of one with the same title
    /// (ignoring case). Visible immediately.
    pub fn add_product(&self, title: &str, price: i64) -> Product {
        let mut tables = self.shared.tables();
        let wanted = title.to_lowercase();

        if let Some(existing) = tables
            .products
            .iter_mut()
            .find(|p| p.title.to_lowercase() == wanted)
        {
            existing.price = price;
            return existing.clone();
        }

        let product = Product {
            id: Uuid::new_v4(),
            title: title.to_string(),
            price,
        };
        tables.products.push(product.clone());
        product
    }

    /// Makes the next `count` commits fail with a serialization failure.
    pub fn inject_conflicts(&self, count: u32) {
        self.shared.tables().injected_conflicts = count;
    }

    /// Committed balance of an account.
    pub fn committed_balance(&self, user_id: Uuid) -> Option<i64> {
        self.shared
            .tables()
            .users
            .get(&user_id)
            .map(|row| row.user.balance)
    }

    /// Sum of all committed balances.
    pub fn total_balance(&self) -> i64 {
        self.shared
            .tables()
            .users
            .values()
            .map(|row| row.user.balance)
            .sum()
    }

    /// Number of committed transfer rows.
    pub fn transfer_count(&self) -> usize {
        self.shared.tables().transfers.len()
    }

    /// Number of committed order rows.
    pub fn order_count(&self) -> usize {
        self.shared.tables().orders.len()
    }
}

#[async_trait]
impl TxStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self, isolation: IsolationLevel) -> LedgerResult<MemoryTx> {
        let id = self.shared.next_tx.fetch_add(1, Ordering::Relaxed) + 1;

        let (snapshot, frozen) = {
            let tables = self.shared.tables();
            let frozen = isolation.uses_snapshot().then(|| Frozen {
                users: tables.users.clone(),
                orders: tables.orders.len(),
                transfers: tables.transfers.len(),
            });
            (tables.commit_seq, frozen)
        };

        Ok(MemoryTx {
            id,
            isolation,
            snapshot,
            frozen,
            shared: Arc::clone(&self.shared),
            held: HashSet::new(),
            balances: HashMap::new(),
            new_users: Vec::new(),
            orders: Vec::new(),
            transfers: Vec::new(),
            read_versions: HashMap::new(),
            finished: false,
        })
    }
}

// =============================================================================
// MemoryTx
// =============================================================================

/// An open in-memory transaction.
///
/// Dropping it without commit discards its writes and releases its locks.
#[derive(Debug)]
pub struct MemoryTx {
    id: u64,
    isolation: IsolationLevel,
    snapshot: u64,
    frozen: Option<Frozen>,
    shared: Arc<Shared>,
    held: HashSet<Uuid>,
    balances: HashMap<Uuid, i64>,
    new_users: Vec<User>,
    orders: Vec<Order>,
    transfers: Vec<Transfer>,
    read_versions: HashMap<Uuid, u64>,
    finished: bool,
}

impl MemoryTx {
    fn committed_users<'a>(&'a self, tables: &'a Tables) -> &'a HashMap<Uuid, AccountRow> {
        match &self.frozen {
            Some(frozen) => &frozen.users,
            None => &tables.users,
        }
    }

    fn committed_orders<'a>(&self, tables: &'a Tables) -> impl Iterator<Item = &'a Order> {
        let visible = self.frozen.as_ref().map_or(tables.orders.len(), |f| f.orders);
        tables.orders.iter().take(visible)
    }

    fn committed_transfers<'a>(&self, tables: &'a Tables) -> impl Iterator<Item = &'a Transfer> {
        let visible = self
            .frozen
            .as_ref()
            .map_or(tables.transfers.len(), |f| f.transfers);
        tables.transfers.iter().take(visible)
    }

    /// Account as this transaction sees it.
    fn visible_user(&self, tables: &Tables, user_id: Uuid) -> Option<User> {
        let mut user = self
            .new_users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .or_else(|| {
                self.committed_users(tables)
                    .get(&user_id)
                    .map(|row| row.user.clone())
            })?;

        if let Some(&balance) = self.balances.get(&user_id) {
            user.balance = balance;
        }
        Some(user)
    }

    fn note_read(&mut self, tables: &Tables, user_id: Uuid) {
        if self.isolation != IsolationLevel::Serializable || self.held.contains(&user_id) {
            return;
        }
        let version = self.committed_users(tables).get(&user_id).map(|row| row.version);
        if let Some(version) = version {
            self.read_versions.entry(user_id).or_insert(version);
        }
    }

    /// Takes the exclusive lock on an account row, waiting for the holder.
    async fn lock_row(&mut self, user_id: Uuid) -> DbResult<()> {
        if self.held.contains(&user_id) || self.new_users.iter().any(|u| u.id == user_id) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);

        loop {
            let released = shared.released.notified();

            {
                let mut tables = shared.tables();

                let version = match tables.users.get(&user_id) {
                    Some(row) => row.version,
                    None => {
                        tables.waits.remove(&self.id);
                        return Err(DbError::not_found("User", user_id));
                    }
                };

                match tables.locks.get(&user_id).copied() {
                    None => {
                        tables.waits.remove(&self.id);

                        if self.isolation.uses_snapshot() && version > self.snapshot {
                            return Err(DbError::SerializationFailure(
                                "could not serialize access due to concurrent update".to_string(),
                            ));
                        }

                        tables.locks.insert(user_id, self.id);
                        self.held.insert(user_id);
                        return Ok(());
                    }
                    Some(holder) => {
                        if tables.closes_cycle(self.id, holder) {
                            tables.waits.remove(&self.id);
                            debug!(tx = self.id, holder, user_id = %user_id, "Deadlock detected");
                            return Err(DbError::SerializationFailure(
                                "deadlock detected".to_string(),
                            ));
                        }
                        tables.waits.insert(self.id, user_id);
                    }
                }
            }

            released.await;
        }
    }

    fn apply(&mut self, tables: &mut Tables) -> DbResult<u64> {
        if tables.injected_conflicts > 0 {
            tables.injected_conflicts -= 1;
            return Err(DbError::SerializationFailure(
                "injected serialization failure".to_string(),
            ));
        }

        if self.isolation == IsolationLevel::Serializable {
            for (user_id, version) in &self.read_versions {
                if self.held.contains(user_id) {
                    continue;
                }
                if tables.users.get(user_id).map(|row| row.version) != Some(*version) {
                    return Err(DbError::SerializationFailure(
                        "could not serialize access due to read/write dependencies".to_string(),
                    ));
                }
            }
        }

        if let Some(user) = self
            .new_users
            .iter()
            .find(|u| tables.username_taken(&u.username))
        {
            return Err(DbError::duplicate("username", user.username.clone()));
        }

        tables.commit_seq += 1;
        let seq = tables.commit_seq;

        for user in self.new_users.drain(..) {
            tables.users.insert(user.id, AccountRow { user, version: seq });
        }
        for (user_id, balance) in self.balances.drain() {
            if let Some(row) = tables.users.get_mut(&user_id) {
                row.user.balance = balance;
                row.version = seq;
            }
        }
        tables.orders.append(&mut self.orders);
        tables.transfers.append(&mut self.transfers);

        Ok(seq)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shared.tables().release(self.id);
        self.shared.released.notify_waiters();
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.finish();
    }
}

#[async_trait]
impl AccountStore for MemoryTx {
    async fn read_for_update(&mut self, user_id: Uuid) -> LedgerResult<i64> {
        self.lock_row(user_id).await?;

        let shared = Arc::clone(&self.shared);
        let tables = shared.tables();
        self.visible_user(&tables, user_id)
            .map(|user| user.balance)
            .ok_or_else(|| DbError::not_found("User", user_id).into())
    }

    async fn write_balance(&mut self, user_id: Uuid, balance: i64) -> LedgerResult<User> {
        if balance < 0 {
            return Err(DbError::CheckViolation {
                message: "users_balance_non_negative".to_string(),
            }
            .into());
        }

        self.lock_row(user_id).await?;
        self.balances.insert(user_id, balance);

        let shared = Arc::clone(&self.shared);
        let tables = shared.tables();
        self.visible_user(&tables, user_id)
            .ok_or_else(|| DbError::not_found("User", user_id).into())
    }

    async fn find_user_by_id(&mut self, user_id: Uuid) -> LedgerResult<User> {
        let shared = Arc::clone(&self.shared);
        let tables = shared.tables();

        self.note_read(&tables, user_id);
        self.visible_user(&tables, user_id)
            .ok_or_else(|| DbError::not_found("User", user_id).into())
    }

    async fn find_user_by_username(&mut self, username: &str) -> LedgerResult<User> {
        let shared = Arc::clone(&self.shared);
        let tables = shared.tables();

        let user_id = self
            .new_users
            .iter()
            .map(|u| (u.id, u.username.as_str()))
            .chain(
                self.committed_users(&tables)
                    .values()
                    .map(|row| (row.user.id, row.user.username.as_str())),
            )
            .find(|(_, name)| *name == username)
            .map(|(id, _)| id)
            .ok_or_else(|| DbError::not_found("User", username))?;

        self.note_read(&tables, user_id);
        self.visible_user(&tables, user_id)
            .ok_or_else(|| DbError::not_found("User", username).into())
    }

    async fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        balance: i64,
    ) -> LedgerResult<User> {
        if balance < 0 {
            return Err(DbError::CheckViolation {
                message: "users_balance_non_negative".to_string(),
            }
            .into());
        }

        {
            let tables = self.shared.tables();
            if tables.username_taken(username)
                || self.new_users.iter().any(|u| u.username == username)
            {
                return Err(DbError::duplicate("username", username).into());
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            balance,
            created_at: Utc::now(),
        };
        self.new_users.push(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CatalogLookup for MemoryTx {
    async fn find_product_by_title(&mut self, title: &str) -> LedgerResult<Product> {
        let wanted = title.to_lowercase();
        self.shared
            .tables()
            .products
            .iter()
            .find(|p| p.title.to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| DbError::not_found("Product", title).into())
    }

    async fn list_products(&mut self) -> LedgerResult<Vec<Product>> {
        let mut products = self.shared.tables().products.clone();
        products.sort_by_key(|p| p.title.to_lowercase());
        Ok(products)
    }
}

#[async_trait]
impl LedgerRecords for MemoryTx {
    async fn record_transfer(
        &mut self,
        from: Uuid,
        to: Uuid,
        amount: i64,
    ) -> LedgerResult<Transfer> {
        if amount <= 0 || from == to {
            return Err(DbError::CheckViolation {
                message: "transfers_amount_positive / transfers_distinct_parties".to_string(),
            }
            .into());
        }

        {
            let tables = self.shared.tables();
            if self.visible_user(&tables, from).is_none() || self.visible_user(&tables, to).is_none()
            {
                return Err(DbError::ForeignKeyViolation {
                    message: "transfers references unknown user".to_string(),
                }
                .into());
            }
        }

        let transfer = Transfer {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn record_order(&mut self, user_id: Uuid, product_id: Uuid) -> LedgerResult<Order> {
        {
            let tables = self.shared.tables();
            if self.visible_user(&tables, user_id).is_none()
                || !tables.products.iter().any(|p| p.id == product_id)
            {
                return Err(DbError::ForeignKeyViolation {
                    message: "orders references unknown user or product".to_string(),
                }
                .into());
            }
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            product_id,
            created_at: Utc::now(),
        };
        self.orders.push(order.clone());
        Ok(order)
    }

    async fn list_transfers_from(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        let tables = self.shared.tables();
        let entries = self
            .committed_transfers(&tables)
            .chain(self.transfers.iter())
            .filter(|t| t.from_user_id == user_id)
            .filter_map(|t| {
                let receiver = self.visible_user(&tables, t.to_user_id)?;
                Some(TransferEntry::from_transfer(t, receiver.username))
            })
            .collect();

        Ok(newest_first(entries, |e: &TransferEntry| e.created_at))
    }

    async fn list_transfers_to(&mut self, user_id: Uuid) -> LedgerResult<Vec<TransferEntry>> {
        let tables = self.shared.tables();
        let entries = self
            .committed_transfers(&tables)
            .chain(self.transfers.iter())
            .filter(|t| t.to_user_id == user_id)
            .filter_map(|t| {
                let sender = self.visible_user(&tables, t.from_user_id)?;
                Some(TransferEntry::from_transfer(t, sender.username))
            })
            .collect();

        Ok(newest_first(entries, |e: &TransferEntry| e.created_at))
    }

    async fn list_orders_for(&mut self, user_id: Uuid) -> LedgerResult<Vec<OrderLine>> {
        let tables = self.shared.tables();
        let lines = self
            .committed_orders(&tables)
            .chain(self.orders.iter())
            .filter(|o| o.user_id == user_id)
            .filter_map(|o| {
                let product = tables.products.iter().find(|p| p.id == o.product_id)?;
                Some(OrderLine {
                    id: o.id,
                    user_id: o.user_id,
                    product_id: o.product_id,
                    product_title: product.title.clone(),
                    product_price: product.price,
                    created_at: o.created_at,
                })
            })
            .collect();

        Ok(newest_first(lines, |l: &OrderLine| l.created_at))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn commit(mut self) -> LedgerResult<()> {
        let shared = Arc::clone(&self.shared);
        let outcome = {
            let mut tables = shared.tables();
            self.apply(&mut tables)
        };
        self.finish();

        match outcome {
            Ok(seq) => {
                debug!(tx = self.id, seq, "Memory transaction committed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn rollback(mut self) -> LedgerResult<()> {
        self.finish();
        Ok(())
    }
}

/// Sorts by timestamp descending; rows with equal timestamps keep reverse
/// insertion order.
fn newest_first<T, F>(mut rows: Vec<T>, at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    rows.reverse();
    rows.sort_by(|a, b| at(b).cmp(&at(a)));
    rows
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use std::time::Duration;

    async fn user(store: &MemoryStore, name: &str, balance: i64) -> User {
        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let user = tx.insert_user(name, "hash", balance).await.unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        let updated = tx.apply_delta(alice.id, -30).await.unwrap();
        assert_eq!(updated.balance, 70);

        // Not visible before commit
        assert_eq!(store.committed_balance(alice.id), Some(100));

        tx.commit().await.unwrap();
        assert_eq!(store.committed_balance(alice.id), Some(70));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        tx.apply_delta(alice.id, -30).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
            tx.apply_delta(alice.id, -50).await.unwrap();
        }

        assert_eq!(store.committed_balance(alice.id), Some(100));

        // The dropped transaction released its lock
        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        assert_eq!(tx.read_for_update(alice.id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_insufficient_funds_writes_nothing() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 10).await;

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        let err = tx.apply_delta(alice.id, -11).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 10,
                requested: 11
            }
        ));
        tx.commit().await.unwrap();

        assert_eq!(store.committed_balance(alice.id), Some(10));
    }

    #[tokio::test]
    async fn test_negative_write_is_check_violation() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 10).await;

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = tx.write_balance(alice.id, -1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Unavailable(DbError::CheckViolation { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_locker_waits_then_sees_conflict_under_serializable() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;

        let mut first = store.begin(IsolationLevel::Serializable).await.unwrap();
        first.apply_delta(alice.id, -10).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = waiter_store
                .begin(IsolationLevel::Serializable)
                .await
                .unwrap();
            second.read_for_update(alice.id).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.commit().await.unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_serialization_failure());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_locker_waits_then_reads_latest_under_read_committed() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;

        let mut first = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        first.apply_delta(alice.id, -10).await.unwrap();

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = waiter_store
                .begin(IsolationLevel::ReadCommitted)
                .await
                .unwrap();
            second.read_for_update(alice.id).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        first.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), 90);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadlock_aborts_one_waiter() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;
        let bob = user(&store, "bob", 100).await;

        let mut first = store.begin(IsolationLevel::Serializable).await.unwrap();
        let mut second = store.begin(IsolationLevel::Serializable).await.unwrap();
        first.read_for_update(alice.id).await.unwrap();
        second.read_for_update(bob.id).await.unwrap();

        let blocked = tokio::spawn(async move {
            let balance = first.read_for_update(bob.id).await;
            (first, balance)
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = second.read_for_update(alice.id).await.unwrap_err();
        assert!(err.is_serialization_failure());
        drop(second);

        let (first, balance) = blocked.await.unwrap();
        assert_eq!(balance.unwrap(), 100);
        first.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_conflicts_fail_commits() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;
        store.inject_conflicts(1);

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        tx.apply_delta(alice.id, 5).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert!(err.is_serialization_failure());
        assert_eq!(store.committed_balance(alice.id), Some(100));

        let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
        tx.apply_delta(alice.id, 5).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.committed_balance(alice.id), Some(105));
    }

    #[tokio::test]
    async fn test_serializable_validates_unlocked_reads() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;
        let bob = user(&store, "bob", 100).await;

        let mut reader = store.begin(IsolationLevel::Serializable).await.unwrap();
        reader.find_user_by_id(alice.id).await.unwrap();

        let mut writer = store.begin(IsolationLevel::Serializable).await.unwrap();
        writer.apply_delta(alice.id, -1).await.unwrap();
        writer.commit().await.unwrap();

        reader.apply_delta(bob.id, 1).await.unwrap();
        let err = reader.commit().await.unwrap_err();
        assert!(err.is_serialization_failure());
        assert_eq!(store.committed_balance(bob.id), Some(100));
    }

    #[tokio::test]
    async fn test_repeatable_read_sees_state_as_of_begin() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice", 100).await;
        let bob = user(&store, "bob", 0).await;

        let mut reader = store.begin(IsolationLevel::RepeatableRead).await.unwrap();
        let mut latest = store.begin(IsolationLevel::ReadCommitted).await.unwrap();

        let mut writer = store.begin(IsolationLevel::Serializable).await.unwrap();
        writer.apply_delta(alice.id, -40).await.unwrap();
        writer.apply_delta(bob.id, 40).await.unwrap();
        writer.record_transfer(alice.id, bob.id, 40).await.unwrap();
        writer.commit().await.unwrap();

        assert_eq!(reader.find_user_by_id(alice.id).await.unwrap().balance, 100);
        assert_eq!(reader.find_user_by_username("bob").await.unwrap().balance, 0);
        assert!(reader.list_transfers_from(alice.id).await.unwrap().is_empty());
        assert!(reader.list_transfers_to(bob.id).await.unwrap().is_empty());

        assert_eq!(latest.find_user_by_id(alice.id).await.unwrap().balance, 60);
        assert_eq!(latest.list_transfers_to(bob.id).await.unwrap().len(), 1);

        // Accounts created later are invisible to the older snapshot
        user(&store, "carol", 10).await;
        let err = reader.find_user_by_username("carol").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let store = MemoryStore::new();
        user(&store, "alice", 100).await;

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = tx.insert_user("alice", "hash", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_product_lookup_ignores_case() {
        let store = MemoryStore::new();
        let shirt = store.add_product("T-Shirt", 80);
        let repriced = store.add_product("t-shirt", 90);
        assert_eq!(shirt.id, repriced.id);

        let mut tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let found = tx.find_product_by_title("t-SHIRT").await.unwrap();
        assert_eq!(found.price, 90);

        let err = tx.find_product_by_title("hat").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
