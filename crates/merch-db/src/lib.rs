//! # merch-db: Ledger Engine for the Merch Shop
//!
//! Owns every coin movement: transfers between employees and merch
//! purchases. Each movement runs in one SERIALIZABLE transaction that is
//! retried when PostgreSQL reports a serialization conflict.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Merch Shop Data Flow                             │
//! │                                                                         │
//! │  HTTP handler (POST /api/sendCoin, GET /api/buy/{item}, /api/info)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     merch-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   Ledger ──► Coordinator ──► TxStore::begin(isolation)          │   │
//! │  │                                  │                              │   │
//! │  │                    ┌─────────────┴─────────────┐                │   │
//! │  │                    ▼                           ▼                │   │
//! │  │              PgStore / PgTx           MemoryStore / MemoryTx    │   │
//! │  │              (repository/*.rs)        (tests, no database)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL (users, products, orders, transfers)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`ledger`] - `send_coins`, `buy_product`, users and read paths
//! - [`coordinator`] - transaction lifecycle and conflict retry
//! - [`store`] - storage traits implemented by each adapter
//! - [`postgres`] / [`repository`] - PostgreSQL adapter and its SQL
//! - [`memory`] - in-process transactional store
//! - [`pool`] / [`migrations`] - connection pool and embedded schema
//! - [`config`] - environment configuration
//! - [`error`] - `DbError` and the public `LedgerError`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use merch_db::{Database, LedgerConfig};
//!
//! let config = LedgerConfig::from_env()?;
//! let db = Database::new(config.db.clone()).await?;
//! let ledger = db.ledger(&config);
//!
//! let alice = ledger.create_user("alice", &hash).await?;
//! ledger.send_coins(alice.id, bob.id, 100).await?;
//! ledger.buy_product(alice.id, "t-shirt").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use coordinator::Coordinator;
pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use ledger::Ledger;
pub use memory::{MemoryStore, MemoryTx};
pub use pool::{Database, DbConfig};
pub use postgres::{PgStore, PgTx};
pub use store::{AccountStore, CatalogLookup, LedgerRecords, LedgerTx, TxStore};
