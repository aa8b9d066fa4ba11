//! # Repository Module
//!
//! PostgreSQL statements for the ledger tables.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PgTx (one open transaction)                                            │
//! │       │                                                                 │
//! │       │  user::lock_balance(&mut *tx, id)                               │
//! │       ▼                                                                 │
//! │  free functions taking &mut PgConnection                                │
//! │  ├── user      lock_balance, set_balance, find_*, insert                │
//! │  ├── product   find_by_title, list, upsert                              │
//! │  ├── order     insert, list_for_user                                    │
//! │  └── transfer  insert, list_from, list_to                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function runs on whatever connection it is handed, so the caller
//! decides the transaction boundary. Queries are checked at runtime
//! (`query_as`), so building the crate needs no live database.

pub mod order;
pub mod product;
pub mod transfer;
pub mod user;
