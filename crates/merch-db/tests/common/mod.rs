#![allow(dead_code)]

use merch_core::User;
use merch_db::{Ledger, MemoryStore};

pub const CATALOG: &[(&str, i64)] = &[
    ("t-shirt", 80),
    ("cup", 20),
    ("book", 50),
    ("pen", 10),
    ("powerbank", 200),
    ("hoody", 300),
];

/// A ledger over a fresh in-memory store with the catalog loaded.
pub fn ledger() -> (MemoryStore, Ledger<MemoryStore>) {
    let store = MemoryStore::new();
    for (title, price) in CATALOG {
        store.add_product(title, *price);
    }
    (store.clone(), Ledger::new(store))
}

pub async fn user_with(ledger: &Ledger<MemoryStore>, name: &str, balance: i64) -> User {
    ledger
        .clone()
        .with_starting_balance(balance)
        .create_user(name, "$argon2id$v=19$stub")
        .await
        .expect("Failed to create user")
}
