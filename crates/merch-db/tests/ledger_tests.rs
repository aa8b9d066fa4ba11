use std::io;
use std::sync::{Arc, Mutex};

use merch_core::{InventoryItem, IsolationLevel, TxOptions};
use merch_db::{AccountStore, Ledger, LedgerConfig, LedgerError, LedgerTx, MemoryStore, TxStore};
use uuid::Uuid;

mod common;

use common::{ledger, user_with};

// =============================================================================
// SendCoins
// =============================================================================

#[tokio::test]
async fn test_send_entire_balance_then_overdraw() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 0).await;

    let transfer = ledger.send_coins(alice.id, bob.id, 100).await.unwrap();
    assert_eq!(transfer.amount, 100);
    assert_eq!(transfer.from_user_id, alice.id);
    assert_eq!(transfer.to_user_id, bob.id);
    assert_eq!(store.committed_balance(alice.id), Some(0));
    assert_eq!(store.committed_balance(bob.id), Some(100));

    let err = ledger.send_coins(alice.id, bob.id, 1).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            balance: 0,
            requested: 1
        }
    ));

    assert_eq!(store.committed_balance(alice.id), Some(0));
    assert_eq!(store.committed_balance(bob.id), Some(100));
    assert_eq!(store.transfer_count(), 1);
}

#[tokio::test]
async fn test_send_rejects_bad_preconditions() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 100).await;

    let err = ledger.send_coins(alice.id, alice.id, 10).await.unwrap_err();
    assert!(matches!(err, LedgerError::SelfTransfer));

    let err = ledger.send_coins(alice.id, bob.id, 0).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { amount: 0 }));

    let err = ledger.send_coins(alice.id, bob.id, -5).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { amount: -5 }));

    // Amount is checked before the parties
    let err = ledger.send_coins(alice.id, alice.id, 0).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));

    assert_eq!(store.transfer_count(), 0);
    assert_eq!(store.committed_balance(alice.id), Some(100));
}

#[tokio::test]
async fn test_send_to_unknown_user_rolls_back_debit() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;

    let err = ledger
        .send_coins(alice.id, Uuid::new_v4(), 40)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    assert_eq!(store.committed_balance(alice.id), Some(100));
    assert_eq!(store.transfer_count(), 0);
    assert!(ledger.transfers_from(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_from_unknown_user() {
    let (_store, ledger) = ledger();
    let bob = user_with(&ledger, "bob", 0).await;

    let err = ledger
        .send_coins(Uuid::new_v4(), bob.id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
    assert!(err.is_business_rule());
}

// =============================================================================
// BuyProduct
// =============================================================================

#[tokio::test]
async fn test_buy_exact_price_then_repeat() {
    let (store, ledger) = ledger();
    store.add_product("t-shirt", 50);
    let alice = user_with(&ledger, "alice", 50).await;

    let order = ledger.buy_product(alice.id, "t-shirt").await.unwrap();
    assert_eq!(order.user_id, alice.id);
    assert_eq!(store.committed_balance(alice.id), Some(0));
    assert_eq!(store.order_count(), 1);

    let err = ledger.buy_product(alice.id, "t-shirt").await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            balance: 0,
            requested: 50
        }
    ));
    assert_eq!(store.order_count(), 1);
}

#[tokio::test]
async fn test_buy_matches_title_ignoring_case() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 1000).await;

    ledger.buy_product(alice.id, "T-SHIRT").await.unwrap();
    ledger.buy_product(alice.id, "  Cup ").await.unwrap();

    assert_eq!(store.committed_balance(alice.id), Some(1000 - 80 - 20));

    let orders = ledger.orders_for(alice.id).await.unwrap();
    let titles: Vec<_> = orders.iter().map(|o| o.product_title.as_str()).collect();
    assert_eq!(titles, vec!["cup", "t-shirt"]);
}

#[tokio::test]
async fn test_buy_unknown_product() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 1000).await;

    let err = ledger.buy_product(alice.id, "yacht").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    let err = ledger.buy_product(alice.id, "   ").await.unwrap_err();
    assert!(matches!(err, LedgerError::Invalid(_)));

    assert_eq!(store.committed_balance(alice.id), Some(1000));
    assert_eq!(store.order_count(), 0);
}

#[tokio::test]
async fn test_buy_for_unknown_user() {
    let (store, ledger) = ledger();

    let err = ledger.buy_product(Uuid::new_v4(), "pen").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
    assert_eq!(store.order_count(), 0);
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_create_and_find_users() {
    let (_store, ledger) = ledger();

    let alice = ledger.create_user("alice", "hash").await.unwrap();
    assert_eq!(alice.balance, 1000);

    let by_id = ledger.find_user_by_id(alice.id).await.unwrap();
    let by_name = ledger.find_user_by_username("alice").await.unwrap();
    assert_eq!(by_id, alice);
    assert_eq!(by_name, alice);

    let err = ledger.find_user_by_username("mallory").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn test_create_user_rejects_duplicates_and_bad_input() {
    let (_store, ledger) = ledger();
    ledger.create_user("alice", "hash").await.unwrap();

    let err = ledger.create_user("alice", "other").await.unwrap_err();
    match err {
        LedgerError::AlreadyExists { field, value } => {
            assert_eq!(field, "username");
            assert_eq!(value, "alice");
        }
        other => panic!("expected AlreadyExists, got {other:?}"),
    }

    assert!(matches!(
        ledger.create_user("", "hash").await.unwrap_err(),
        LedgerError::Invalid(_)
    ));
    assert!(matches!(
        ledger.create_user("two words", "hash").await.unwrap_err(),
        LedgerError::Invalid(_)
    ));
    assert!(matches!(
        ledger.create_user("bob", "").await.unwrap_err(),
        LedgerError::Invalid(_)
    ));
}

// =============================================================================
// Read Paths
// =============================================================================

#[tokio::test]
async fn test_products_sorted_by_title() {
    let (_store, ledger) = ledger();

    let titles: Vec<_> = ledger
        .products()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.title)
        .collect();

    assert_eq!(
        titles,
        vec!["book", "cup", "hoody", "pen", "powerbank", "t-shirt"]
    );
}

#[tokio::test]
async fn test_transfer_history_newest_first_with_counterpart() {
    let (_store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 100).await;

    ledger.send_coins(alice.id, bob.id, 1).await.unwrap();
    ledger.send_coins(alice.id, bob.id, 2).await.unwrap();
    ledger.send_coins(bob.id, alice.id, 3).await.unwrap();

    let sent = ledger.transfers_from(alice.id).await.unwrap();
    let amounts: Vec<_> = sent.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![2, 1]);
    assert!(sent.iter().all(|t| t.counterpart == "bob"));

    let received = ledger.transfers_to(alice.id).await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].amount, 3);
    assert_eq!(received[0].counterpart, "bob");
}

#[tokio::test]
async fn test_user_info_summary() {
    let (_store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 1000).await;
    let bob = user_with(&ledger, "bob", 1000).await;

    ledger.send_coins(alice.id, bob.id, 30).await.unwrap();
    ledger.send_coins(bob.id, alice.id, 5).await.unwrap();
    ledger.buy_product(alice.id, "cup").await.unwrap();
    ledger.buy_product(alice.id, "pen").await.unwrap();
    ledger.buy_product(alice.id, "cup").await.unwrap();

    let info = ledger.user_info(alice.id).await.unwrap();

    assert_eq!(info.coins, 1000 - 30 + 5 - 20 - 10 - 20);
    assert_eq!(
        info.inventory,
        vec![
            InventoryItem {
                title: "cup".to_string(),
                quantity: 2
            },
            InventoryItem {
                title: "pen".to_string(),
                quantity: 1
            },
        ]
    );
    assert_eq!(info.coin_history.received.len(), 1);
    assert_eq!(info.coin_history.received[0].from_user, "bob");
    assert_eq!(info.coin_history.received[0].amount, 5);
    assert_eq!(info.coin_history.sent.len(), 1);
    assert_eq!(info.coin_history.sent[0].to_user, "bob");
    assert_eq!(info.coin_history.sent[0].amount, 30);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["coins"], 925);
    assert_eq!(json["inventory"][0]["type"], "cup");
    assert_eq!(json["coinHistory"]["received"][0]["fromUser"], "bob");
    assert_eq!(json["coinHistory"]["sent"][0]["toUser"], "bob");
}

#[tokio::test]
async fn test_user_info_unknown_user() {
    let (_store, ledger) = ledger();
    let err = ledger.user_info(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_composed_operations_commit_together() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 0).await;

    let (alice_id, bob_id) = (alice.id, bob.id);
    let composed = ledger.clone();
    let order = ledger
        .coordinator()
        .run(None, &TxOptions::money_moving(), move |tx| {
            let ledger = composed.clone();
            Box::pin(async move {
                ledger
                    .send_coins_in(Some(&mut *tx), alice_id, bob_id, 30)
                    .await?;
                ledger.buy_product_in(Some(&mut *tx), bob_id, "cup").await
            })
        })
        .await
        .unwrap();

    assert_eq!(order.user_id, bob.id);
    assert_eq!(store.committed_balance(alice.id), Some(70));
    assert_eq!(store.committed_balance(bob.id), Some(10));
    assert_eq!(store.transfer_count(), 1);
    assert_eq!(store.order_count(), 1);
}

#[tokio::test]
async fn test_composed_failure_rolls_back_everything() {
    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 0).await;

    let (alice_id, bob_id) = (alice.id, bob.id);
    let composed = ledger.clone();
    let err = ledger
        .coordinator()
        .run(None, &TxOptions::money_moving(), move |tx| {
            let ledger = composed.clone();
            Box::pin(async move {
                ledger
                    .send_coins_in(Some(&mut *tx), alice_id, bob_id, 30)
                    .await?;
                // 30 coins cannot pay for a powerbank
                ledger
                    .buy_product_in(Some(&mut *tx), bob_id, "powerbank")
                    .await
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(store.committed_balance(alice.id), Some(100));
    assert_eq!(store.committed_balance(bob.id), Some(0));
    assert_eq!(store.transfer_count(), 0);
    assert_eq!(store.order_count(), 0);
    assert!(ledger.transfers_to(bob.id).await.unwrap().is_empty());
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_ledger_from_config_applies_ledger_settings() {
    let config = LedgerConfig::from_lookup(|name| {
        let value = match name {
            "DATABASE_URL" => "postgres://localhost/merch",
            "LEDGER_MAX_RETRIES" => "2",
            "LEDGER_ATTEMPT_TIMEOUT_MS" => "20",
            "LEDGER_STARTING_BALANCE" => "7",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap();

    let store = MemoryStore::new();
    let ledger = Ledger::from_config(store.clone(), &config);

    let alice = ledger.create_user("alice", "hash").await.unwrap();
    let bob = ledger.create_user("bob", "hash").await.unwrap();
    assert_eq!(alice.balance, 7);
    assert_eq!(store.committed_balance(bob.id), Some(7));

    // Retry budget: one attempt plus LEDGER_MAX_RETRIES
    store.inject_conflicts(100);
    let err = ledger.send_coins(alice.id, bob.id, 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { attempts: 3 }));
    store.inject_conflicts(0);

    // Attempt timeout: every attempt waits on a lock held elsewhere
    let mut holder = store.begin(IsolationLevel::Serializable).await.unwrap();
    holder.read_for_update(alice.id).await.unwrap();

    let err = ledger.send_coins(alice.id, bob.id, 1).await.unwrap_err();
    assert!(matches!(err, LedgerError::TimedOut { attempts: 3 }));

    holder.rollback().await.unwrap();
    ledger.send_coins(alice.id, bob.id, 1).await.unwrap();
    assert_eq!(store.committed_balance(alice.id), Some(6));
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_scoped_send_is_not_logged_as_sent() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (store, ledger) = ledger();
    let alice = user_with(&ledger, "alice", 100).await;
    let bob = user_with(&ledger, "bob", 0).await;

    let mut tx = store.begin(IsolationLevel::Serializable).await.unwrap();
    ledger
        .send_coins_in(Some(&mut tx), alice.id, bob.id, 10)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(logs.contents().contains("Coins staged in caller transaction"));
    assert!(!logs.contents().contains("Coins sent"));

    ledger.send_coins(alice.id, bob.id, 10).await.unwrap();
    assert!(logs.contents().contains("Coins sent"));
}
