//! # User Info Aggregation
//!
//! Builds the "what do I own and who paid me" summary from ledger reads.
//!
//! ```text
//! orders_for(user)      ──► inventory    [{type: "cup", quantity: 2}, ...]
//! transfers_to(user)    ──► received     [{fromUser: "bob", amount: 10}, ...]
//! transfers_from(user)  ──► sent         [{toUser: "carol", amount: 5}, ...]
//! user.balance          ──► coins
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{OrderLine, TransferEntry, User};

/// Number of units of one product a user owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "type")]
    pub title: String,
    pub quantity: u32,
}

/// One incoming payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedCoins {
    pub from_user: String,
    pub amount: i64,
}

/// One outgoing payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentCoins {
    pub to_user: String,
    pub amount: i64,
}

/// Incoming and outgoing payments of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinHistory {
    pub received: Vec<ReceivedCoins>,
    pub sent: Vec<SentCoins>,
}

/// Balance, inventory and payment history of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub coins: i64,
    pub inventory: Vec<InventoryItem>,
    pub coin_history: CoinHistory,
}

impl UserInfo {
    /// Assembles the summary.
    ///
    /// `received` must come from `transfers_to(user)` and `sent` from
    /// `transfers_from(user)`, so `counterpart` is the other party.
    pub fn assemble(
        user: &User,
        orders: &[OrderLine],
        received: &[TransferEntry],
        sent: &[TransferEntry],
    ) -> Self {
        UserInfo {
            coins: user.balance,
            inventory: summarize_inventory(orders),
            coin_history: CoinHistory {
                received: received
                    .iter()
                    .map(|t| ReceivedCoins {
                        from_user: t.counterpart.clone(),
                        amount: t.amount,
                    })
                    .collect(),
                sent: sent
                    .iter()
                    .map(|t| SentCoins {
                        to_user: t.counterpart.clone(),
                        amount: t.amount,
                    })
                    .collect(),
            },
        }
    }
}

/// Counts orders per product title, sorted by title.
pub fn summarize_inventory(orders: &[OrderLine]) -> Vec<InventoryItem> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for order in orders {
        *counts.entry(order.product_title.as_str()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(title, quantity)| InventoryItem {
            title: title.to_string(),
            quantity,
        })
        .collect()
}
