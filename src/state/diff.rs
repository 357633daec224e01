use crate::model::{Transaction, WalletActivity, WalletBalance};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum ActivityEvent {
    NewTransaction(Transaction),
    BalanceChanged(WalletBalance),
}

/// Changes between two snapshots of the same wallet: one event per
/// transaction hash not seen before (in `current` order), then one event if
/// the native balance string differs. A wallet seen for the first time
/// produces nothing.
pub fn diff_activity(previous: Option<&WalletActivity>, current: &WalletActivity) -> Vec<ActivityEvent> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let known: HashSet<&str> = previous.transactions.iter()
        .map(|tx| tx.hash.as_str())
        .collect();

    let mut events: Vec<ActivityEvent> = current.transactions.iter()
        .filter(|tx| !known.contains(tx.hash.as_str()))
        .cloned()
        .map(ActivityEvent::NewTransaction)
        .collect();

    if previous.balance.native != current.balance.native {
        events.push(ActivityEvent::BalanceChanged(current.balance.clone()));
    }

    events
}
