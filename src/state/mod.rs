pub mod diff;
pub mod poller;

use crate::chain::{ChainAdapter, ChainRouter};
use crate::config::TrackerConfig;
use crate::model::{wallet_key, Transaction, WalletActivity, WalletConfig};
use crate::state::diff::{diff_activity, ActivityEvent};
use crate::state::poller::PollerHandle;
use anyhow::{anyhow, Context};
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use tracing::{debug, error, info, instrument, Instrument};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Registry entry and last snapshot live together so that removing a wallet
/// drops both at once.
#[derive(Debug, Clone)]
struct TrackedWallet {
    config: WalletConfig,
    activity: Option<WalletActivity>,
}

pub struct WalletTracker<A: ChainAdapter = ChainRouter> {
    config: TrackerConfig,
    adapter: A,
    wallets: DashMap<String, TrackedWallet>, // key = chain:address
    poller: Mutex<Option<PollerHandle>>,
}

impl WalletTracker<ChainRouter> {
    pub fn new(config: TrackerConfig) -> anyhow::Result<Self> {
        let adapter = ChainRouter::new(&config)?;
        Ok(Self::with_adapter(config, adapter))
    }
}

impl<A: ChainAdapter> WalletTracker<A> {
    pub fn with_adapter(config: TrackerConfig, adapter: A) -> Self {
        Self {
            config,
            adapter,
            wallets: DashMap::new(),
            poller: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Registers `wallet`, replacing any wallet with the same key. The
    /// previous snapshot is kept until the next update.
    pub fn add_wallet(&self, wallet: WalletConfig) {
        let key = wallet.key();
        info!(key = %key, label = ?wallet.label, "Tracking wallet");

        self.wallets.entry(key)
            .and_modify(|tracked| tracked.config = wallet.clone())
            .or_insert(TrackedWallet { config: wallet, activity: None });
    }

    pub fn remove_wallet(&self, chain: &str, address: &str) -> bool {
        let key = wallet_key(chain, address);
        let removed = self.wallets.remove(&key).is_some();
        if removed {
            info!(key = %key, "Stopped tracking wallet");
        }
        removed
    }

    pub fn get_wallets(&self) -> Vec<WalletConfig> {
        self.wallets.iter()
            .map(|entry| entry.config.clone())
            .collect()
    }

    pub fn get_activity(&self, chain: &str, address: &str) -> Option<WalletActivity> {
        self.wallets.get(&wallet_key(chain, address))
            .and_then(|entry| entry.activity.clone())
    }

    /// Most recent `limit` transactions of the stored snapshot.
    pub fn get_transaction_history(&self, chain: &str, address: &str, limit: usize) -> Vec<Transaction> {
        self.wallets.get(&wallet_key(chain, address))
            .and_then(|entry| entry.activity.as_ref()
                .map(|activity| activity.transactions.iter().take(limit).cloned().collect()))
            .unwrap_or_default()
    }

    /// Runs one poll cycle over every registered wallet, one wallet at a
    /// time. A failing wallet, or a callback that panics, is reported and
    /// skipped.
    #[instrument(skip(self), fields(wallets = self.wallets.len()))]
    pub async fn update(&self) {
        let wallets = self.get_wallets();
        debug!("Starting poll cycle");

        for wallet in wallets {
            let span = tracing::info_span!("update_wallet", chain = %wallet.chain, address = %wallet.address);

            async {
                let outcome = AssertUnwindSafe(async {
                    let events = self.update_wallet(&wallet).await?;
                    self.dispatch(&events, &wallet);
                    anyhow::Ok(())
                })
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(anyhow!("wallet update panicked: {}", panic_message(&*payload))));

                if let Err(e) = outcome {
                    self.report(&e, &wallet);
                }
            }.instrument(span).await;
        }
    }

    fn report(&self, e: &anyhow::Error, wallet: &WalletConfig) {
        error!(error = %format!("{:#}", e), "Failed to update wallet");

        if let Some(on_error) = &self.config.on_error {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_error(e, wallet))) {
                error!(panic = %panic_message(&*payload), "Error callback panicked");
            }
        }
    }

    async fn update_wallet(&self, wallet: &WalletConfig) -> anyhow::Result<Vec<ActivityEvent>> {
        let transactions = self.adapter.fetch_transactions(wallet).await
            .context("failed to fetch transactions")?;
        let balance = self.adapter.fetch_balance(wallet).await
            .context("failed to fetch balance")?;

        let activity = WalletActivity {
            wallet: wallet.clone(),
            transactions,
            balance,
            last_updated: Utc::now(),
        };

        let Some(mut tracked) = self.wallets.get_mut(&wallet.key()) else {
            debug!("Wallet was removed while fetching, dropping snapshot");
            return Ok(Vec::new());
        };

        let events = diff_activity(tracked.activity.as_ref(), &activity);
        debug!(
            transactions = activity.transactions.len(),
            events = events.len(),
            "Stored wallet snapshot"
        );
        tracked.activity = Some(activity);

        Ok(events)
    }

    fn dispatch(&self, events: &[ActivityEvent], wallet: &WalletConfig) {
        for event in events {
            match event {
                ActivityEvent::NewTransaction(tx) => {
                    info!(hash = %tx.hash, tx_type = %tx.tx_type, status = %tx.status, "New transaction");
                    if let Some(on_transaction) = &self.config.on_transaction {
                        on_transaction(tx, wallet);
                    }
                }
                ActivityEvent::BalanceChanged(balance) => {
                    info!(native = %balance.native, tokens = balance.tokens.len(), "Balance changed");
                    if let Some(on_balance_change) = &self.config.on_balance_change {
                        on_balance_change(balance, wallet);
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload.downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
