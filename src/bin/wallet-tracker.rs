use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wallet_tracker::config::SOLANA_CHAIN;
use wallet_tracker::util::{explorer_tx_url, format_balance, shorten_address};
use wallet_tracker::{TrackerConfig, WalletConfig, WalletTracker};

/// `chain:address[:label]`, comma separated.
fn parse_wallets(list: &str) -> anyhow::Result<Vec<WalletConfig>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<WalletConfig> {
            let mut parts = entry.splitn(3, ':');
            let chain = parts.next().unwrap_or_default();
            let address = parts.next()
                .filter(|a| !a.is_empty())
                .with_context(|| format!("wallet entry {:?} has no address", entry))?;

            let wallet = WalletConfig::new(chain, address);
            Ok(match parts.next() {
                Some(label) if !label.is_empty() => wallet.with_label(label),
                _ => wallet,
            })
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = TrackerConfig::from_env()?
        .on_transaction(|tx, wallet| {
            let link = explorer_tx_url(&wallet.chain, &tx.hash).unwrap_or_default();
            match serde_json::to_string(tx) {
                Ok(json) => info!(
                    wallet = %shorten_address(&wallet.address, 4),
                    link = %link,
                    tx = %json,
                    "New transaction"
                ),
                Err(e) => error!(error = %e, "Failed to serialize transaction"),
            }
        })
        .on_balance_change(|balance, wallet| {
            let decimals = if wallet.chain == SOLANA_CHAIN { 9 } else { 18 };
            let native = format_balance(&balance.native, decimals)
                .unwrap_or_else(|_| balance.native.clone());
            info!(
                wallet = %shorten_address(&wallet.address, 4),
                native = %native,
                tokens = balance.tokens.len(),
                "Balance changed"
            );
        })
        .on_error(|e, wallet| {
            warn!(chain = %wallet.chain, address = %wallet.address, error = %e, "Wallet update failed");
        });

    let wallets = parse_wallets(&std::env::var("WATCH_WALLETS").unwrap_or_default())?;
    if wallets.is_empty() {
        warn!("WATCH_WALLETS is empty, nothing to track");
    }

    let tracker = Arc::new(WalletTracker::new(config)?);
    for wallet in wallets {
        tracker.add_wallet(wallet);
    }

    tracker.start().await;
    info!(interval = ?tracker.config().poll_interval, "Wallet tracker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");
    tracker.stop();

    Ok(())
}
