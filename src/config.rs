use crate::model::{Transaction, WalletBalance, WalletConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

/// Chain name routed to the Solana adapter. Every other name goes to the
/// EVM adapter.
pub const SOLANA_CHAIN: &str = "solana";

/// (chain, env var holding its explorer api key)
const API_KEY_VARS: [(&str, &str); 6] = [
    ("ethereum", "ETHERSCAN_API_KEY"),
    ("polygon", "POLYGONSCAN_API_KEY"),
    ("bsc", "BSCSCAN_API_KEY"),
    ("arbitrum", "ARBISCAN_API_KEY"),
    ("optimism", "OPTIMISM_API_KEY"),
    ("base", "BASESCAN_API_KEY"),
];

/// Etherscan-compatible explorer for one EVM chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub api_url: String,
    pub explorer_url: String,
    pub api_key: Option<String>,
}

impl ExplorerConfig {
    pub fn new(api_url: &str, explorer_url: &str) -> Self {
        Self {
            api_url: api_url.to_owned(),
            explorer_url: explorer_url.to_owned(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaEndpoints {
    pub rpc_url: String,
    pub indexer_url: String,
    pub explorer_url: String,
}

impl Default for SolanaEndpoints {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_owned(),
            indexer_url: "https://public-api.solscan.io".to_owned(),
            explorer_url: "https://solscan.io".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoints {
    pub evm: HashMap<String, ExplorerConfig>,
    pub solana: SolanaEndpoints,
}

impl Default for ChainEndpoints {
    fn default() -> Self {
        let evm = [
            ("ethereum", ExplorerConfig::new("https://api.etherscan.io/api", "https://etherscan.io")),
            ("polygon", ExplorerConfig::new("https://api.polygonscan.com/api", "https://polygonscan.com")),
            ("bsc", ExplorerConfig::new("https://api.bscscan.com/api", "https://bscscan.com")),
            ("arbitrum", ExplorerConfig::new("https://api.arbiscan.io/api", "https://arbiscan.io")),
            ("optimism", ExplorerConfig::new("https://api-optimistic.etherscan.io/api",
                                             "https://optimistic.etherscan.io")),
            ("base", ExplorerConfig::new("https://api.basescan.org/api", "https://basescan.org")),
        ]
            .into_iter()
            .map(|(chain, explorer)| (chain.to_owned(), explorer))
            .collect();

        Self {
            evm,
            solana: SolanaEndpoints::default(),
        }
    }
}

impl ChainEndpoints {
    /// Web page of a transaction on the chain's block explorer, if the chain
    /// is known.
    pub fn tx_url(&self, chain: &str, hash: &str) -> Option<String> {
        let base = if chain == SOLANA_CHAIN {
            &self.solana.explorer_url
        } else {
            &self.evm.get(chain)?.explorer_url
        };

        Some(format!("{}/tx/{}", base.trim_end_matches('/'), hash))
    }
}

pub type TransactionCallback = Arc<dyn Fn(&Transaction, &WalletConfig) + Send + Sync>;
pub type BalanceCallback = Arc<dyn Fn(&WalletBalance, &WalletConfig) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&anyhow::Error, &WalletConfig) + Send + Sync>;

#[derive(Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Applied to every outbound request. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    pub endpoints: ChainEndpoints,
    pub on_transaction: Option<TransactionCallback>,
    pub on_balance_change: Option<BalanceCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: None,
            endpoints: ChainEndpoints::default(),
            on_transaction: None,
            on_balance_change: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("endpoints", &self.endpoints)
            .field("on_transaction", &self.on_transaction.is_some())
            .field("on_balance_change", &self.on_balance_change.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl TrackerConfig {
    /// Reads settings from the environment, loading `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Some(ms) = env_number("POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_number("REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        for (chain, var) in API_KEY_VARS {
            if let Some(key) = env_string(var) {
                config = config.with_api_key(chain, key);
            }
        }

        if let Some(url) = env_string("SOLANA_RPC_URL") {
            config.endpoints.solana.rpc_url = url;
        }
        if let Some(url) = env_string("SOLSCAN_API_URL") {
            config.endpoints.solana.indexer_url = url;
        }

        debug!(?config, "Loaded tracker config");

        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_endpoints(mut self, endpoints: ChainEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sets the explorer api key for `chain`. Ignored for chains without an
    /// explorer entry.
    pub fn with_api_key(mut self, chain: &str, key: impl Into<String>) -> Self {
        if let Some(explorer) = self.endpoints.evm.get_mut(chain) {
            explorer.api_key = Some(key.into());
        }
        self
    }

    pub fn on_transaction<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Transaction, &WalletConfig) + Send + Sync + 'static,
    {
        self.on_transaction = Some(Arc::new(callback));
        self
    }

    pub fn on_balance_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WalletBalance, &WalletConfig) + Send + Sync + 'static,
    {
        self.on_balance_change = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&anyhow::Error, &WalletConfig) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_number(name: &str) -> anyhow::Result<Option<u64>> {
    env_string(name)
        .map(|v| v.parse::<u64>().with_context(|| format!("{} must be a number, got {:?}", name, v)))
        .transpose()
}
