use crate::chain::evm::EvmAdapter;
use crate::chain::solana::SolanaAdapter;
use crate::config::{TrackerConfig, SOLANA_CHAIN};
use crate::error::FetchError;
use crate::model::{Transaction, WalletBalance, WalletConfig};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;
use url::Url;

pub mod evm;
pub mod solana;

/// Page size requested from every transaction source.
pub const PAGE_SIZE: usize = 50;

pub trait ChainAdapter: Sync + Send {
    fn fetch_transactions(&self, wallet: &WalletConfig)
        -> impl Future<Output = Result<Vec<Transaction>, FetchError>> + Send;
    fn fetch_balance(&self, wallet: &WalletConfig)
        -> impl Future<Output = Result<WalletBalance, FetchError>> + Send;
}

/// Routes `solana` wallets to the Solana adapter and every other chain to the
/// EVM adapter, which returns empty results for chains it has no explorer for.
#[derive(Clone)]
pub struct ChainRouter {
    evm: EvmAdapter,
    solana: SolanaAdapter,
}

impl ChainRouter {
    pub fn new(config: &TrackerConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            evm: EvmAdapter::new(client.clone(), config.endpoints.evm.clone()),
            solana: SolanaAdapter::new(client, config.endpoints.solana.clone()),
        })
    }
}

impl ChainAdapter for ChainRouter {
    async fn fetch_transactions(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>, FetchError> {
        if wallet.chain == SOLANA_CHAIN {
            self.solana.fetch_transactions(wallet).await
        } else {
            self.evm.fetch_transactions(wallet).await
        }
    }

    async fn fetch_balance(&self, wallet: &WalletConfig) -> Result<WalletBalance, FetchError> {
        if wallet.chain == SOLANA_CHAIN {
            self.solana.fetch_balance(wallet).await
        } else {
            self.evm.fetch_balance(wallet).await
        }
    }
}

/// Turns a failed upstream call into `fallback`, logging the failure.
/// Misconfiguration is passed through so it reaches the per-wallet error path.
pub(crate) fn degrade<T>(
    result: Result<T, FetchError>,
    fallback: impl FnOnce() -> T,
    what: &str,
    wallet: &WalletConfig,
) -> Result<T, FetchError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_misconfiguration() => Err(e),
        Err(e) => {
            warn!(
                chain = %wallet.chain,
                address = %wallet.address,
                error = %e,
                "Failed to fetch {}, using empty result", what
            );
            Ok(fallback())
        }
    }
}

/// Builds a request url from a configured base and query parameters.
pub(crate) fn endpoint_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    if params.is_empty() {
        return Ok(Url::parse(&joined)?);
    }
    Ok(Url::parse_with_params(&joined, params)?)
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FetchError> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status(status));
    }

    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Records that do not even have the expected shape are dropped here; field
/// level validation happens afterwards.
pub(crate) fn parse_records<T: DeserializeOwned>(records: Vec<Value>) -> Vec<T> {
    records.into_iter()
        .filter_map(|record| match serde_json::from_value::<T>(record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(error = %e, "Skipping record with unexpected shape");
                None
            }
        })
        .collect()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_decimals(value: Option<&str>, default: u8) -> u8 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
