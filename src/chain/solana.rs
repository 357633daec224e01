use crate::chain::{degrade, endpoint_url, non_empty, parse_records, read_json, ChainAdapter, PAGE_SIZE};
use crate::config::SolanaEndpoints;
use crate::error::{FetchError, ParseError};
use crate::model::{TokenBalance, TokenInfo, Transaction, TxStatus, TxType, WalletBalance, WalletConfig};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const DEFAULT_SPL_DECIMALS: u8 = 9;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSolscanTx {
    tx_hash: Option<String>,
    block_time: Option<i64>,
    slot: Option<u64>,
    fee: Option<u64>,
    status: Option<String>,
    lamport: Option<i64>,
    signer: Vec<String>,
}

impl TryFrom<RawSolscanTx> for Transaction {
    type Error = ParseError;

    fn try_from(raw: RawSolscanTx) -> Result<Self, Self::Error> {
        let hash = non_empty(raw.tx_hash).ok_or(ParseError::MissingField("txHash"))?;
        let block_time = raw.block_time.ok_or(ParseError::MissingField("blockTime"))?;
        let timestamp = DateTime::from_timestamp(block_time, 0)
            .ok_or_else(|| ParseError::InvalidNumber { field: "blockTime", value: block_time.to_string() })?;

        let status = match raw.status.as_deref() {
            Some("Success") => TxStatus::Confirmed,
            _ => TxStatus::Failed,
        };

        Ok(Transaction {
            hash,
            from: raw.signer.into_iter().next().unwrap_or_default(),
            to: String::new(),
            value: raw.lamport.unwrap_or(0).to_string(),
            value_usd: None,
            token: None,
            timestamp,
            // signatures carry no direction without instruction decoding
            tx_type: TxType::Contract,
            status,
            gas_used: raw.fee.map(|f| f.to_string()),
            gas_price: None,
            block_number: raw.slot,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTokenAmount {
    amount: Option<String>,
    decimals: Option<u8>,
    ui_amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTokenAccount {
    token_address: Option<String>,
    token_amount: RawTokenAmount,
    token_name: Option<String>,
    token_symbol: Option<String>,
}

impl RawTokenAccount {
    fn into_balance(self) -> Option<TokenBalance> {
        if self.token_amount.ui_amount.unwrap_or(0.0) <= 0.0 {
            return None;
        }

        let Some(address) = non_empty(self.token_address) else {
            warn!(symbol = ?self.token_symbol, "Skipping token account without mint address");
            return None;
        };

        Some(TokenBalance {
            token: TokenInfo {
                address,
                symbol: self.token_symbol.unwrap_or_default(),
                name: non_empty(self.token_name),
                decimals: self.token_amount.decimals.unwrap_or(DEFAULT_SPL_DECIMALS),
            },
            balance: non_empty(self.token_amount.amount).unwrap_or_else(|| "0".to_owned()),
            balance_usd: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBalance {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<T, FetchError> {
        match (self.result, self.error) {
            (_, Some(e)) => Err(FetchError::Rpc { code: e.code, message: e.message }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(FetchError::Upstream("rpc response without result".to_owned())),
        }
    }
}

#[derive(Clone)]
pub struct SolanaAdapter {
    client: Client,
    endpoints: Arc<SolanaEndpoints>,
}

impl SolanaAdapter {
    pub fn new(client: Client, endpoints: SolanaEndpoints) -> Self {
        Self {
            client,
            endpoints: Arc::new(endpoints),
        }
    }

    async fn indexer_get(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<Value>, FetchError> {
        let url = endpoint_url(&self.endpoints.indexer_url, path, params)?;
        let response = self.client.get(url).send().await?;

        match read_json::<Value>(response).await? {
            Value::Array(records) => Ok(records),
            Value::Object(mut body) => match body.remove("data") {
                Some(Value::Array(records)) => Ok(records),
                _ => Err(FetchError::Upstream(format!("unexpected indexer response from {}", path))),
            },
            _ => Err(FetchError::Upstream(format!("unexpected indexer response from {}", path))),
        }
    }

    async fn lamports(&self, wallet: &WalletConfig) -> Result<String, FetchError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [wallet.address]
        });

        let url = endpoint_url(&self.endpoints.rpc_url, "", &[])?;
        let response = self.client.post(url).json(&payload).send().await?;
        let balance = read_json::<RpcResponse<RpcBalance>>(response).await?.into_result()?;

        Ok(balance.value.to_string())
    }

    async fn token_accounts(&self, wallet: &WalletConfig) -> Result<Vec<TokenBalance>, FetchError> {
        let records = self.indexer_get("/account/tokens", &[("account", wallet.address.as_str())]).await?;

        Ok(parse_records::<RawTokenAccount>(records)
            .into_iter()
            .filter_map(RawTokenAccount::into_balance)
            .collect())
    }
}

impl ChainAdapter for SolanaAdapter {
    #[instrument(skip_all, fields(chain = %wallet.chain, address = %wallet.address))]
    async fn fetch_transactions(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>, FetchError> {
        let limit = PAGE_SIZE.to_string();
        let records = self.indexer_get("/account/transactions", &[
            ("account", wallet.address.as_str()),
            ("limit", limit.as_str()),
        ]).await;
        let records = degrade(records, Vec::new, "solana transactions", wallet)?;

        let transactions: Vec<Transaction> = parse_records::<RawSolscanTx>(records)
            .into_iter()
            .filter_map(|raw| match Transaction::try_from(raw) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed indexer record");
                    None
                }
            })
            .collect();

        debug!(count = transactions.len(), "Fetched solana transactions");

        Ok(transactions)
    }

    #[instrument(skip_all, fields(chain = %wallet.chain, address = %wallet.address))]
    async fn fetch_balance(&self, wallet: &WalletConfig) -> Result<WalletBalance, FetchError> {
        let (native, tokens) = tokio::join!(
            self.lamports(wallet),
            self.token_accounts(wallet),
        );

        Ok(WalletBalance {
            native: degrade(native, || "0".to_owned(), "lamport balance", wallet)?,
            native_usd: None,
            tokens: degrade(tokens, Vec::new, "token accounts", wallet)?,
            total_usd: None,
        })
    }
}
