use crate::chain::{degrade, endpoint_url, non_empty, parse_decimals, parse_records, read_json, ChainAdapter, PAGE_SIZE};
use crate::config::ExplorerConfig;
use crate::error::{FetchError, ParseError};
use crate::model::{TokenBalance, TokenInfo, Transaction, TxStatus, TxType, WalletBalance, WalletConfig};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Etherscan-style `{status, message, result}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    /// An empty list comes back as `status: "0"`, so any array is accepted.
    fn into_records(self) -> Result<Vec<Value>, FetchError> {
        match self.result {
            Value::Array(records) => Ok(records),
            Value::String(reason) => Err(FetchError::Upstream(reason)),
            _ => Err(FetchError::Upstream(self.message)),
        }
    }

    fn into_scalar(self) -> Result<String, FetchError> {
        match self.result {
            Value::String(value) if self.status == "1" => Ok(value),
            Value::String(reason) => Err(FetchError::Upstream(reason)),
            _ => Err(FetchError::Upstream(self.message)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxList {
    Native,
    Token,
}

impl TxList {
    fn action(self) -> &'static str {
        match self {
            TxList::Native => "txlist",
            TxList::Token => "tokentx",
        }
    }
}

/// One record of `txlist` or `tokentx`. Explorers send every field as a
/// string, and omit some of them depending on the action.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawExplorerTx {
    hash: Option<String>,
    from: Option<String>,
    to: Option<String>,
    value: Option<String>,
    time_stamp: Option<String>,
    block_number: Option<String>,
    is_error: Option<String>,
    gas_used: Option<String>,
    gas_price: Option<String>,
    contract_address: Option<String>,
    token_name: Option<String>,
    token_symbol: Option<String>,
    token_decimal: Option<String>,
}

/// Validated explorer record, not yet classified against a wallet.
#[derive(Debug, Clone, PartialEq)]
struct ExplorerTx {
    hash: String,
    from: String,
    to: String,
    value: String,
    timestamp: DateTime<Utc>,
    block_number: Option<u64>,
    failed: bool,
    gas_used: Option<String>,
    gas_price: Option<String>,
    token: Option<TokenInfo>,
}

impl ExplorerTx {
    fn parse(raw: RawExplorerTx, list: TxList) -> Result<Self, ParseError> {
        let hash = non_empty(raw.hash).ok_or(ParseError::MissingField("hash"))?;
        let seconds = non_empty(raw.time_stamp).ok_or(ParseError::MissingField("timeStamp"))?;
        let timestamp = seconds.parse::<i64>().ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| ParseError::InvalidNumber { field: "timeStamp", value: seconds.clone() })?;

        let block_number = match non_empty(raw.block_number) {
            Some(n) => Some(n.parse::<u64>()
                .map_err(|_| ParseError::InvalidNumber { field: "blockNumber", value: n.clone() })?),
            None => None,
        };

        let token = match list {
            TxList::Native => None,
            TxList::Token => Some(TokenInfo {
                address: raw.contract_address.unwrap_or_default(),
                symbol: raw.token_symbol.unwrap_or_default(),
                name: non_empty(raw.token_name),
                decimals: parse_decimals(raw.token_decimal.as_deref(), DEFAULT_TOKEN_DECIMALS),
            }),
        };

        Ok(Self {
            hash,
            from: raw.from.unwrap_or_default(),
            to: raw.to.unwrap_or_default(),
            value: non_empty(raw.value).unwrap_or_else(|| "0".to_owned()),
            timestamp,
            block_number,
            // the explorer only reports successful token transfers
            failed: list == TxList::Native && raw.is_error.as_deref() == Some("1"),
            gas_used: non_empty(raw.gas_used),
            gas_price: non_empty(raw.gas_price),
            token,
        })
    }

    fn into_transaction(self, wallet_address: &str) -> Transaction {
        let tx_type = classify(&self.from, &self.to, wallet_address);

        Transaction {
            hash: self.hash,
            from: self.from,
            to: self.to,
            value: self.value,
            value_usd: None,
            token: self.token,
            timestamp: self.timestamp,
            tx_type,
            status: if self.failed { TxStatus::Failed } else { TxStatus::Confirmed },
            gas_used: self.gas_used,
            gas_price: self.gas_price,
            block_number: self.block_number,
        }
    }
}

/// Direction of a transfer relative to the tracked wallet.
pub fn classify(from: &str, to: &str, wallet_address: &str) -> TxType {
    let is_sender = from.eq_ignore_ascii_case(wallet_address);
    let is_recipient = to.eq_ignore_ascii_case(wallet_address);

    if to.is_empty() || (is_sender && is_recipient) {
        TxType::Contract
    } else if is_sender {
        TxType::Out
    } else if is_recipient {
        TxType::In
    } else {
        TxType::Contract
    }
}

/// Concatenates both lists, newest first. When a hash shows up in both, the
/// native record wins.
pub fn merge_transactions(native: Vec<Transaction>, token: Vec<Transaction>) -> Vec<Transaction> {
    let mut merged: Vec<Transaction> = native.into_iter().chain(token).collect();
    // stable: for equal timestamps native records stay ahead of token records
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut seen = HashSet::new();
    merged.retain(|tx| seen.insert(tx.hash.clone()));
    merged
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTokenHolding {
    balance: Option<String>,
    contract_address: Option<String>,
    decimals: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

impl RawTokenHolding {
    fn into_balance(self) -> Option<TokenBalance> {
        let balance = non_empty(self.balance)?;
        if is_zero(&balance) {
            return None;
        }

        Some(TokenBalance {
            token: TokenInfo {
                address: non_empty(self.contract_address)?,
                symbol: self.symbol.unwrap_or_default(),
                name: non_empty(self.name),
                decimals: parse_decimals(self.decimals.as_deref(), DEFAULT_TOKEN_DECIMALS),
            },
            balance,
            balance_usd: None,
        })
    }
}

#[derive(Clone)]
pub struct EvmAdapter {
    client: Client,
    explorers: Arc<HashMap<String, ExplorerConfig>>,
}

impl EvmAdapter {
    pub fn new(client: Client, explorers: HashMap<String, ExplorerConfig>) -> Self {
        Self {
            client,
            explorers: Arc::new(explorers),
        }
    }

    async fn call(&self, explorer: &ExplorerConfig, params: &[(&str, &str)]) -> Result<Envelope, FetchError> {
        let mut params = params.to_vec();
        if let Some(key) = explorer.api_key.as_deref() {
            params.push(("apikey", key));
        }

        let url = endpoint_url(&explorer.api_url, "", &params)?;
        let response = self.client.get(url).send().await?;
        read_json(response).await
    }

    #[instrument(level = "debug", skip(self, explorer, wallet), fields(action = list.action()))]
    async fn tx_list(
        &self,
        explorer: &ExplorerConfig,
        wallet: &WalletConfig,
        list: TxList,
    ) -> Result<Vec<Transaction>, FetchError> {
        let offset = PAGE_SIZE.to_string();
        let envelope = self.call(explorer, &[
            ("module", "account"),
            ("action", list.action()),
            ("address", wallet.address.as_str()),
            ("startblock", "0"),
            ("endblock", "99999999"),
            ("page", "1"),
            ("offset", offset.as_str()),
            ("sort", "desc"),
        ]).await?;

        let transactions: Vec<Transaction> = parse_records::<RawExplorerTx>(envelope.into_records()?)
            .into_iter()
            .filter_map(|raw| match ExplorerTx::parse(raw, list) {
                Ok(tx) => Some(tx.into_transaction(&wallet.address)),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed explorer record");
                    None
                }
            })
            .collect();

        debug!(count = transactions.len(), "Fetched explorer transactions");

        Ok(transactions)
    }

    async fn native_balance(&self, explorer: &ExplorerConfig, wallet: &WalletConfig) -> Result<String, FetchError> {
        self.call(explorer, &[
            ("module", "account"),
            ("action", "balance"),
            ("address", wallet.address.as_str()),
            ("tag", "latest"),
        ]).await?.into_scalar()
    }

    async fn token_balances(&self, explorer: &ExplorerConfig, wallet: &WalletConfig)
        -> Result<Vec<TokenBalance>, FetchError>
    {
        let envelope = self.call(explorer, &[
            ("module", "account"),
            ("action", "tokenlist"),
            ("address", wallet.address.as_str()),
        ]).await?;

        Ok(parse_records::<RawTokenHolding>(envelope.into_records()?)
            .into_iter()
            .filter_map(RawTokenHolding::into_balance)
            .collect())
    }
}

impl ChainAdapter for EvmAdapter {
    #[instrument(skip_all, fields(chain = %wallet.chain, address = %wallet.address))]
    async fn fetch_transactions(&self, wallet: &WalletConfig) -> Result<Vec<Transaction>, FetchError> {
        let Some(explorer) = self.explorers.get(&wallet.chain) else {
            debug!("No explorer configured for chain, skipping");
            return Ok(Vec::new());
        };

        let (native, token) = tokio::join!(
            self.tx_list(explorer, wallet, TxList::Native),
            self.tx_list(explorer, wallet, TxList::Token),
        );

        let native = degrade(native, Vec::new, "native transactions", wallet)?;
        let token = degrade(token, Vec::new, "token transfers", wallet)?;

        Ok(merge_transactions(native, token))
    }

    #[instrument(skip_all, fields(chain = %wallet.chain, address = %wallet.address))]
    async fn fetch_balance(&self, wallet: &WalletConfig) -> Result<WalletBalance, FetchError> {
        let Some(explorer) = self.explorers.get(&wallet.chain) else {
            debug!("No explorer configured for chain, skipping");
            return Ok(WalletBalance::zero());
        };

        let (native, tokens) = tokio::join!(
            self.native_balance(explorer, wallet),
            self.token_balances(explorer, wallet),
        );

        Ok(WalletBalance {
            native: degrade(native, || "0".to_owned(), "native balance", wallet)?,
            native_usd: None,
            tokens: degrade(tokens, Vec::new, "token balances", wallet)?,
            total_usd: None,
        })
    }
}

fn is_zero(amount: &str) -> bool {
    amount.trim().trim_start_matches('0').is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0xAbC0000000000000000000000000000000000001";
    const OTHER: &str = "0x9990000000000000000000000000000000000002";

    fn tx(hash: &str, ts: i64) -> Transaction {
        Transaction {
            hash: hash.to_owned(),
            from: OTHER.to_owned(),
            to: WALLET.to_owned(),
            value: "1".to_owned(),
            value_usd: None,
            token: None,
            timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
            tx_type: TxType::In,
            status: TxStatus::Confirmed,
            gas_used: None,
            gas_price: None,
            block_number: None,
        }
    }

    fn adapter_for(server: &MockServer, api_key: Option<&str>) -> EvmAdapter {
        let mut explorer = ExplorerConfig::new(&format!("{}/api", server.uri()), "https://etherscan.io");
        explorer.api_key = api_key.map(str::to_owned);
        EvmAdapter::new(Client::new(), HashMap::from([("ethereum".to_owned(), explorer)]))
    }

    #[test]
    fn classify_by_direction() {
        assert_eq!(classify(&WALLET.to_lowercase(), OTHER, WALLET), TxType::Out);
        assert_eq!(classify(OTHER, &WALLET.to_uppercase(), WALLET), TxType::In);
        assert_eq!(classify(WALLET, WALLET, WALLET), TxType::Contract);
        assert_eq!(classify(WALLET, "", WALLET), TxType::Contract);
        assert_eq!(classify(OTHER, OTHER, WALLET), TxType::Contract);
    }

    #[test]
    fn merge_sorts_and_keeps_native_duplicate() {
        let native = vec![tx("0xa", 100), tx("0xshared", 300)];
        let mut token_dup = tx("0xshared", 300);
        token_dup.token = Some(TokenInfo {
            address: "0xtoken".into(),
            symbol: "USDC".into(),
            name: None,
            decimals: 6,
        });
        let token = vec![token_dup, tx("0xb", 200)];

        let merged = merge_transactions(native, token);
        let hashes: Vec<&str> = merged.iter().map(|t| t.hash.as_str()).collect();

        assert_eq!(hashes, vec!["0xshared", "0xb", "0xa"]);
        assert!(merged[0].token.is_none(), "native record should win");
    }

    #[test]
    fn explorer_record_requires_hash_and_timestamp() {
        let raw = RawExplorerTx { time_stamp: Some("1".into()), ..Default::default() };
        assert_eq!(ExplorerTx::parse(raw, TxList::Native).unwrap_err(), ParseError::MissingField("hash"));

        let raw = RawExplorerTx {
            hash: Some("0x1".into()),
            time_stamp: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(ExplorerTx::parse(raw, TxList::Native),
            Err(ParseError::InvalidNumber { field: "timeStamp", .. })));
    }

    #[test]
    fn token_record_defaults_decimals() {
        let raw = RawExplorerTx {
            hash: Some("0x1".into()),
            time_stamp: Some("1700000000".into()),
            is_error: Some("1".into()),
            contract_address: Some("0xtoken".into()),
            token_symbol: Some("PEPE".into()),
            token_decimal: Some("".into()),
            ..Default::default()
        };

        let parsed = ExplorerTx::parse(raw, TxList::Token).unwrap();
        assert_eq!(parsed.token.as_ref().unwrap().decimals, 18);
        assert!(!parsed.failed, "token transfers are always confirmed");
    }

    #[tokio::test]
    async fn fetches_and_merges_both_lists() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("action", "txlist"))
            .and(query_param("offset", "50"))
            .and(query_param("sort", "desc"))
            .and(query_param("apikey", "KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": [
                    {
                        "hash": "0xshared", "from": WALLET, "to": OTHER, "value": "5",
                        "timeStamp": "1700000300", "blockNumber": "30", "isError": "0",
                        "gasUsed": "21000", "gasPrice": "1000000000"
                    },
                    {
                        "hash": "0xfailed", "from": OTHER, "to": WALLET, "value": "7",
                        "timeStamp": "1700000100", "blockNumber": "10", "isError": "1"
                    },
                    { "from": OTHER, "timeStamp": "1700000000" }
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("action", "tokentx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": [
                    {
                        "hash": "0xshared", "from": WALLET, "to": OTHER, "value": "99",
                        "timeStamp": "1700000300", "contractAddress": "0xtoken",
                        "tokenSymbol": "USDT", "tokenName": "Tether", "tokenDecimal": "6"
                    },
                    {
                        "hash": "0xtoken-in", "from": OTHER, "to": WALLET, "value": "1000000",
                        "timeStamp": "1700000200", "contractAddress": "0xtoken",
                        "tokenSymbol": "USDT", "tokenDecimal": "6"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, Some("KEY"));
        let wallet = WalletConfig::new("ethereum", WALLET);

        let transactions = adapter.fetch_transactions(&wallet).await.unwrap();
        let hashes: Vec<&str> = transactions.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xshared", "0xtoken-in", "0xfailed"]);

        assert_eq!(transactions[0].tx_type, TxType::Out);
        assert!(transactions[0].token.is_none());
        assert_eq!(transactions[0].gas_used.as_deref(), Some("21000"));
        assert_eq!(transactions[1].tx_type, TxType::In);
        assert_eq!(transactions[1].token.as_ref().unwrap().decimals, 6);
        assert_eq!(transactions[2].status, TxStatus::Failed);
        assert_eq!(transactions[2].block_number, Some(10));
    }

    #[tokio::test]
    async fn empty_history_is_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "No transactions found",
                "result": []
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, None);
        let transactions = adapter.fetch_transactions(&WalletConfig::new("ethereum", WALLET)).await.unwrap();
        assert!(transactions.is_empty());
    }

    #[tokio::test]
    async fn failing_list_degrades_to_the_other() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("action", "txlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0",
                "message": "NOTOK",
                "result": "Max rate limit reached"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("action", "tokentx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": [{
                    "hash": "0xt", "from": OTHER, "to": WALLET, "value": "1",
                    "timeStamp": "1700000000", "contractAddress": "0xtoken", "tokenSymbol": "DAI"
                }]
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, None);
        let transactions = adapter.fetch_transactions(&WalletConfig::new("ethereum", WALLET)).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].hash, "0xt");
    }

    #[tokio::test]
    async fn balance_filters_zero_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(query_param("action", "balance"))
            .and(query_param("tag", "latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": "1500000000000000000"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("action", "tokenlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "message": "OK",
                "result": [
                    { "balance": "0", "contractAddress": "0xempty", "decimals": "6", "symbol": "NONE" },
                    { "balance": "42", "contractAddress": "0xfull", "decimals": "??", "symbol": "FULL", "name": "Full" }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, None);
        let balance = adapter.fetch_balance(&WalletConfig::new("ethereum", WALLET)).await.unwrap();

        assert_eq!(balance.native, "1500000000000000000");
        assert_eq!(balance.tokens.len(), 1);
        assert_eq!(balance.tokens[0].token.address, "0xfull");
        assert_eq!(balance.tokens[0].token.decimals, 18);
    }

    #[tokio::test]
    async fn server_error_degrades_to_zero_balance() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, None);
        let balance = adapter.fetch_balance(&WalletConfig::new("ethereum", WALLET)).await.unwrap();
        assert_eq!(balance, WalletBalance::zero());
    }

    #[tokio::test]
    async fn broken_api_url_is_reported() {
        let explorer = ExplorerConfig::new("::not a url::", "https://etherscan.io");
        let adapter = EvmAdapter::new(Client::new(), HashMap::from([("ethereum".to_owned(), explorer)]));

        let result = adapter.fetch_transactions(&WalletConfig::new("ethereum", WALLET)).await;
        assert!(matches!(result, Err(FetchError::Url(_))));
    }
}
