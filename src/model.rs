use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// A tracked wallet. Identity is `chain:address`, see [`WalletConfig::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub address: String,
    pub chain: String,
    pub label: Option<String>,
}

impl WalletConfig {
    pub fn new(chain: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: chain.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn key(&self) -> String {
        wallet_key(&self.chain, &self.address)
    }
}

/// Registry and activity store key.
pub fn wallet_key(chain: &str, address: &str) -> String {
    format!("{}:{}", chain, address)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TxType {
    In,
    Out,
    Swap,
    Approval,
    Contract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u8,
}

/// Normalized transaction. `value` is the raw integer amount in the smallest
/// unit of the native currency, or of `token` when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub value_usd: Option<f64>,
    pub token: Option<TokenInfo>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub status: TxStatus,
    pub gas_used: Option<String>,
    pub gas_price: Option<String>,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: TokenInfo,
    pub balance: String,
    pub balance_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub native: String,
    pub native_usd: Option<f64>,
    pub tokens: Vec<TokenBalance>,
    pub total_usd: Option<f64>,
}

impl WalletBalance {
    /// Snapshot reported when a balance cannot be fetched.
    pub fn zero() -> Self {
        Self {
            native: "0".to_owned(),
            native_usd: None,
            tokens: Vec::new(),
            total_usd: None,
        }
    }
}

impl Default for WalletBalance {
    fn default() -> Self {
        Self::zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    pub wallet: WalletConfig,
    pub transactions: Vec<Transaction>,
    pub balance: WalletBalance,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn key_joins_chain_and_address() {
        let wallet = WalletConfig::new("ethereum", "0xAbC").with_label("cold");
        assert_eq!(wallet.key(), "ethereum:0xAbC");
        assert_eq!(wallet.label.as_deref(), Some("cold"));
    }

    #[test]
    fn tx_type_uses_lowercase_names() {
        assert_eq!(TxType::Approval.to_string(), "approval");
        assert_eq!(TxType::from_str("out").unwrap(), TxType::Out);
        assert_eq!(serde_json::to_string(&TxStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn transaction_serializes_type_field() {
        let tx = Transaction {
            hash: "0x1".into(),
            from: "a".into(),
            to: "b".into(),
            value: "10".into(),
            value_usd: None,
            token: None,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            tx_type: TxType::In,
            status: TxStatus::Confirmed,
            gas_used: None,
            gas_price: None,
            block_number: Some(7),
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "in");
        assert_eq!(json["status"], "confirmed");
    }

    #[test]
    fn zero_balance_is_default() {
        let balance = WalletBalance::default();
        assert_eq!(balance.native, "0");
        assert!(balance.tokens.is_empty());
    }
}
