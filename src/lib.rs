pub mod chain;
pub mod config;
pub mod error;
pub mod model;
pub mod state;
pub mod util;

pub use chain::{ChainAdapter, ChainRouter};
pub use config::{ChainEndpoints, ExplorerConfig, SolanaEndpoints, TrackerConfig};
pub use error::{FetchError, ParseError};
pub use model::{TokenBalance, TokenInfo, Transaction, TxStatus, TxType, WalletActivity, WalletBalance, WalletConfig};
pub use state::diff::{diff_activity, ActivityEvent};
pub use state::{WalletTracker, DEFAULT_HISTORY_LIMIT};
