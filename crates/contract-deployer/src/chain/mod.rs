// Chain access for the deployer
// Everything the workflow needs from the Axelar chain goes through `ChainClient`

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::retry::Transient;

pub mod gas;
pub mod lcd;
pub mod tx;

pub use gas::{Coin, GasPrice, GasSettings, TxFee};
pub use lcd::LcdClient;

/// Errors talking to a chain endpoint
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl Transient for ChainError {
    fn is_transient(&self) -> bool {
        match self {
            ChainError::Transport(_) | ChainError::Timeout(_) => true,
            ChainError::Status { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            ChainError::Decode(_) => false,
        }
    }

    fn timed_out(after: Duration) -> Self {
        ChainError::Timeout(after)
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainError::Transport(format!("timed out: {}", e))
        } else if e.is_decode() {
            ChainError::Decode(e.to_string())
        } else {
            ChainError::Transport(e.to_string())
        }
    }
}

/// Account number and sequence of a signer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// Result of a synchronous broadcast (mempool admission only)
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    pub txhash: String,
    pub code: u32,
    pub raw_log: String,
}

/// A single ABCI event with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct TxEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

/// A transaction included in a block
#[derive(Debug, Clone)]
pub struct TxResult {
    pub txhash: String,
    pub height: u64,
    pub code: u32,
    pub raw_log: String,
    pub events: Vec<TxEvent>,
}

impl TxResult {
    /// First value of `attribute` on an event of type `kind`
    pub fn event_attribute(&self, kind: &str, attribute: &str) -> Option<&str> {
        self.events
            .iter()
            .filter(|event| event.kind == kind)
            .flat_map(|event| event.attributes.iter())
            .find(|(key, _)| key == attribute)
            .map(|(_, value)| value.as_str())
    }
}

/// An uploaded wasm code as listed by the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeInfo {
    pub code_id: u64,
    /// Lowercase hex sha256 of the wasm bytes
    pub checksum: String,
}

/// Read and write access to the chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn account(&self, address: &str) -> Result<AccountInfo, ChainError>;

    /// Simulate a signed transaction, returning the gas it used
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, ChainError>;

    /// Broadcast a signed transaction once; never retried
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResult, ChainError>;

    /// Look up a transaction; `None` while it is not yet included
    async fn tx(&self, txhash: &str) -> Result<Option<TxResult>, ChainError>;

    /// Raw contract storage at `key`; `None` if the key holds nothing
    async fn raw_query(&self, contract: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError>;

    /// Smart query; the contract's JSON answer
    async fn smart_query(&self, contract: &str, msg: &Value) -> Result<Value, ChainError>;

    /// Most recently uploaded codes, newest first
    async fn recent_codes(&self, limit: u32) -> Result<Vec<CodeInfo>, ChainError>;

    /// Minimum deposit for a governance proposal to enter voting
    async fn min_deposit(&self) -> Result<Vec<Coin>, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Transport("connection reset".to_string()).is_transient());
        assert!(ChainError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ChainError::Status { status: 503, message: String::new() }.is_transient());
        assert!(!ChainError::Status { status: 500, message: String::new() }.is_transient());
        assert!(!ChainError::Status { status: 404, message: String::new() }.is_transient());
        assert!(!ChainError::Decode("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_event_attribute_lookup() {
        let result = TxResult {
            txhash: "ABC".to_string(),
            height: 10,
            code: 0,
            raw_log: String::new(),
            events: vec![
                TxEvent {
                    kind: "message".to_string(),
                    attributes: vec![("action".to_string(), "store".to_string())],
                },
                TxEvent {
                    kind: "store_code".to_string(),
                    attributes: vec![
                        ("code_checksum".to_string(), "ab".to_string()),
                        ("code_id".to_string(), "42".to_string()),
                    ],
                },
            ],
        };

        assert_eq!(result.event_attribute("store_code", "code_id"), Some("42"));
        assert_eq!(result.event_attribute("instantiate", "_contract_address"), None);
    }
}
