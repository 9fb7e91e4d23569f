// Post-deployment contract state checks
// Read-only: raw and smart queries, decoded for comparison

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::{ChainClient, ChainError};
use crate::error::ErrorKind;

/// Raw storage key under which cw2 keeps `{"contract", "version"}`
pub const CONTRACT_INFO_KEY: &[u8] = b"contract_info";

/// A decoded query answer
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub bytes: Vec<u8>,
    /// UTF-8 text of `bytes`, if valid
    pub text: Option<String>,
    /// JSON value of `bytes`, if valid
    pub json: Option<Value>,
}

impl QueryResult {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let text = String::from_utf8(bytes.clone()).ok();
        let json = serde_json::from_slice(&bytes).ok();
        Self { bytes, text, json }
    }

    /// JSON value, or `DecodeError` naming what was wrong
    pub fn require_json(&self) -> Result<&Value, ErrorKind> {
        if self.text.is_none() {
            return Err(ErrorKind::DecodeError("query result is not valid UTF-8".to_string()));
        }
        self.json
            .as_ref()
            .ok_or_else(|| ErrorKind::DecodeError("query result is not valid JSON".to_string()))
    }
}

/// Contract name and version a contract reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract: String,
    pub version: String,
}

/// Decode failures keep their kind, everything else is a rejected query
pub(crate) fn query_error(e: ChainError) -> ErrorKind {
    match e {
        ChainError::Decode(message) => ErrorKind::DecodeError(message),
        other => ErrorKind::QueryError(other.to_string()),
    }
}

/// Parse a hex raw key, with or without `0x`
pub fn parse_hex_key(key: &str) -> Result<Vec<u8>, ErrorKind> {
    let key = key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    hex::decode(key).map_err(|e| ErrorKind::InvalidPayload(format!("key is not hex: {}", e)))
}

pub struct StateVerifier {
    client: Arc<dyn ChainClient>,
}

impl StateVerifier {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Raw storage read; an empty slot is a `QueryError`
    pub async fn query_raw(&self, address: &str, key: &[u8]) -> Result<QueryResult, ErrorKind> {
        debug!("Raw query {} key {}", address, hex::encode(key));

        let bytes = self
            .client
            .raw_query(address, key)
            .await
            .map_err(query_error)?
            .ok_or_else(|| {
                ErrorKind::QueryError(format!(
                    "no value stored under key {} in {}",
                    hex::encode(key),
                    address
                ))
            })?;

        Ok(QueryResult::from_bytes(bytes))
    }

    /// Smart query with a JSON message
    pub async fn query_smart(&self, address: &str, msg: &str) -> Result<QueryResult, ErrorKind> {
        let msg: Value = serde_json::from_str(msg)
            .map_err(|e| ErrorKind::InvalidPayload(format!("query message is not valid JSON: {}", e)))?;
        debug!("Smart query {} msg {}", address, msg);

        let answer = self
            .client
            .smart_query(address, &msg)
            .await
            .map_err(query_error)?;

        let bytes = serde_json::to_vec(&answer).map_err(|e| ErrorKind::DecodeError(e.to_string()))?;
        Ok(QueryResult::from_bytes(bytes))
    }

    /// The cw2 contract info of the contract at `address`
    pub async fn contract_info(&self, address: &str) -> Result<ContractInfo, ErrorKind> {
        let result = self.query_raw(address, CONTRACT_INFO_KEY).await?;
        let json = result.require_json()?;

        serde_json::from_value(json.clone())
            .map_err(|e| ErrorKind::DecodeError(format!("contract_info has unexpected shape: {}", e)))
    }

    /// Check the contract at `address` reports `expected` as its version
    pub async fn expect_version(&self, address: &str, expected: &str) -> Result<ContractInfo, ErrorKind> {
        let info = self.contract_info(address).await?;

        if info.version != expected {
            return Err(ErrorKind::QueryError(format!(
                "{} reports version {}, expected {}",
                address, info.version, expected
            )));
        }

        info!("{} at {} reports version {}", info.contract, address, info.version);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AccountInfo, BroadcastResult, CodeInfo, Coin, TxResult};
    use async_trait::async_trait;
    use serde_json::json;

    /// Chain stub answering queries from fixed values
    struct StubChain {
        raw: Result<Option<Vec<u8>>, ChainError>,
        smart: Result<Value, ChainError>,
    }

    #[async_trait]
    impl ChainClient for StubChain {
        async fn account(&self, _address: &str) -> Result<AccountInfo, ChainError> {
            unimplemented!()
        }
        async fn simulate(&self, _tx_bytes: &[u8]) -> Result<u64, ChainError> {
            unimplemented!()
        }
        async fn broadcast(&self, _tx_bytes: &[u8]) -> Result<BroadcastResult, ChainError> {
            unimplemented!()
        }
        async fn tx(&self, _txhash: &str) -> Result<Option<TxResult>, ChainError> {
            unimplemented!()
        }
        async fn raw_query(&self, _contract: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
            assert_eq!(hex::encode(key), "636f6e74726163745f696e666f");
            self.raw.clone()
        }
        async fn smart_query(&self, _contract: &str, _msg: &Value) -> Result<Value, ChainError> {
            self.smart.clone()
        }
        async fn recent_codes(&self, _limit: u32) -> Result<Vec<CodeInfo>, ChainError> {
            unimplemented!()
        }
        async fn min_deposit(&self) -> Result<Vec<Coin>, ChainError> {
            unimplemented!()
        }
    }

    fn verifier(raw: Result<Option<Vec<u8>>, ChainError>) -> StateVerifier {
        StateVerifier::new(Arc::new(StubChain {
            raw,
            smart: Ok(json!({ "threshold": 3 })),
        }))
    }

    #[test]
    fn test_contract_info_key() {
        assert_eq!(parse_hex_key("636f6e74726163745f696e666f").unwrap(), CONTRACT_INFO_KEY);
        assert_eq!(parse_hex_key("0x636f6e74726163745f696e666f").unwrap(), CONTRACT_INFO_KEY);
        assert!(matches!(parse_hex_key("zz"), Err(ErrorKind::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_expect_version() {
        let stored = br#"{"contract":"multisig","version":"2.0.0"}"#.to_vec();
        let verifier = verifier(Ok(Some(stored)));

        let info = verifier.expect_version("axelar1multisig", "2.0.0").await.unwrap();
        assert_eq!(info.contract, "multisig");

        let mismatch = verifier.expect_version("axelar1multisig", "2.1.0").await;
        assert!(matches!(mismatch, Err(ErrorKind::QueryError(_))));
    }

    #[tokio::test]
    async fn test_decode_failures() {
        let not_utf8 = verifier(Ok(Some(vec![0xff, 0xfe, 0x00])));
        assert!(matches!(
            not_utf8.contract_info("axelar1x").await,
            Err(ErrorKind::DecodeError(_))
        ));

        let not_json = verifier(Ok(Some(b"multisig 2.0.0".to_vec())));
        assert!(matches!(
            not_json.contract_info("axelar1x").await,
            Err(ErrorKind::DecodeError(_))
        ));

        let wrong_shape = verifier(Ok(Some(br#"{"name":"multisig"}"#.to_vec())));
        assert!(matches!(
            wrong_shape.contract_info("axelar1x").await,
            Err(ErrorKind::DecodeError(_))
        ));

        let bad_base64 = verifier(Err(ChainError::Decode("invalid base64".to_string())));
        assert!(matches!(
            bad_base64.contract_info("axelar1x").await,
            Err(ErrorKind::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn test_node_rejection_is_query_error() {
        let rejected = verifier(Err(ChainError::Status {
            status: 500,
            message: "contract: not found".to_string(),
        }));
        assert!(matches!(
            rejected.contract_info("axelar1x").await,
            Err(ErrorKind::QueryError(_))
        ));

        let empty = verifier(Ok(None));
        assert!(matches!(empty.contract_info("axelar1x").await, Err(ErrorKind::QueryError(_))));
    }

    #[tokio::test]
    async fn test_smart_query_result() {
        let verifier = verifier(Ok(None));
        let result = verifier.query_smart("axelar1x", r#"{"config":{}}"#).await.unwrap();
        assert_eq!(result.json.unwrap()["threshold"], 3);
        assert_eq!(result.text.as_deref(), Some(r#"{"threshold":3}"#));

        assert!(matches!(
            verifier.query_smart("axelar1x", "{config").await,
            Err(ErrorKind::InvalidPayload(_))
        ));
    }
}
