// LCD (REST) implementation of ChainClient

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AccountInfo, BroadcastResult, ChainClient, ChainError, CodeInfo, Coin, TxEvent, TxResult};
use crate::retry::{with_retry, RetryPolicy};

/// Chain client over the Cosmos SDK REST gateway
///
/// Reads and simulation are retried on transient failures per the read
/// policy; broadcast is attempted exactly once.
pub struct LcdClient {
    base_url: String,
    client: Client,
    read_policy: RetryPolicy,
}

impl LcdClient {
    pub fn new(base_url: &str, read_policy: RetryPolicy) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(read_policy.timeout)
            .build()
            .map_err(|e| ChainError::Transport(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            read_policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Single GET returning the JSON body, or `None` on 404
    async fn get_json(&self, path: &str) -> Result<Option<Value>, ChainError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::json_body(response, true).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ChainError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::json_body(response, false)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("empty response from {}", path)))
    }

    async fn json_body(response: reqwest::Response, not_found_is_none: bool) -> Result<Option<Value>, ChainError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND && not_found_is_none {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let value: Value = response.json().await?;
        Ok(Some(value))
    }

    /// GET with the read retry policy
    async fn read(&self, operation: &str, path: &str) -> Result<Option<Value>, ChainError> {
        with_retry(&self.read_policy, operation, || self.get_json(path)).await
    }

    async fn read_required(&self, operation: &str, path: &str) -> Result<Value, ChainError> {
        self.read(operation, path).await?.ok_or_else(|| ChainError::Status {
            status: 404,
            message: format!("{} not found", path),
        })
    }
}

/// The gateway's error message from a JSON error body, or the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Integers are rendered as strings by the gateway; accept both
fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn parse_account(value: &Value) -> Result<AccountInfo, ChainError> {
    let account = &value["account"];
    // vesting and module accounts nest the base account
    let base = if account.get("account_number").is_some() {
        account
    } else if let Some(base) = account.pointer("/base_vesting_account/base_account") {
        base
    } else if let Some(base) = account.get("base_account") {
        base
    } else {
        return Err(ChainError::Decode(format!("no account in response: {}", value)));
    };

    Ok(AccountInfo {
        account_number: as_u64(&base["account_number"])
            .ok_or_else(|| ChainError::Decode("missing account_number".to_string()))?,
        // fresh accounts omit the sequence
        sequence: as_u64(&base["sequence"]).unwrap_or(0),
    })
}

fn parse_events(value: &Value) -> Vec<TxEvent> {
    let Some(events) = value.as_array() else {
        return Vec::new();
    };

    events
        .iter()
        .map(|event| TxEvent {
            kind: event["type"].as_str().unwrap_or_default().to_string(),
            attributes: event["attributes"]
                .as_array()
                .map(|attributes| {
                    attributes
                        .iter()
                        .map(|attribute| {
                            (
                                attribute["key"].as_str().unwrap_or_default().to_string(),
                                attribute["value"].as_str().unwrap_or_default().to_string(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn parse_tx_response(tx_response: &Value) -> Result<TxResult, ChainError> {
    let mut events = parse_events(&tx_response["events"]);

    // older nodes only report events inside per-message logs
    if events.is_empty() {
        if let Some(logs) = tx_response["logs"].as_array() {
            events = logs.iter().flat_map(|log| parse_events(&log["events"])).collect();
        }
    }

    Ok(TxResult {
        txhash: tx_response["txhash"].as_str().unwrap_or_default().to_string(),
        height: as_u64(&tx_response["height"]).unwrap_or(0),
        code: as_u64(&tx_response["code"]).unwrap_or(0) as u32,
        raw_log: tx_response["raw_log"].as_str().unwrap_or_default().to_string(),
        events,
    })
}

fn parse_coins(value: &Value) -> Result<Vec<Coin>, ChainError> {
    let Some(coins) = value.as_array() else {
        return Ok(Vec::new());
    };

    coins
        .iter()
        .map(|coin| {
            let denom = coin["denom"].as_str().unwrap_or_default();
            let amount = coin["amount"]
                .as_str()
                .and_then(|amount| amount.parse::<u128>().ok())
                .ok_or_else(|| ChainError::Decode(format!("invalid coin {}", coin)))?;
            Ok(Coin::new(amount, denom))
        })
        .collect()
}

#[async_trait]
impl ChainClient for LcdClient {
    async fn account(&self, address: &str) -> Result<AccountInfo, ChainError> {
        let path = format!("/cosmos/auth/v1beta1/accounts/{}", address);
        let value = self.read_required("query account", &path).await?;
        parse_account(&value)
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, ChainError> {
        let body = json!({ "tx_bytes": general_purpose::STANDARD.encode(tx_bytes) });

        let value = with_retry(&self.read_policy, "simulate", || {
            self.post_json("/cosmos/tx/v1beta1/simulate", &body)
        })
        .await?;

        let gas_used = as_u64(&value["gas_info"]["gas_used"])
            .ok_or_else(|| ChainError::Decode(format!("no gas_info in simulation response: {}", value)))?;
        debug!("Simulation used {} gas", gas_used);
        Ok(gas_used)
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResult, ChainError> {
        let body = json!({
            "tx_bytes": general_purpose::STANDARD.encode(tx_bytes),
            "mode": "BROADCAST_MODE_SYNC"
        });

        let value = self.post_json("/cosmos/tx/v1beta1/txs", &body).await?;
        let tx_response = value
            .get("tx_response")
            .ok_or_else(|| ChainError::Decode(format!("no tx_response in broadcast response: {}", value)))?;

        let result = BroadcastResult {
            txhash: tx_response["txhash"].as_str().unwrap_or_default().to_string(),
            code: as_u64(&tx_response["code"]).unwrap_or(0) as u32,
            raw_log: tx_response["raw_log"].as_str().unwrap_or_default().to_string(),
        };

        if result.txhash.is_empty() {
            return Err(ChainError::Decode("broadcast response carries no txhash".to_string()));
        }

        info!("Broadcast transaction {} (code {})", result.txhash, result.code);
        Ok(result)
    }

    async fn tx(&self, txhash: &str) -> Result<Option<TxResult>, ChainError> {
        let path = format!("/cosmos/tx/v1beta1/txs/{}", txhash);

        match self.read("query tx", &path).await {
            Ok(Some(value)) => {
                let tx_response = value
                    .get("tx_response")
                    .ok_or_else(|| ChainError::Decode(format!("no tx_response for {}", txhash)))?;
                parse_tx_response(tx_response).map(Some)
            }
            Ok(None) => Ok(None),
            // some gateways answer 400 "tx not found" for pending transactions
            Err(ChainError::Status { status: 400, message }) if message.contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn raw_query(&self, contract: &str, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        let path = format!(
            "/cosmwasm/wasm/v1/contract/{}/raw/{}",
            contract,
            general_purpose::URL_SAFE.encode(key)
        );
        let value = self.read_required("raw query", &path).await?;

        match value.get("data") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(data)) if data.is_empty() => Ok(None),
            Some(Value::String(data)) => general_purpose::STANDARD
                .decode(data)
                .map(Some)
                .map_err(|e| ChainError::Decode(format!("raw query data is not base64: {}", e))),
            Some(other) => Err(ChainError::Decode(format!("unexpected raw query data: {}", other))),
        }
    }

    async fn smart_query(&self, contract: &str, msg: &Value) -> Result<Value, ChainError> {
        let msg_bytes = serde_json::to_vec(msg).map_err(|e| ChainError::Decode(e.to_string()))?;
        let path = format!(
            "/cosmwasm/wasm/v1/contract/{}/smart/{}",
            contract,
            general_purpose::URL_SAFE.encode(msg_bytes)
        );
        let value = self.read_required("smart query", &path).await?;

        // `data` is the contract's JSON answer inlined, strings included
        match value.get("data") {
            Some(data) => Ok(data.clone()),
            None => Err(ChainError::Decode(format!("no data in smart query response: {}", value))),
        }
    }

    async fn recent_codes(&self, limit: u32) -> Result<Vec<CodeInfo>, ChainError> {
        let path = format!(
            "/cosmwasm/wasm/v1/code?pagination.reverse=true&pagination.limit={}",
            limit
        );
        let value = self.read_required("list codes", &path).await?;

        value["code_infos"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|info| {
                let code_id = as_u64(&info["code_id"])
                    .ok_or_else(|| ChainError::Decode(format!("invalid code info {}", info)))?;
                let checksum = info["data_hash"]
                    .as_str()
                    .or_else(|| info["checksum"].as_str())
                    .unwrap_or_default()
                    .to_lowercase();
                Ok(CodeInfo { code_id, checksum })
            })
            .collect()
    }

    async fn min_deposit(&self) -> Result<Vec<Coin>, ChainError> {
        let value = self
            .read_required("query deposit params", "/cosmos/gov/v1/params/deposit")
            .await?;

        let min_deposit = value
            .pointer("/params/min_deposit")
            .filter(|coins| coins.as_array().map_or(false, |coins| !coins.is_empty()))
            .or_else(|| value.pointer("/deposit_params/min_deposit"))
            .ok_or_else(|| ChainError::Decode(format!("no min_deposit in {}", value)))?;

        parse_coins(min_deposit)
    }
}
