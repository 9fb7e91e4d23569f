// Gas price, coin amounts and fee computation

use cosmos_sdk_proto::cosmos::base::v1beta1::Coin as ProtoCoin;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Split "123.45udenom" into its numeric prefix and denom
fn split_amount(s: &str) -> Result<(&str, &str), String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (amount, denom) = s.split_at(split);

    if amount.is_empty() {
        return Err(format!("'{}' has no amount", s));
    }
    Ok((amount, denom))
}

fn valid_denom(denom: &str) -> bool {
    denom.len() >= 2
        && denom.starts_with(|c: char| c.is_ascii_alphabetic())
        && denom
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'))
}

/// Price per unit of gas, e.g. "0.007uamplifier"
#[derive(Debug, Clone, PartialEq)]
pub struct GasPrice {
    pub amount: f64,
    pub denom: String,
}

impl FromStr for GasPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (amount, denom) = split_amount(s)?;
        let amount: f64 = amount
            .parse()
            .map_err(|e| format!("invalid gas price amount '{}': {}", amount, e))?;

        if !amount.is_finite() || amount < 0.0 {
            return Err(format!("gas price must be a non-negative number, got {}", amount));
        }
        if !valid_denom(denom) {
            return Err(format!("invalid gas price denom '{}'", denom));
        }

        Ok(Self {
            amount,
            denom: denom.to_string(),
        })
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// An integer amount of a denom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: u128,
    pub denom: String,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Self {
            amount,
            denom: denom.into(),
        }
    }

    /// Parse "100000000uaxl", or a bare "100000000" in `default_denom`
    pub fn parse(s: &str, default_denom: &str) -> Result<Self, String> {
        let (amount, denom) = split_amount(s)?;
        let amount: u128 = amount
            .parse()
            .map_err(|e| format!("invalid coin amount '{}': {}", amount, e))?;

        let denom = if denom.is_empty() { default_denom } else { denom };
        if !valid_denom(denom) {
            return Err(format!("invalid denom '{}'", denom));
        }

        Ok(Self::new(amount, denom))
    }

    pub fn to_proto(&self) -> ProtoCoin {
        ProtoCoin {
            denom: self.denom.clone(),
            amount: self.amount.to_string(),
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Fee attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFee {
    pub gas_limit: u64,
    pub amount: Coin,
}

/// Gas settings of a chain: price and the multiplier applied to simulated usage
#[derive(Debug, Clone)]
pub struct GasSettings {
    pub price: GasPrice,
    pub adjustment: f64,
}

impl GasSettings {
    pub fn new(price: GasPrice, adjustment: f64) -> Self {
        Self { price, adjustment }
    }

    /// Fee for a transaction whose simulation used `gas_used`
    pub fn fee_from_simulation(&self, gas_used: u64) -> TxFee {
        let gas_limit = (gas_used as f64 * self.adjustment).ceil() as u64;
        let amount = (gas_limit as f64 * self.price.amount).ceil() as u128;

        TxFee {
            gas_limit,
            amount: Coin::new(amount, self.price.denom.clone()),
        }
    }
}
