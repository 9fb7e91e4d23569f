// Per-network environment files
// One JSON document per network tier holds the chain endpoints and the
// contract name -> {address, code id} mapping. The deployer only reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::chain::gas::GasPrice;
use crate::error::ErrorKind;

/// Network tiers contracts are promoted through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    DevnetAmplifier,
    Stagenet,
    Testnet,
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::DevnetAmplifier,
        Network::Stagenet,
        Network::Testnet,
        Network::Mainnet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::DevnetAmplifier => "devnet-amplifier",
            Network::Stagenet => "stagenet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Suffix used for environment variable names, e.g. `DEVNET_AMPLIFIER`
    pub fn env_suffix(&self) -> String {
        self.as_str().to_uppercase().replace('-', "_")
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "devnet-amplifier" | "devnet" => Ok(Network::DevnetAmplifier),
            "stagenet" => Ok(Network::Stagenet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => {
                let known: Vec<&str> = Network::ALL.iter().map(Network::as_str).collect();
                Err(format!("unknown network '{}', expected one of {}", other, known.join(", ")))
            }
        }
    }
}

/// A code upload recorded against a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCode {
    pub code_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Deployment record of a single contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stored_codes: Vec<StoredCode>,
    /// Contract-specific keys (instantiate params, per-chain sub entries, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Chain-level settings of the Axelar network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxelarChain {
    pub chain_id: String,
    /// LCD (REST) endpoint used for queries, simulation and broadcast
    pub lcd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<String>,
    /// Gas price with denom, e.g. "0.007uamplifier"
    pub gas_price: String,
    #[serde(default = "default_gas_adjustment")]
    pub gas_adjustment: f64,
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    pub governance_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gov_proposal_deposit_amount: Option<String>,
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractEntry>,
}

fn default_gas_adjustment() -> f64 {
    1.5
}

fn default_address_prefix() -> String {
    "axelar".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvironmentFile {
    axelar: AxelarChain,
}

/// A loaded, immutable view of one network's environment file
#[derive(Debug, Clone)]
pub struct Environment {
    pub network: Network,
    pub path: PathBuf,
    pub axelar: AxelarChain,
}

impl Environment {
    /// Path of the environment file for `network` under `dir`
    pub fn file_path(dir: &Path, network: Network) -> PathBuf {
        dir.join(format!("{}.json", network.as_str()))
    }

    /// Load `<dir>/<network>.json`
    pub fn load(dir: &Path, network: Network) -> Result<Self, ErrorKind> {
        let path = Self::file_path(dir, network);
        Self::load_from(&path, network)
    }

    /// Load an environment from an explicit file path
    pub fn load_from(path: &Path, network: Network) -> Result<Self, ErrorKind> {
        debug!("Loading environment {} from {}", network, path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            ErrorKind::Environment(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: EnvironmentFile = serde_json::from_str(&content).map_err(|e| {
            ErrorKind::Environment(format!("cannot parse {}: {}", path.display(), e))
        })?;

        Ok(Self {
            network,
            path: path.to_path_buf(),
            axelar: file.axelar,
        })
    }

    /// Look up a contract entry, exact name first, then case-insensitively
    pub fn contract(&self, name: &str) -> Option<(&str, &ContractEntry)> {
        if let Some((key, entry)) = self.axelar.contracts.get_key_value(name) {
            return Some((key.as_str(), entry));
        }

        self.axelar
            .contracts
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, entry)| (key.as_str(), entry))
    }

    /// Deployed address of a contract
    pub fn contract_address(&self, name: &str) -> Result<String, ErrorKind> {
        self.contract(name)
            .and_then(|(_, entry)| entry.address.clone())
            .filter(|address| !address.is_empty())
            .ok_or_else(|| {
                ErrorKind::MissingAddress(format!(
                    "no address recorded for {} in {}",
                    name,
                    self.path.display()
                ))
            })
    }

    /// Most recently stored code id for a contract
    ///
    /// Code ids are assigned monotonically by the chain, so the highest id
    /// across `storedCodes` and `codeId` is the latest upload.
    pub fn latest_code_id(&self, name: &str) -> Result<u64, ErrorKind> {
        let entry = self.contract(name).map(|(_, entry)| entry);

        entry
            .and_then(|entry| {
                entry
                    .stored_codes
                    .iter()
                    .map(|stored| stored.code_id)
                    .chain(entry.code_id)
                    .max()
            })
            .ok_or_else(|| {
                ErrorKind::MissingAddress(format!(
                    "no stored code id for {} in {}",
                    name,
                    self.path.display()
                ))
            })
    }

    /// The recorded upload for a given code id, if any
    pub fn stored_code(&self, name: &str, code_id: u64) -> Option<&StoredCode> {
        self.contract(name)?
            .1
            .stored_codes
            .iter()
            .find(|stored| stored.code_id == code_id)
    }

    /// Denom of the gas price, also the default deposit denom
    pub fn fee_denom(&self) -> Result<String, ErrorKind> {
        self.gas_price().map(|price| price.denom)
    }

    /// Parsed gas price of the chain
    pub fn gas_price(&self) -> Result<GasPrice, ErrorKind> {
        self.axelar
            .gas_price
            .parse::<GasPrice>()
            .map_err(|e| ErrorKind::Environment(format!("gasPrice: {}", e)))
    }
}
