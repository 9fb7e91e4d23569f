use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Environment variable prefix for configuration overrides,
/// e.g. `DEPLOYER__NETWORK__MAX_RETRIES=5`
pub const ENV_OVERRIDE_PREFIX: &str = "DEPLOYER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub artifacts: ArtifactConfig,
    pub environments: EnvironmentsConfig,
    pub network: NetworkConfig,
    pub submit: SubmitConfig,
    pub keys: KeysConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Base URL of published contract releases
    pub release_base_url: String,
    /// Working directory downloaded artifacts are written to
    pub artifact_dir: PathBuf,
    /// Name of the checksum manifest published next to each release
    pub manifest_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentsConfig {
    /// Directory holding `<network>.json` environment files
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout applied to every HTTP request
    #[serde(with = "humantime_str")]
    pub request_timeout: Duration,
    /// Retries for idempotent reads (downloads, queries); broadcast never retries
    pub max_retries: u32,
    /// First retry delay, doubled on each attempt
    #[serde(with = "humantime_str")]
    pub initial_backoff: Duration,
    /// Backoff cap
    #[serde(with = "humantime_str")]
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// How long `--wait` polls for the transaction to be included
    #[serde(with = "humantime_str")]
    pub wait_timeout: Duration,
    /// Polling interval while waiting for inclusion
    #[serde(with = "humantime_str")]
    pub poll_interval: Duration,
    /// Ask for confirmation before broadcasting on mainnet
    pub confirm_mainnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Directory for encrypted keystore files
    pub keystore_dir: PathBuf,
    /// Environment variable prefix for plaintext keys, e.g. `DEPLOYER_KEY_TESTNET`
    pub env_prefix: String,
    /// Whether keys may come from environment variables
    pub allow_env_keys: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            release_base_url: "https://static.axelar.network/releases/cosmwasm".to_string(),
            artifact_dir: PathBuf::from("artifacts"),
            manifest_name: "checksums.txt".to_string(),
        }
    }
}

impl Default for EnvironmentsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("axelar-chains-config/info"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            confirm_mainnet: true,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        let keystore_dir = dirs::home_dir()
            .map(|home| home.join(".deployer").join("keys"))
            .unwrap_or_else(|| PathBuf::from("~/.deployer/keys"));

        Self {
            keystore_dir,
            env_prefix: "DEPLOYER_KEY_".to_string(),
            allow_env_keys: true,
        }
    }
}

impl DeployerConfig {
    /// Load configuration from a TOML file, layered under `DEPLOYER__*`
    /// environment overrides. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: DeployerConfig = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Retry policy for idempotent reads
    pub fn read_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.network.request_timeout,
            max_retries: self.network.max_retries,
            initial_backoff: self.network.initial_backoff,
            max_backoff: self.network.max_backoff,
        }
    }
}

/// Durations written the human way in config files ("30s", "2m")
mod humantime_str {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
