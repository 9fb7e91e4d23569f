// Signer key management for deployment transactions
// Keys come from environment variables or from the encrypted keystore

use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::config::KeysConfig;
use crate::environment::Network;

pub mod key;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

pub use key::{derive_address, validate_address, SignerKey, ACCOUNT_PREFIX};
pub use storage::{EncryptedKeystore, KeyStorage, KeystoreError, MemoryKeyStorage, StoredKey};

/// Environment variable holding the keystore password
pub const PASSWORD_ENV_VAR: &str = "DEPLOYER_KEYSTORE_PASSWORD";

/// Errors that can occur during key management operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid key format: {0}")]
    InvalidFormat(String),

    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Resolves the signer for a network
pub struct KeyManager {
    storage: Box<dyn KeyStorage>,
    config: KeysConfig,
}

impl KeyManager {
    /// Key manager over the encrypted keystore in `config.keystore_dir`
    pub fn new(config: KeysConfig) -> Result<Self, KeyError> {
        let keystore_dir = shellexpand::tilde(&config.keystore_dir.to_string_lossy()).to_string();
        let storage = Box::new(EncryptedKeystore::new(PathBuf::from(keystore_dir))?);

        Ok(Self { storage, config })
    }

    /// Key manager over any storage backend
    pub fn with_storage(config: KeysConfig, storage: Box<dyn KeyStorage>) -> Self {
        Self { storage, config }
    }

    /// Name of the environment variable holding the key for `network`
    pub fn env_var(&self, network: Network) -> String {
        format!("{}{}", self.config.env_prefix, network.env_suffix())
    }

    /// Load the signer for `network`
    ///
    /// The environment variable wins when allowed; otherwise the keystore
    /// entry named after the network is decrypted with the password from
    /// `password`, which is only invoked when needed.
    pub async fn load_key<F>(&self, network: Network, password: F) -> Result<SignerKey, KeyError>
    where
        F: FnOnce() -> Result<String, KeyError>,
    {
        if self.config.allow_env_keys {
            match self.load_from_env(network) {
                Ok(key) => {
                    debug!("Using signer {} from {}", key.address, self.env_var(network));
                    return Ok(key);
                }
                Err(KeyError::EnvVarNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let password = password()?;
        let key = self.storage.load_key(network.as_str(), &password).await?;
        debug!("Using signer {} from keystore", key.address);
        Ok(key)
    }

    pub async fn store_key(&self, name: &str, key: &SignerKey, password: &str) -> Result<(), KeyError> {
        key.validate()?;
        self.storage.store_key(name, key, password).await
    }

    pub async fn remove_key(&self, name: &str) -> Result<(), KeyError> {
        self.storage.remove_key(name).await
    }

    pub async fn list_keys(&self) -> Result<Vec<StoredKey>, KeyError> {
        self.storage.list_keys().await
    }

    pub async fn show_key(&self, name: &str, password: &str) -> Result<SignerKey, KeyError> {
        self.storage.load_key(name, password).await
    }

    fn load_from_env(&self, network: Network) -> Result<SignerKey, KeyError> {
        let env_var = self.env_var(network);

        let key_data = std::env::var(&env_var).map_err(|_| KeyError::EnvVarNotFound(env_var.clone()))?;

        SignerKey::from_env_string(&key_data)
    }
}

/// Keystore password from `DEPLOYER_KEYSTORE_PASSWORD`, else an interactive prompt
pub fn read_password(prompt: &str) -> Result<String, KeyError> {
    if let Ok(password) = std::env::var(PASSWORD_ENV_VAR) {
        return Ok(password);
    }

    rpassword::prompt_password(prompt).map_err(KeyError::Io)
}
