// Signer storage backends: password-sealed JSON files and an in-memory map
use super::{KeyError, SignerKey};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{password_hash::SaltString, Argon2, PasswordHasher};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SEALED_KEY_VERSION: u32 = 1;
const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Corrupted keystore entry {name}: {reason}")]
    Corrupted { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listing entry; the address is readable without the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredKey {
    pub name: String,
    pub address: String,
}

#[async_trait]
pub trait KeyStorage: Send + Sync {
    /// Unseal the signer stored under `name`
    async fn load_key(&self, name: &str, password: &str) -> Result<SignerKey, KeyError>;

    /// Seal `key` under `name`, replacing any previous entry
    async fn store_key(&self, name: &str, key: &SignerKey, password: &str) -> Result<(), KeyError>;

    async fn remove_key(&self, name: &str) -> Result<(), KeyError>;

    /// Stored entries ordered by name
    async fn list_keys(&self) -> Result<Vec<StoredKey>, KeyError>;
}

/// On-disk form of one signer: Argon2 salt, AES-256-GCM nonce and ciphertext
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedKey {
    version: u32,
    name: String,
    address: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

impl SealedKey {
    fn seal(name: &str, key: &SignerKey, password: &str) -> Result<Self, KeyError> {
        let plaintext = serde_json::to_vec(key).map_err(|e| KeyError::Serialization(e.to_string()))?;

        let salt = SaltString::generate(&mut OsRng);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher(password, salt.as_str())?
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| KeystoreError::Cipher(e.to_string()))?;

        Ok(Self {
            version: SEALED_KEY_VERSION,
            name: name.to_string(),
            address: key.address.clone(),
            salt: salt.to_string(),
            nonce: general_purpose::STANDARD.encode(nonce),
            ciphertext: general_purpose::STANDARD.encode(ciphertext),
        })
    }

    fn unseal(&self, password: &str) -> Result<SignerKey, KeyError> {
        if self.version != SEALED_KEY_VERSION {
            return Err(self.corrupted(format!("unsupported version {}", self.version)).into());
        }

        let nonce = general_purpose::STANDARD
            .decode(&self.nonce)
            .map_err(|e| self.corrupted(format!("nonce: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(self.corrupted(format!("nonce is {} bytes", nonce.len())).into());
        }
        let ciphertext = general_purpose::STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| self.corrupted(format!("ciphertext: {}", e)))?;

        let plaintext = cipher(password, &self.salt)?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| KeystoreError::InvalidPassword)?;

        let key: SignerKey = serde_json::from_slice(&plaintext)
            .map_err(|e| KeyError::Serialization(e.to_string()))?;
        if key.address != self.address {
            return Err(self.corrupted("sealed address does not match".to_string()).into());
        }
        key.validate()?;
        Ok(key)
    }

    fn corrupted(&self, reason: String) -> KeystoreError {
        KeystoreError::Corrupted {
            name: self.name.clone(),
            reason,
        }
    }
}

/// AES-256-GCM cipher keyed by the Argon2 hash of `password`
fn cipher(password: &str, salt: &str) -> Result<Aes256Gcm, KeystoreError> {
    let salt = SaltString::from_b64(salt).map_err(|e| KeystoreError::Cipher(format!("salt: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| KeystoreError::Cipher(format!("key derivation: {}", e)))?
        .hash
        .ok_or_else(|| KeystoreError::Cipher("key derivation produced no output".to_string()))?;

    let bytes = hash.as_bytes();
    if bytes.len() < 32 {
        return Err(KeystoreError::Cipher(format!("derived key is {} bytes", bytes.len())));
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes[..32])))
}

/// One `<name>.json` sealed key per signer under a directory
pub struct EncryptedKeystore {
    dir: PathBuf,
}

impl EncryptedKeystore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, KeystoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    async fn read_entry(&self, name: &str) -> Result<SealedKey, KeyError> {
        let data = match tokio::fs::read_to_string(self.entry_path(name)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&data).map_err(|e| {
            KeystoreError::Corrupted {
                name: name.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl KeyStorage for EncryptedKeystore {
    async fn load_key(&self, name: &str, password: &str) -> Result<SignerKey, KeyError> {
        self.read_entry(name).await?.unseal(password)
    }

    async fn store_key(&self, name: &str, key: &SignerKey, password: &str) -> Result<(), KeyError> {
        let sealed = SealedKey::seal(name, key, password)?;
        let data =
            serde_json::to_string_pretty(&sealed).map_err(|e| KeyError::Serialization(e.to_string()))?;

        tokio::fs::write(self.entry_path(name), data).await?;
        Ok(())
    }

    async fn remove_key(&self, name: &str) -> Result<(), KeyError> {
        match tokio::fs::remove_file(self.entry_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(KeyError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<StoredKey>, KeyError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".json")) {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            let sealed = self.read_entry(&name).await?;
            keys.push(StoredKey {
                name,
                address: sealed.address,
            });
        }
        Ok(keys)
    }
}

/// Keys held in memory, for tests and embedding
#[derive(Default)]
pub struct MemoryKeyStorage {
    keys: Mutex<BTreeMap<String, (SignerKey, String)>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, (SignerKey, String)>>, KeyError> {
        self.keys
            .lock()
            .map_err(|_| KeyError::Crypto("key storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyStorage for MemoryKeyStorage {
    async fn load_key(&self, name: &str, password: &str) -> Result<SignerKey, KeyError> {
        let entries = self.entries()?;
        match entries.get(name) {
            Some((key, expected)) if expected == password => Ok(key.clone()),
            Some(_) => Err(KeystoreError::InvalidPassword.into()),
            None => Err(KeyError::NotFound(name.to_string())),
        }
    }

    async fn store_key(&self, name: &str, key: &SignerKey, password: &str) -> Result<(), KeyError> {
        self.entries()?
            .insert(name.to_string(), (key.clone(), password.to_string()));
        Ok(())
    }

    async fn remove_key(&self, name: &str) -> Result<(), KeyError> {
        self.entries()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KeyError::NotFound(name.to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<StoredKey>, KeyError> {
        Ok(self
            .entries()?
            .iter()
            .map(|(name, (key, _))| StoredKey {
                name: name.clone(),
                address: key.address.clone(),
            })
            .collect())
    }
}
