// secp256k1 signer keys for Axelar accounts
use super::KeyError;
use bech32::{ToBase32, Variant};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bech32 prefix of Axelar accounts
pub const ACCOUNT_PREFIX: &str = "axelar";

/// Account key used to sign deployment transactions
#[derive(Clone, Serialize, Deserialize)]
pub struct SignerKey {
    /// Bech32 account address (e.g. axelar1...)
    pub address: String,
    /// Private key bytes (32 bytes)
    pub private_key: Vec<u8>,
    /// Compressed public key bytes (33 bytes)
    pub public_key: Vec<u8>,
}

impl std::fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerKey")
            .field("address", &self.address)
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

impl SignerKey {
    /// Create a key from raw private key bytes; `address` must be the
    /// account the key controls
    pub fn from_private_key(address: &str, private_key: Vec<u8>) -> Result<Self, KeyError> {
        let (prefix, _, _) = bech32::decode(address)
            .map_err(|e| KeyError::InvalidFormat(format!("'{}' is not a bech32 address: {}", address, e)))?;

        let key = Self::with_prefix(&prefix, private_key)?;
        if !key.address.eq_ignore_ascii_case(address) {
            return Err(KeyError::InvalidFormat(format!(
                "address {} is not controlled by this key, which signs for {}",
                address, key.address
            )));
        }
        Ok(key)
    }

    /// Create a key for the account it controls under `prefix`
    pub fn with_prefix(prefix: &str, private_key: Vec<u8>) -> Result<Self, KeyError> {
        if private_key.len() != 32 {
            return Err(KeyError::InvalidFormat(
                "Private key must be 32 bytes".to_string(),
            ));
        }

        let public_key = Self::derive_public_key(&private_key)?;
        let address = derive_address(&public_key, prefix)?;

        Ok(Self {
            address,
            private_key,
            public_key,
        })
    }

    /// Parse `address:hexPrivateKey`, or a bare hex key for an `axelar1...` account
    pub fn from_env_string(env_str: &str) -> Result<Self, KeyError> {
        let (address, hex_key) = match env_str.trim().split_once(':') {
            Some((address, hex_key)) => (Some(address.trim()), hex_key),
            None => (None, env_str.trim()),
        };

        let private_key = hex::decode(hex_key.trim().trim_start_matches("0x"))
            .map_err(|e| KeyError::InvalidFormat(format!("Invalid hex key: {}", e)))?;

        match address {
            Some(address) => Self::from_private_key(address, private_key),
            None => Self::with_prefix(ACCOUNT_PREFIX, private_key),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    fn derive_public_key(private_key: &[u8]) -> Result<Vec<u8>, KeyError> {
        let secp = secp256k1::Secp256k1::new();
        let secret_key = secp256k1::SecretKey::from_slice(private_key)
            .map_err(|e| KeyError::Crypto(format!("Invalid private key: {}", e)))?;
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);

        Ok(public_key.serialize().to_vec())
    }

    /// Sign `sign_doc` bytes: ECDSA over SHA-256, 64-byte compact (r || s) encoding
    pub fn sign(&self, sign_doc: &[u8]) -> Result<Vec<u8>, KeyError> {
        let secp = secp256k1::Secp256k1::signing_only();
        let secret_key = secp256k1::SecretKey::from_slice(&self.private_key)
            .map_err(|e| KeyError::Crypto(format!("Invalid private key: {}", e)))?;

        let hash = Sha256::digest(sign_doc);
        let message = secp256k1::Message::from_digest_slice(&hash)
            .map_err(|e| KeyError::Crypto(format!("Invalid message hash: {}", e)))?;

        let signature = secp.sign_ecdsa(&message, &secret_key);
        Ok(signature.serialize_compact().to_vec())
    }

    /// Validate the key structure
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.private_key.len() != 32 {
            return Err(KeyError::InvalidFormat(
                "Private key must be 32 bytes".to_string(),
            ));
        }

        if self.public_key.len() != 33 {
            return Err(KeyError::InvalidFormat(
                "Public key must be 33 bytes (compressed)".to_string(),
            ));
        }

        let derived_pubkey = Self::derive_public_key(&self.private_key)?;
        if derived_pubkey != self.public_key {
            return Err(KeyError::InvalidFormat(
                "Public key does not match private key".to_string(),
            ));
        }

        let (prefix, _, _) = bech32::decode(&self.address)
            .map_err(|e| KeyError::InvalidFormat(format!("Invalid address: {}", e)))?;
        if derive_address(&self.public_key, &prefix)? != self.address.to_lowercase() {
            return Err(KeyError::InvalidFormat(
                "Address does not match public key".to_string(),
            ));
        }

        Ok(())
    }
}

/// Account address of a compressed public key: bech32(prefix, ripemd160(sha256(key)))
pub fn derive_address(public_key: &[u8], prefix: &str) -> Result<String, KeyError> {
    let hash = Ripemd160::digest(Sha256::digest(public_key));
    bech32::encode(prefix, hash.to_base32(), Variant::Bech32)
        .map_err(|e| KeyError::InvalidFormat(format!("Invalid address prefix '{}': {}", prefix, e)))
}

/// Check that `address` is valid bech32, optionally with the expected prefix
pub fn validate_address(address: &str, expected_prefix: Option<&str>) -> Result<(), String> {
    let (hrp, _data, _variant) =
        bech32::decode(address).map_err(|e| format!("'{}' is not a bech32 address: {}", address, e))?;

    if let Some(prefix) = expected_prefix {
        if hrp != prefix {
            return Err(format!(
                "'{}' has prefix '{}', expected '{}'",
                address, hrp, prefix
            ));
        }
    }

    Ok(())
}
