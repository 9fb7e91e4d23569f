// Test helpers for keys and addresses

use super::SignerKey;
use bech32::{ToBase32, Variant};

pub const TEST_PRIVATE_KEY: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";

/// A valid bech32 address with the given prefix, derived from a seed byte
pub fn test_address(prefix: &str, seed: u8) -> String {
    bech32::encode(prefix, vec![seed; 20].to_base32(), Variant::Bech32)
        .expect("valid bech32 prefix")
}

/// A 32-byte contract address, the shape wasm contract addresses have
pub fn test_contract_address(seed: u8) -> String {
    bech32::encode("axelar", vec![seed; 32].to_base32(), Variant::Bech32)
        .expect("valid bech32 prefix")
}

/// The signing key for `TEST_PRIVATE_KEY` on its own axelar account
pub fn create_test_signer() -> SignerKey {
    SignerKey::from_env_string(TEST_PRIVATE_KEY).expect("valid test key")
}

pub fn test_signer_address() -> String {
    create_test_signer().address
}
