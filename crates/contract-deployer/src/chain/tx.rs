// Transaction assembly and SIGN_MODE_DIRECT signing

use cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey;
use cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{
    mode_info, AuthInfo, Fee, ModeInfo, SignDoc, SignerInfo, TxBody, TxRaw,
};
use prost::Message;
use prost_types::Any;

use super::{AccountInfo, TxFee};
use crate::keystore::{KeyError, SignerKey};

const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// Everything needed to sign for one account on one chain
pub struct TxSigner<'a> {
    pub chain_id: &'a str,
    pub key: &'a SignerKey,
    pub account: AccountInfo,
}

impl<'a> TxSigner<'a> {
    pub fn new(chain_id: &'a str, key: &'a SignerKey, account: AccountInfo) -> Self {
        Self { chain_id, key, account }
    }

    /// Build and sign a transaction carrying `messages`, returning the encoded TxRaw
    pub fn sign(&self, messages: Vec<Any>, memo: &str, fee: &TxFee) -> Result<Vec<u8>, KeyError> {
        let body = TxBody {
            messages,
            memo: memo.to_string(),
            timeout_height: 0,
            extension_options: vec![],
            non_critical_extension_options: vec![],
        };

        let auth_info = self.auth_info(fee);

        let body_bytes = body.encode_to_vec();
        let auth_info_bytes = auth_info.encode_to_vec();

        let sign_doc = SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: self.chain_id.to_string(),
            account_number: self.account.account_number,
        };

        let signature = self.key.sign(&sign_doc.encode_to_vec())?;

        let tx = TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };

        Ok(tx.encode_to_vec())
    }

    fn auth_info(&self, fee: &TxFee) -> AuthInfo {
        let public_key = PubKey {
            key: self.key.public_key.clone(),
        };

        let signer_info = SignerInfo {
            public_key: Some(Any {
                type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
                value: public_key.encode_to_vec(),
            }),
            mode_info: Some(ModeInfo {
                sum: Some(mode_info::Sum::Single(mode_info::Single {
                    mode: SignMode::Direct as i32,
                })),
            }),
            sequence: self.account.sequence,
        };

        AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(Fee {
                amount: vec![fee.amount.to_proto()],
                gas_limit: fee.gas_limit,
                payer: String::new(),
                granter: String::new(),
            }),
            tip: None,
        }
    }
}
