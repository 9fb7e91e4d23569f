// Proposal construction
// Pure: the same request against the same environment always encodes to the same bytes

use cosmos_sdk_proto::cosmos::gov::v1::MsgSubmitProposal;
use cosmos_sdk_proto::cosmwasm::wasm::v1::{
    AccessConfig, AccessType, MsgInstantiateContract, MsgMigrateContract, MsgStoreCode,
};
use prost::Message;
use prost_types::Any;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::artifact::contract_slug;
use crate::chain::Coin;
use crate::environment::Environment;
use crate::error::ErrorKind;
use crate::keystore::validate_address;

pub mod version;

pub use version::version_from_title;

const MSG_STORE_CODE: &str = "/cosmwasm.wasm.v1.MsgStoreCode";
const MSG_INSTANTIATE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
const MSG_MIGRATE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgMigrateContract";
const MSG_SUBMIT_PROPOSAL: &str = "/cosmos.gov.v1.MsgSubmitProposal";

/// Who authorizes the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    /// Wrapped in a governance proposal carrying `deposit`
    Governance { deposit: Coin },
    /// Sent directly by a privileged account
    RunAs { account: String },
}

/// Where a code id comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeIdRef {
    Id(u64),
    /// Most recently stored code for the contract in the environment
    Latest,
}

/// Kind-specific part of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalKind {
    StoreCode {
        wasm: Vec<u8>,
        /// Empty means anyone may instantiate the code
        instantiate_addresses: Vec<String>,
    },
    Instantiate {
        code_id: CodeIdRef,
        label: Option<String>,
        admin: Option<String>,
    },
    Migrate {
        code_id: CodeIdRef,
        /// Overrides the address recorded in the environment
        address: Option<String>,
    },
}

impl ProposalKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProposalKind::StoreCode { .. } => "store-code",
            ProposalKind::Instantiate { .. } => "instantiate",
            ProposalKind::Migrate { .. } => "migrate",
        }
    }
}

/// A request to store, instantiate or migrate one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    /// Contract name as recorded in the environment, e.g. `Multisig`
    pub contract: String,
    pub title: String,
    pub description: String,
    /// Instantiate or migrate message; `None` or blank encodes as `{}`
    pub payload: Option<String>,
    /// Version tag recorded in the proposal metadata, or the memo of a run-as tx
    pub version: Option<String>,
    pub kind: ProposalKind,
    pub authority: Authority,
}

/// The message ready to be signed
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltProposal {
    pub kind: &'static str,
    /// The wasm message itself
    pub inner: Any,
    /// What goes into the transaction: the proposal wrapper or `inner`
    pub message: Any,
    /// Account that must sign the transaction, `None` for any proposer
    pub required_signer: Option<String>,
    pub code_id: Option<u64>,
    pub contract_address: Option<String>,
    pub version: Option<String>,
    /// Transaction memo; run-as messages carry the deployment record here
    pub memo: String,
}

impl BuiltProposal {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.message.encode_to_vec()
    }
}

impl fmt::Display for BuiltProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.inner.type_url)?;
        if let Some(code_id) = self.code_id {
            write!(f, " code id {}", code_id)?;
        }
        if let Some(address) = &self.contract_address {
            write!(f, " at {}", address)?;
        }
        Ok(())
    }
}

/// Parse the payload and re-serialize it canonically (sorted keys, no whitespace)
pub fn canonical_payload(payload: Option<&str>) -> Result<Vec<u8>, ErrorKind> {
    let payload = payload.map(str::trim).unwrap_or_default();
    if payload.is_empty() {
        return Ok(b"{}".to_vec());
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ErrorKind::InvalidPayload(format!("payload is not valid JSON: {}", e)))?;

    serde_json::to_vec(&sort_keys(value)).map_err(|e| ErrorKind::InvalidPayload(e.to_string()))
}

// object key order must not depend on serde_json's map feature
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(key, value)| (key, sort_keys(value))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Split a comma-separated address list, dropping blanks
pub fn parse_address_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds on-chain messages from requests against one environment
pub struct ProposalBuilder<'a> {
    env: &'a Environment,
}

impl<'a> ProposalBuilder<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    fn check_address(&self, what: &str, address: &str) -> Result<(), ErrorKind> {
        validate_address(address, Some(&self.env.axelar.address_prefix))
            .map_err(|e| ErrorKind::InvalidPayload(format!("{}: {}", what, e)))
    }

    fn resolve_code_id(&self, contract: &str, code_id: CodeIdRef) -> Result<u64, ErrorKind> {
        match code_id {
            CodeIdRef::Id(id) => Ok(id),
            CodeIdRef::Latest => self.env.latest_code_id(contract),
        }
    }

    /// The account the wasm message is sent from
    fn sender(&self, authority: &Authority) -> Result<String, ErrorKind> {
        match authority {
            Authority::Governance { .. } => {
                let governance = &self.env.axelar.governance_address;
                self.check_address("governance address", governance)?;
                Ok(governance.clone())
            }
            Authority::RunAs { account } => {
                self.check_address("run-as account", account)?;
                Ok(account.clone())
            }
        }
    }

    /// `{"contract", "version"}` for the contract being deployed
    fn deployment_record(&self, request: &ProposalRequest) -> Value {
        let mut record = json!({ "contract": contract_slug(&request.contract) });
        if let Some(version) = &request.version {
            record["version"] = json!(version);
        }
        record
    }

    /// gov v1 proposals carry title and summary in their metadata JSON
    fn metadata(&self, request: &ProposalRequest) -> String {
        let mut metadata = self.deployment_record(request);
        metadata["title"] = json!(request.title);
        metadata["summary"] = json!(request.description);
        sort_keys(metadata).to_string()
    }

    /// Construct the message for `request`; `proposer` signs governance proposals
    pub fn build(&self, request: &ProposalRequest, proposer: &str) -> Result<BuiltProposal, ErrorKind> {
        let sender = self.sender(&request.authority)?;
        let payload = canonical_payload(request.payload.as_deref())?;

        let mut code_id = None;
        let mut contract_address = None;

        let inner = match &request.kind {
            ProposalKind::StoreCode {
                wasm,
                instantiate_addresses,
            } => {
                if wasm.is_empty() {
                    return Err(ErrorKind::InvalidPayload("wasm binary is empty".to_string()));
                }
                for address in instantiate_addresses {
                    self.check_address("instantiate address", address)?;
                }

                let instantiate_permission = if instantiate_addresses.is_empty() {
                    None
                } else {
                    Some(AccessConfig {
                        permission: AccessType::AnyOfAddresses as i32,
                        addresses: instantiate_addresses.clone(),
                        ..Default::default()
                    })
                };

                let msg = MsgStoreCode {
                    sender,
                    wasm_byte_code: wasm.clone(),
                    instantiate_permission,
                };
                Any {
                    type_url: MSG_STORE_CODE.to_string(),
                    value: msg.encode_to_vec(),
                }
            }
            ProposalKind::Instantiate {
                code_id: code_ref,
                label,
                admin,
            } => {
                let id = self.resolve_code_id(&request.contract, *code_ref)?;
                let admin = match admin {
                    Some(admin) => admin.clone(),
                    None => sender.clone(),
                };
                self.check_address("admin", &admin)?;
                code_id = Some(id);

                let msg = MsgInstantiateContract {
                    sender,
                    admin,
                    code_id: id,
                    label: label.clone().unwrap_or_else(|| request.contract.clone()),
                    msg: payload,
                    funds: vec![],
                };
                Any {
                    type_url: MSG_INSTANTIATE_CONTRACT.to_string(),
                    value: msg.encode_to_vec(),
                }
            }
            ProposalKind::Migrate {
                code_id: code_ref,
                address,
            } => {
                let address = match address {
                    Some(address) => address.clone(),
                    None => self.env.contract_address(&request.contract)?,
                };
                self.check_address("contract address", &address)?;
                let id = self.resolve_code_id(&request.contract, *code_ref)?;
                code_id = Some(id);
                contract_address = Some(address.clone());

                let msg = MsgMigrateContract {
                    sender,
                    contract: address,
                    code_id: id,
                    msg: payload,
                };
                Any {
                    type_url: MSG_MIGRATE_CONTRACT.to_string(),
                    value: msg.encode_to_vec(),
                }
            }
        };

        let (message, required_signer, memo) = match &request.authority {
            Authority::Governance { deposit } => {
                if deposit.amount == 0 {
                    return Err(ErrorKind::InvalidPayload(
                        "governance proposals need a non-zero deposit".to_string(),
                    ));
                }

                let proposal = MsgSubmitProposal {
                    messages: vec![inner.clone()],
                    initial_deposit: vec![deposit.to_proto()],
                    proposer: proposer.to_string(),
                    metadata: self.metadata(request),
                };
                let message = Any {
                    type_url: MSG_SUBMIT_PROPOSAL.to_string(),
                    value: proposal.encode_to_vec(),
                };
                (message, None, String::new())
            }
            Authority::RunAs { account } => (
                inner.clone(),
                Some(account.clone()),
                sort_keys(self.deployment_record(request)).to_string(),
            ),
        };

        Ok(BuiltProposal {
            kind: request.kind.name(),
            inner,
            message,
            required_signer,
            code_id,
            contract_address,
            version: request.version.clone(),
            memo,
        })
    }
}
