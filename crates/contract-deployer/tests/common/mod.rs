// Shared harness: a devnet environment wired to mock LCD and release servers
#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use bech32::{ToBase32, Variant};
use cosmos_sdk_proto::cosmos::tx::v1beta1::{TxBody, TxRaw};
use prost::Message;
use prost_types::Any;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use contract_deployer::cli::{CodeIdArgs, ProposalArgs};
use contract_deployer::commands::Session;
use contract_deployer::config::{
    ArtifactConfig, DeployerConfig, EnvironmentsConfig, KeysConfig, NetworkConfig, SubmitConfig,
};
use contract_deployer::{Checksum, Environment, Interrupt, Network, SignerKey};

pub const SIGNER_PRIVATE_KEY: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
pub const TX_HASH: &str = "9F86D081884C7D659A2FEAA0C55AD015A3BF4F1B2B0B822CD15D6C15B0F00A08";

pub fn address(seed: u8) -> String {
    bech32::encode("axelar", vec![seed; 20].to_base32(), Variant::Bech32).unwrap()
}

pub fn contract_address(seed: u8) -> String {
    bech32::encode("axelar", vec![seed; 32].to_base32(), Variant::Bech32).unwrap()
}

/// The account `SIGNER_PRIVATE_KEY` controls
pub fn signer_address() -> String {
    SignerKey::from_env_string(SIGNER_PRIVATE_KEY).unwrap().address
}

pub fn governance_address() -> String {
    address(0x60)
}

pub fn multisig_address() -> String {
    contract_address(0x11)
}

pub fn environment_json(lcd: &str) -> Value {
    json!({
        "axelar": {
            "chainId": "devnet-amplifier",
            "lcd": lcd,
            "gasPrice": "0.007uamplifier",
            "gasAdjustment": 1.5,
            "addressPrefix": "axelar",
            "governanceAddress": governance_address(),
            "govProposalDepositAmount": "100000000",
            "contracts": {
                "Multisig": {
                    "address": multisig_address(),
                    "codeId": 12,
                    "storedCodes": [
                        { "codeId": 12, "version": "1.0.0" },
                        { "codeId": 31, "version": "2.0.0" }
                    ]
                },
                "Coordinator": { "codeId": 7 },
                "Rewards": {}
            }
        }
    })
}

/// Settings pointing at the mock servers, with fast retries
pub fn test_config(dir: &Path, releases: &str, key_prefix: &str) -> DeployerConfig {
    DeployerConfig {
        artifacts: ArtifactConfig {
            release_base_url: releases.to_string(),
            artifact_dir: dir.join("artifacts"),
            manifest_name: "checksums.txt".to_string(),
        },
        environments: EnvironmentsConfig {
            dir: dir.join("info"),
        },
        network: NetworkConfig {
            request_timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        submit: SubmitConfig {
            wait_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            confirm_mainnet: true,
        },
        keys: KeysConfig {
            keystore_dir: dir.join("keys"),
            env_prefix: key_prefix.to_string(),
            allow_env_keys: true,
        },
    }
}

pub struct TestDeployer {
    pub session: Session,
    pub lcd: MockServer,
    pub releases: MockServer,
    pub dir: TempDir,
}

impl TestDeployer {
    /// `name` keeps the signer environment variable unique per test
    pub async fn start(name: &str) -> Self {
        let lcd = MockServer::start().await;
        let releases = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        std::fs::create_dir_all(dir.path().join("info")).unwrap();
        std::fs::write(
            Environment::file_path(&dir.path().join("info"), Network::DevnetAmplifier),
            environment_json(&lcd.uri()).to_string(),
        )
        .unwrap();

        let prefix = format!("DEPLOYER_TEST_{}_", name.to_uppercase());
        std::env::set_var(
            format!("{}DEVNET_AMPLIFIER", prefix),
            format!("{}:{}", signer_address(), SIGNER_PRIVATE_KEY),
        );

        let config = test_config(dir.path(), &releases.uri(), &prefix);
        let session = Session::open(config, Network::DevnetAmplifier, Interrupt::new()).unwrap();

        Self {
            session,
            lcd,
            releases,
            dir,
        }
    }

    /// Serve `wasm` and `manifest` as the release of `slug` at `version`
    pub async fn publish(&self, slug: &str, version: &str, wasm: &[u8], manifest: &str) {
        let file = format!("{}.wasm", slug.replace('-', "_"));

        Mock::given(method("GET"))
            .and(path(format!("/{}/{}/{}", slug, version, file)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(wasm.to_vec()))
            .mount(&self.releases)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{}/{}/checksums.txt", slug, version)))
            .respond_with(ResponseTemplate::new(200).set_body_string(manifest.to_string()))
            .mount(&self.releases)
            .await;
    }

    pub async fn mount_account(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/cosmos/auth/v1beta1/accounts/axelar1[0-9a-z]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "account": {
                    "@type": "/cosmos.auth.v1beta1.BaseAccount",
                    "address": signer_address(),
                    "account_number": "7",
                    "sequence": "3"
                }
            })))
            .mount(&self.lcd)
            .await;
    }

    pub async fn mount_min_deposit(&self, amount: &str) {
        Mock::given(method("GET"))
            .and(path("/cosmos/gov/v1/params/deposit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "params": {
                    "min_deposit": [{ "denom": "uamplifier", "amount": amount }],
                    "max_deposit_period": "172800s"
                }
            })))
            .mount(&self.lcd)
            .await;
    }

    pub async fn mount_simulate(&self, gas_used: u64) {
        Mock::given(method("POST"))
            .and(path("/cosmos/tx/v1beta1/simulate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "gas_info": { "gas_wanted": "0", "gas_used": gas_used.to_string() }
            })))
            .mount(&self.lcd)
            .await;
    }

    /// Broadcast accepting the transaction; fails verification unless called exactly `times`
    pub async fn mount_broadcast(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/cosmos/tx/v1beta1/txs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tx_response": { "txhash": TX_HASH, "code": 0, "raw_log": "" }
            })))
            .expect(times)
            .mount(&self.lcd)
            .await;
    }

    pub async fn mount_included_tx(&self, events: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/cosmos/tx/v1beta1/txs/{}", TX_HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tx_response": {
                    "txhash": TX_HASH,
                    "height": "1234",
                    "code": 0,
                    "raw_log": "",
                    "events": events
                }
            })))
            .mount(&self.lcd)
            .await;
    }

    /// Raw storage answer for every contract
    pub async fn mount_contract_info(&self, contract: &str, version: &str) {
        let stored = json!({ "contract": contract, "version": version }).to_string();
        Mock::given(method("GET"))
            .and(path_regex(r"^/cosmwasm/wasm/v1/contract/axelar1[0-9a-z]+/raw/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": general_purpose::STANDARD.encode(stored)
            })))
            .mount(&self.lcd)
            .await;
    }

    /// Body of the transaction sent to the broadcast endpoint
    pub async fn broadcast_body(&self) -> TxBody {
        let requests = self.lcd.received_requests().await.unwrap_or_default();
        let broadcast = requests
            .iter()
            .find(|request| request.method.to_string() == "POST" && request.url.path() == "/cosmos/tx/v1beta1/txs")
            .expect("a broadcast request");

        let body: Value = serde_json::from_slice(&broadcast.body).unwrap();
        let tx_bytes = general_purpose::STANDARD
            .decode(body["tx_bytes"].as_str().unwrap())
            .unwrap();
        let raw = TxRaw::decode(tx_bytes.as_slice()).unwrap();
        TxBody::decode(raw.body_bytes.as_slice()).unwrap()
    }

    pub async fn broadcast_messages(&self) -> Vec<Any> {
        self.broadcast_body().await.messages
    }

    pub async fn requests_to(&self, endpoint: &str) -> usize {
        self.lcd
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == endpoint)
            .count()
    }
}

/// `sha256sum`-style manifest line for `wasm` under `file`
pub fn manifest_line(wasm: &[u8], file: &str) -> String {
    format!("{}  {}\n", Checksum::of_bytes(wasm), file)
}

pub fn proposal_args(contract: &str, title: &str) -> ProposalArgs {
    ProposalArgs {
        contract: contract.to_string(),
        title: title.to_string(),
        description: format!("{} on devnet", title),
        governance: false,
        run_as: None,
        deposit: None,
        wait: false,
        dry_run: false,
        yes: false,
    }
}

pub fn latest_code() -> CodeIdArgs {
    CodeIdArgs {
        fetch_code_id: true,
        code_id: None,
    }
}
