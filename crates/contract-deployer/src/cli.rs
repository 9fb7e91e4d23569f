// Command-line interface of the deployer
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::environment::Network;

#[derive(Parser, Debug)]
#[command(name = "deployer")]
#[command(about = "Store, instantiate and migrate CosmWasm contracts on Axelar networks")]
#[command(version)]
pub struct Cli {
    /// Network tier (devnet-amplifier, stagenet, testnet, mainnet)
    #[arg(short = 'e', long = "env", env = "DEPLOYER_ENV", global = true)]
    pub env: Option<Network>,

    /// Configuration file path
    #[arg(long, global = true, default_value = "config/deployer.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a verified contract binary
    StoreCode(StoreCodeArgs),
    /// Instantiate stored code
    Instantiate(InstantiateArgs),
    /// Migrate a deployed contract to stored code
    Migrate(MigrateArgs),
    /// Read contract state
    #[command(subcommand)]
    Query(QueryCommand),
    /// Resolve an artifact and check it against its manifest, nothing else
    VerifyArtifact(ArtifactArgs),
    /// Manage signer keys
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Print the effective settings as TOML
    Config {
        /// Write them to this file instead
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

/// Options shared by every proposal-producing command
#[derive(Args, Debug, Clone)]
pub struct ProposalArgs {
    /// Contract name as recorded in the environment, e.g. Multisig
    #[arg(short = 'c', long, alias = "contractName")]
    pub contract: String,

    /// Proposal title
    #[arg(short = 't', long)]
    pub title: String,

    /// Proposal description
    #[arg(short = 'd', long)]
    pub description: String,

    /// Submit through governance; this is also what happens without --run-as
    #[arg(long, conflicts_with = "run_as")]
    pub governance: bool,

    /// Send directly from this privileged account instead of governance
    #[arg(long, alias = "runAs")]
    pub run_as: Option<String>,

    /// Proposal deposit, e.g. 100000000 or 100000000uaxl
    #[arg(long, conflicts_with = "run_as")]
    pub deposit: Option<String>,

    /// Wait for the transaction to be included
    #[arg(long)]
    pub wait: bool,

    /// Simulate only, do not broadcast
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the mainnet confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// How the code id is chosen
#[derive(Args, Debug, Clone, Default)]
pub struct CodeIdArgs {
    /// Use the most recently stored code id of the contract
    #[arg(long, alias = "fetchCodeId", conflicts_with = "code_id")]
    pub fetch_code_id: bool,

    /// Explicit code id
    #[arg(long)]
    pub code_id: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct StoreCodeArgs {
    #[command(flatten)]
    pub proposal: ProposalArgs,

    /// Local wasm binary instead of the published release
    #[arg(short = 'a', long)]
    pub artifact: Option<PathBuf>,

    /// Release version; taken from the title when omitted
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Comma-separated addresses allowed to instantiate the code
    #[arg(long, alias = "instantiateAddresses")]
    pub instantiate_addresses: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct InstantiateArgs {
    #[command(flatten)]
    pub proposal: ProposalArgs,

    #[command(flatten)]
    pub code: CodeIdArgs,

    /// Instantiate message (JSON)
    #[arg(short = 'm', long)]
    pub msg: Option<String>,

    /// Contract label; defaults to the contract name
    #[arg(short = 'l', long)]
    pub label: Option<String>,

    /// Contract admin; defaults to the sender
    #[arg(long)]
    pub admin: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub proposal: ProposalArgs,

    #[command(flatten)]
    pub code: CodeIdArgs,

    /// Migrate message (JSON); `{}` is valid
    #[arg(short = 'm', long)]
    pub msg: String,

    /// Version the contract must report after migrating; taken from the title when omitted
    #[arg(short = 'v', long)]
    pub version: Option<String>,

    /// Contract address; defaults to the one in the environment
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ArtifactArgs {
    /// Contract name, e.g. Multisig
    #[arg(short = 'c', long, alias = "contractName")]
    pub contract: String,

    /// Release version
    #[arg(short = 'v', long, required_unless_present = "artifact")]
    pub version: Option<String>,

    /// Local wasm binary instead of the published release
    #[arg(short = 'a', long)]
    pub artifact: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Contract name and version a contract reports
    ContractInfo {
        #[arg(short = 'c', long, alias = "contractName")]
        contract: String,

        /// Fail unless the contract reports this version
        #[arg(long)]
        expect_version: Option<String>,

        /// Contract address; defaults to the one in the environment
        #[arg(long)]
        address: Option<String>,
    },
    /// Raw storage read
    Raw {
        #[arg(long, required_unless_present = "contract")]
        address: Option<String>,

        /// Use the address recorded for this contract
        #[arg(short = 'c', long, conflicts_with = "address")]
        contract: Option<String>,

        /// Storage key in hex
        #[arg(short = 'k', long)]
        key: String,
    },
    /// Smart query
    Smart {
        #[arg(long, required_unless_present = "contract")]
        address: Option<String>,

        /// Use the address recorded for this contract
        #[arg(short = 'c', long, conflicts_with = "address")]
        contract: Option<String>,

        /// Query message (JSON)
        #[arg(short = 'm', long)]
        msg: String,
    },
    /// On-chain code id whose checksum matches the verified artifact
    CodeId(ArtifactArgs),
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Add a signer key to the keystore
    Add {
        /// Key name; defaults to the selected network
        #[arg(long)]
        name: Option<String>,

        /// Expected signer address; checked against the key, derived when omitted
        #[arg(long)]
        address: Option<String>,

        /// Private key in hex; prompted for when omitted
        #[arg(long)]
        private_key: Option<String>,
    },
    /// List keystore entries
    List,
    /// Show the address and public key of an entry
    Show {
        name: Option<String>,
    },
    /// Remove an entry
    Remove {
        name: Option<String>,
    },
}
