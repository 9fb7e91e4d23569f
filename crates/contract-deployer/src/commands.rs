// Command handlers
// Each handler drives one contract through the resolve, checksum, build,
// submit and verify gates and returns a report printed as JSON on stdout

use anyhow::Context as _;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{checksum, ArtifactResolver, Checksum, ResolvedArtifact};
use crate::chain::{ChainClient, Coin, LcdClient};
use crate::cli::{
    ArtifactArgs, Cli, CodeIdArgs, Commands, InstantiateArgs, KeysCommand, MigrateArgs,
    ProposalArgs, QueryCommand, StoreCodeArgs,
};
use crate::config::DeployerConfig;
use crate::deployment::{Deployment, DeploymentStage};
use crate::environment::{Environment, Network};
use crate::error::{DeployError, ErrorKind, InContext, OpContext, Operation};
use crate::interrupt::Interrupt;
use crate::keystore::{read_password, KeyManager, SignerKey};
use crate::proposal::{
    parse_address_list, version_from_title, Authority, BuiltProposal, CodeIdRef, ProposalBuilder,
    ProposalKind, ProposalRequest,
};
use crate::submit::{SubmissionReceipt, SubmissionStatus, SubmitOptions, Submitter};
use crate::verify::{parse_hex_key, query_error, ContractInfo, QueryResult, StateVerifier};

/// How many recent uploads `query code-id` searches
const CODE_SEARCH_LIMIT: u32 = 100;

/// Outcome of a deployment command
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub contract: String,
    pub network: Network,
    pub stage: String,
    pub history: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<SubmissionReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_info: Option<ContractInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DeploymentReport {
    fn new(deployment: &Deployment, network: Network) -> Self {
        Self {
            contract: deployment.contract.clone(),
            network,
            stage: deployment.stage().to_string(),
            history: deployment.history().to_vec(),
            version: None,
            checksum: None,
            receipt: None,
            contract_info: None,
            notes: Vec::new(),
        }
    }
}

/// Everything a chain-facing command needs for one network
pub struct Session {
    pub config: DeployerConfig,
    pub env: Environment,
    pub client: Arc<dyn ChainClient>,
    pub keys: KeyManager,
    pub interrupt: Interrupt,
}

impl Session {
    /// Load the environment for `network` and connect to its LCD endpoint
    pub fn open(config: DeployerConfig, network: Network, interrupt: Interrupt) -> Result<Self, ErrorKind> {
        let env = Environment::load(&config.environments.dir, network)?;
        let client = LcdClient::new(&env.axelar.lcd, config.read_retry_policy())
            .map_err(|e| ErrorKind::Environment(format!("LCD endpoint {}: {}", env.axelar.lcd, e)))?;
        let keys = KeyManager::new(config.keys.clone()).map_err(|e| ErrorKind::Signer(e.to_string()))?;

        info!("Using {} at {}", network, env.axelar.lcd);

        Ok(Self {
            config,
            env,
            client: Arc::new(client),
            keys,
            interrupt,
        })
    }

    pub fn network(&self) -> Network {
        self.env.network
    }

    async fn signer(&self) -> Result<SignerKey, ErrorKind> {
        let network = self.network();
        self.keys
            .load_key(network, || read_password(&format!("Keystore password for {}: ", network)))
            .await
            .map_err(|e| ErrorKind::Signer(e.to_string()))
    }

    fn authority(&self, args: &ProposalArgs) -> Result<Authority, ErrorKind> {
        if let Some(account) = &args.run_as {
            if args.governance {
                return Err(ErrorKind::InvalidPayload(
                    "--governance and --run-as are mutually exclusive".to_string(),
                ));
            }
            if self.network() == Network::Mainnet {
                return Err(ErrorKind::InvalidPayload(
                    "run-as is not available on mainnet, submit through governance".to_string(),
                ));
            }
            return Ok(Authority::RunAs {
                account: account.clone(),
            });
        }

        let denom = self.env.fee_denom()?;
        let amount = args
            .deposit
            .as_deref()
            .or(self.env.axelar.gov_proposal_deposit_amount.as_deref())
            .ok_or_else(|| {
                ErrorKind::InvalidPayload(
                    "no --deposit given and no govProposalDepositAmount in the environment".to_string(),
                )
            })?;
        let deposit = Coin::parse(amount, &denom).map_err(ErrorKind::InvalidPayload)?;

        Ok(Authority::Governance { deposit })
    }

    fn submit_options(&self, args: &ProposalArgs) -> SubmitOptions {
        SubmitOptions {
            dry_run: args.dry_run,
            wait: args.wait,
            wait_timeout: self.config.submit.wait_timeout,
            poll_interval: self.config.submit.poll_interval,
        }
    }

    /// Ask before touching mainnet
    fn confirm(&self, args: &ProposalArgs, built: &BuiltProposal) -> Result<(), ErrorKind> {
        if self.network() != Network::Mainnet
            || args.yes
            || args.dry_run
            || !self.config.submit.confirm_mainnet
        {
            return Ok(());
        }

        eprint!("Submit {} for {} to mainnet? [y/N] ", built, args.contract);
        io::stderr()
            .flush()
            .map_err(|e| ErrorKind::Environment(e.to_string()))?;

        let mut answer = String::new();
        io::stdin()
            .read_line(&mut answer)
            .map_err(|e| ErrorKind::Environment(e.to_string()))?;

        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => Ok(()),
            _ => Err(ErrorKind::Interrupted),
        }
    }

    /// Sign, build and submit `request`
    async fn propose(
        &self,
        ctx: &OpContext,
        args: &ProposalArgs,
        request: &ProposalRequest,
    ) -> Result<(BuiltProposal, SubmissionReceipt), DeployError> {
        let signer = self.signer().await.in_context(ctx)?;
        let built = ProposalBuilder::new(&self.env)
            .build(request, &signer.address)
            .in_context(ctx)?;
        info!("Built {} for {}", built, request.contract);

        self.confirm(args, &built).in_context(ctx)?;

        let submitter = Submitter::new(self.client.clone(), &self.env).in_context(ctx)?;
        let receipt = submitter
            .submit(
                &request.contract,
                &built,
                &request.authority,
                &signer,
                &self.interrupt,
                &self.submit_options(args),
            )
            .await
            .in_context(ctx)?;

        Ok((built, receipt))
    }
}

/// Code id from the command line, the latest upload or the recorded `codeId`
pub fn resolve_code_id(env: &Environment, contract: &str, args: &CodeIdArgs) -> Result<u64, ErrorKind> {
    if let Some(code_id) = args.code_id {
        return Ok(code_id);
    }

    if args.fetch_code_id {
        let code_id = env.latest_code_id(contract)?;
        info!("Fetched code id {} for {}", code_id, contract);
        return Ok(code_id);
    }

    env.contract(contract)
        .and_then(|(_, entry)| entry.code_id)
        .ok_or_else(|| {
            ErrorKind::MissingAddress(format!(
                "no codeId recorded for {}, pass --code-id or --fetch-code-id",
                contract
            ))
        })
}

/// Resolve the artifact and pass it through the checksum gate
async fn verified_artifact(
    config: &DeployerConfig,
    ctx: &OpContext,
    artifact: Option<&Path>,
    version: Option<&str>,
) -> Result<(Deployment, ResolvedArtifact, Checksum), DeployError> {
    let resolver = ArtifactResolver::new(&config.artifacts, config.read_retry_policy()).in_context(ctx)?;

    let resolved = match artifact {
        Some(path) => resolver.resolve_local(path, &ctx.contract, version).await,
        None => match version {
            Some(version) => resolver.resolve(&ctx.contract, version).await,
            None => Err(ErrorKind::InvalidPayload(
                "a --version (or a version in the title) is needed to download the release".to_string(),
            )),
        },
    }
    .in_context(ctx)?;

    let mut deployment = Deployment::resolved(&ctx.contract);
    let ctx = ctx.with_operation(Operation::VerifyChecksum);

    let checksum = match checksum::verify(&resolved.binary, &resolved.manifest).await {
        Ok(checksum) => checksum,
        Err(kind) => {
            deployment.fail(kind.to_string());
            return Err(ctx.wrap(kind));
        }
    };
    info!("{} checksum {} verified", resolved.binary.display(), checksum);

    deployment
        .advance(DeploymentStage::ChecksumVerified {
            checksum: checksum.clone(),
        })
        .map_err(|e| ctx.wrap(e.into()))?;

    Ok((deployment, resolved, checksum))
}

pub async fn verify_artifact(
    config: &DeployerConfig,
    network: Network,
    args: &ArtifactArgs,
) -> Result<DeploymentReport, DeployError> {
    let ctx = OpContext::new(&args.contract, network, Operation::ResolveArtifact);
    let (deployment, _, checksum) =
        verified_artifact(config, &ctx, args.artifact.as_deref(), args.version.as_deref()).await?;

    let mut report = DeploymentReport::new(&deployment, network);
    report.version = args.version.clone();
    report.checksum = Some(checksum);
    Ok(report)
}

pub async fn store_code(session: &Session, args: &StoreCodeArgs) -> Result<DeploymentReport, DeployError> {
    let proposal = &args.proposal;
    let ctx = OpContext::new(&proposal.contract, session.network(), Operation::ResolveArtifact);
    let version = args
        .version
        .clone()
        .or_else(|| version_from_title(&proposal.title));

    let (mut deployment, resolved, checksum) =
        verified_artifact(&session.config, &ctx, args.artifact.as_deref(), version.as_deref()).await?;

    let ctx = ctx.with_operation(Operation::StoreCode);
    let wasm = tokio::fs::read(&resolved.binary).await.map_err(|e| {
        ctx.wrap(ErrorKind::FetchError {
            url: resolved.binary.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    let request = ProposalRequest {
        contract: proposal.contract.clone(),
        title: proposal.title.clone(),
        description: proposal.description.clone(),
        payload: None,
        version: version.clone(),
        kind: ProposalKind::StoreCode {
            wasm,
            instantiate_addresses: args
                .instantiate_addresses
                .as_deref()
                .map(parse_address_list)
                .unwrap_or_default(),
        },
        authority: session.authority(proposal).in_context(&ctx)?,
    };

    let (_, receipt) = session
        .propose(&ctx, proposal, &request)
        .await
        .map_err(|e| {
            deployment.fail(e.kind.to_string());
            e
        })?;

    let mut notes = Vec::new();
    if receipt.status != SubmissionStatus::Simulated {
        deployment
            .advance(DeploymentStage::Stored {
                code_id: receipt.code_id,
            })
            .map_err(|e| ctx.wrap(e.into()))?;

        match (receipt.proposal_id, receipt.code_id) {
            (Some(id), _) => notes.push(format!(
                "proposal {} submitted, the code id is assigned once it passes",
                id
            )),
            (None, Some(code_id)) => notes.push(format!("stored as code id {}", code_id)),
            (None, None) => {}
        }
    }

    let mut report = DeploymentReport::new(&deployment, session.network());
    report.version = version;
    report.checksum = Some(checksum);
    report.receipt = Some(receipt);
    report.notes = notes;
    Ok(report)
}

pub async fn instantiate(session: &Session, args: &InstantiateArgs) -> Result<DeploymentReport, DeployError> {
    let proposal = &args.proposal;
    let ctx = OpContext::new(&proposal.contract, session.network(), Operation::ResolveCodeId);
    let code_id = resolve_code_id(&session.env, &proposal.contract, &args.code).in_context(&ctx)?;
    let mut deployment = Deployment::from_stored(&proposal.contract, code_id);

    let ctx = ctx.with_operation(Operation::Instantiate);
    let request = ProposalRequest {
        contract: proposal.contract.clone(),
        title: proposal.title.clone(),
        description: proposal.description.clone(),
        payload: args.msg.clone(),
        version: None,
        kind: ProposalKind::Instantiate {
            code_id: CodeIdRef::Id(code_id),
            label: args.label.clone(),
            admin: args.admin.clone(),
        },
        authority: session.authority(proposal).in_context(&ctx)?,
    };

    let (_, receipt) = session
        .propose(&ctx, proposal, &request)
        .await
        .map_err(|e| {
            deployment.fail(e.kind.to_string());
            e
        })?;

    let mut notes = Vec::new();
    if receipt.status != SubmissionStatus::Simulated {
        deployment
            .advance(DeploymentStage::Instantiated {
                address: receipt.contract_address.clone(),
            })
            .map_err(|e| ctx.wrap(e.into()))?;

        match (&receipt.contract_address, receipt.proposal_id) {
            (Some(address), _) => notes.push(format!(
                "instantiated at {}, record it in {}",
                address,
                session.env.path.display()
            )),
            (None, Some(id)) => notes.push(format!(
                "proposal {} submitted, the contract is instantiated once it passes",
                id
            )),
            (None, None) => {}
        }
    }

    let mut report = DeploymentReport::new(&deployment, session.network());
    report.receipt = Some(receipt);
    report.notes = notes;
    Ok(report)
}

pub async fn migrate(session: &Session, args: &MigrateArgs) -> Result<DeploymentReport, DeployError> {
    let proposal = &args.proposal;
    let ctx = OpContext::new(&proposal.contract, session.network(), Operation::ResolveCodeId);
    let code_id = resolve_code_id(&session.env, &proposal.contract, &args.code).in_context(&ctx)?;
    let mut deployment = Deployment::from_stored(&proposal.contract, code_id);
    let version = args
        .version
        .clone()
        .or_else(|| version_from_title(&proposal.title));

    let ctx = ctx.with_operation(Operation::Migrate);
    let request = ProposalRequest {
        contract: proposal.contract.clone(),
        title: proposal.title.clone(),
        description: proposal.description.clone(),
        payload: Some(args.msg.clone()),
        version: version.clone(),
        kind: ProposalKind::Migrate {
            code_id: CodeIdRef::Id(code_id),
            address: args.address.clone(),
        },
        authority: session.authority(proposal).in_context(&ctx)?,
    };

    let (built, receipt) = session
        .propose(&ctx, proposal, &request)
        .await
        .map_err(|e| {
            deployment.fail(e.kind.to_string());
            e
        })?;

    let mut report = DeploymentReport::new(&deployment, session.network());
    report.version = version.clone();

    if receipt.status == SubmissionStatus::Simulated {
        report.receipt = Some(receipt);
        return Ok(report);
    }

    deployment
        .advance(DeploymentStage::MigrationSubmitted { code_id })
        .map_err(|e| ctx.wrap(e.into()))?;

    let address = built.contract_address.clone().unwrap_or_default();
    let mut notes = Vec::new();

    match (&request.authority, receipt.status, &version) {
        (Authority::RunAs { .. }, SubmissionStatus::Included, Some(version)) => {
            let verifier = StateVerifier::new(session.client.clone());
            match verifier.expect_version(&address, version).await {
                Ok(info) => {
                    deployment
                        .advance(DeploymentStage::Verified)
                        .map_err(|e| ctx.wrap(e.into()))?;
                    report.contract_info = Some(info);
                }
                Err(kind) => {
                    // the migration itself went through, only the check failed
                    warn!(
                        "Migration tx {} was included but verification failed",
                        receipt.tx_hash.as_deref().unwrap_or_default()
                    );
                    deployment.fail(kind.to_string());
                    return Err(ctx.with_operation(Operation::Query).wrap(kind));
                }
            }
        }
        (_, _, Some(version)) => notes.push(format!(
            "once the migration executes, check it with `deployer query contract-info -c {} --expect-version {}`",
            proposal.contract, version
        )),
        (_, _, None) => {}
    }

    if let Some(id) = receipt.proposal_id {
        notes.push(format!("proposal {} submitted", id));
    }

    report.stage = deployment.stage().to_string();
    report.history = deployment.history().to_vec();
    report.receipt = Some(receipt);
    report.notes = notes;
    Ok(report)
}

fn target_address(
    env: &Environment,
    address: Option<&str>,
    contract: Option<&str>,
) -> Result<String, ErrorKind> {
    match (address, contract) {
        (Some(address), _) => Ok(address.to_string()),
        (None, Some(contract)) => env.contract_address(contract),
        (None, None) => Err(ErrorKind::MissingAddress(
            "pass --address or --contract".to_string(),
        )),
    }
}

/// JSON shape printed for raw and smart query results
pub fn query_output(result: &QueryResult) -> Value {
    match (&result.json, &result.text) {
        (Some(json), _) => json.clone(),
        (None, Some(text)) => json!({ "text": text }),
        (None, None) => json!({ "hex": hex::encode(&result.bytes) }),
    }
}

pub async fn query_contract_info(
    session: &Session,
    contract: &str,
    address: Option<&str>,
    expect_version: Option<&str>,
) -> Result<ContractInfo, DeployError> {
    let ctx = OpContext::new(contract, session.network(), Operation::Query);
    let address = target_address(&session.env, address, Some(contract)).in_context(&ctx)?;
    let verifier = StateVerifier::new(session.client.clone());

    match expect_version {
        Some(version) => verifier.expect_version(&address, version).await,
        None => verifier.contract_info(&address).await,
    }
    .in_context(&ctx)
}

/// On-chain code id of the verified artifact
pub async fn query_code_id(session: &Session, args: &ArtifactArgs) -> Result<Value, DeployError> {
    let ctx = OpContext::new(&args.contract, session.network(), Operation::ResolveArtifact);
    let (_, _, checksum) =
        verified_artifact(&session.config, &ctx, args.artifact.as_deref(), args.version.as_deref()).await?;

    let ctx = ctx.with_operation(Operation::ResolveCodeId);
    let codes = session
        .client
        .recent_codes(CODE_SEARCH_LIMIT)
        .await
        .map_err(query_error)
        .in_context(&ctx)?;

    let code = codes
        .iter()
        .find(|code| code.checksum == checksum.as_str())
        .ok_or_else(|| {
            ctx.wrap(ErrorKind::QueryError(format!(
                "no code with checksum {} among the latest {} uploads",
                checksum, CODE_SEARCH_LIMIT
            )))
        })?;

    if let Some(recorded) = session.env.stored_code(&args.contract, code.code_id) {
        info!("Code id {} is recorded in the environment ({:?})", code.code_id, recorded.version);
    }

    Ok(json!({
        "contract": args.contract,
        "codeId": code.code_id,
        "checksum": checksum,
    }))
}

async fn query(session: &Session, command: QueryCommand) -> anyhow::Result<()> {
    match command {
        QueryCommand::ContractInfo {
            contract,
            expect_version,
            address,
        } => {
            let info =
                query_contract_info(session, &contract, address.as_deref(), expect_version.as_deref()).await?;
            print_json(&info)
        }
        QueryCommand::Raw {
            address,
            contract,
            key,
        } => {
            let ctx = OpContext::new(
                contract.as_deref().unwrap_or("-"),
                session.network(),
                Operation::Query,
            );
            let address = target_address(&session.env, address.as_deref(), contract.as_deref()).in_context(&ctx)?;
            let key = parse_hex_key(&key).in_context(&ctx)?;
            let result = StateVerifier::new(session.client.clone())
                .query_raw(&address, &key)
                .await
                .in_context(&ctx)?;
            print_json(&query_output(&result))
        }
        QueryCommand::Smart {
            address,
            contract,
            msg,
        } => {
            let ctx = OpContext::new(
                contract.as_deref().unwrap_or("-"),
                session.network(),
                Operation::Query,
            );
            let address = target_address(&session.env, address.as_deref(), contract.as_deref()).in_context(&ctx)?;
            let result = StateVerifier::new(session.client.clone())
                .query_smart(&address, &msg)
                .await
                .in_context(&ctx)?;
            print_json(&query_output(&result))
        }
        QueryCommand::CodeId(args) => print_json(&query_code_id(session, &args).await?),
    }
}

fn key_name(name: Option<String>, network: Option<Network>) -> anyhow::Result<String> {
    name.or_else(|| network.map(|network| network.to_string()))
        .context("pass a key name or select a network with --env")
}

async fn keys(config: &DeployerConfig, network: Option<Network>, command: KeysCommand) -> anyhow::Result<()> {
    let manager = KeyManager::new(config.keys.clone())?;

    match command {
        KeysCommand::Add {
            name,
            address,
            private_key,
        } => {
            let name = key_name(name, network)?;
            let private_key = match private_key {
                Some(key) => key,
                None => rpassword::prompt_password("Private key (hex): ")?,
            };
            let key = match address {
                Some(address) => SignerKey::from_env_string(&format!("{}:{}", address, private_key.trim()))?,
                None => SignerKey::from_env_string(&private_key)?,
            };
            let password = read_password("New keystore password: ")?;

            manager.store_key(&name, &key, &password).await?;
            info!("Stored key {} for {}", name, key.address);
            print_json(&json!({ "name": name, "address": key.address }))
        }
        KeysCommand::List => print_json(&manager.list_keys().await?),
        KeysCommand::Show { name } => {
            let name = key_name(name, network)?;
            let password = read_password(&format!("Keystore password for {}: ", name))?;
            let key = manager.show_key(&name, &password).await?;
            print_json(&json!({
                "name": name,
                "address": key.address,
                "publicKey": key.public_key_hex(),
            }))
        }
        KeysCommand::Remove { name } => {
            let name = key_name(name, network)?;
            manager.remove_key(&name).await?;
            info!("Removed key {}", name);
            Ok(())
        }
    }
}

fn require_network(network: Option<Network>) -> Result<Network, ErrorKind> {
    network.ok_or_else(|| {
        ErrorKind::Environment("no network selected, pass --env or set DEPLOYER_ENV".to_string())
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a parsed command line
pub async fn run(cli: Cli, interrupt: Interrupt) -> anyhow::Result<()> {
    let config = DeployerConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let network = cli.env;

    match cli.command {
        Commands::Keys(command) => keys(&config, network, command).await,
        Commands::Config { write: Some(path) } => {
            config.save(&path)?;
            info!("Wrote settings to {}", path.display());
            Ok(())
        }
        Commands::Config { write: None } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::VerifyArtifact(args) => {
            let report = verify_artifact(&config, require_network(network)?, &args).await?;
            print_json(&report)
        }
        Commands::StoreCode(args) => {
            let session = Session::open(config, require_network(network)?, interrupt)?;
            print_json(&store_code(&session, &args).await?)
        }
        Commands::Instantiate(args) => {
            let session = Session::open(config, require_network(network)?, interrupt)?;
            print_json(&instantiate(&session, &args).await?)
        }
        Commands::Migrate(args) => {
            let session = Session::open(config, require_network(network)?, interrupt)?;
            print_json(&migrate(&session, &args).await?)
        }
        Commands::Query(command) => {
            let session = Session::open(config, require_network(network)?, interrupt)?;
            query(&session, command).await
        }
    }
}
