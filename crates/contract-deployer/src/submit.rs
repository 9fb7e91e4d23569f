// Proposal submission: deposit check, simulation, a single broadcast, optional wait

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::chain::tx::TxSigner;
use crate::chain::{ChainClient, ChainError, Coin, GasSettings, TxFee, TxResult};
use crate::environment::{Environment, Network};
use crate::error::ErrorKind;
use crate::interrupt::Interrupt;
use crate::keystore::SignerKey;
use crate::proposal::{Authority, BuiltProposal};

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Stop after simulation
    pub dry_run: bool,
    /// Poll for inclusion after broadcast
    pub wait: bool,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait: false,
            wait_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Where a submitted transaction stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionStatus {
    /// Simulated only, nothing broadcast
    Simulated,
    /// Accepted into the mempool, inclusion not checked
    Broadcast,
    /// Executed successfully in a block
    Included,
    /// Broadcast, but not seen in a block before the wait ended
    Pending,
}

/// What the operator needs to follow up on a submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub network: Network,
    pub contract: String,
    pub kind: String,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub fee: String,
    pub submitted_at: DateTime<Utc>,
}

/// Ids reported by the chain in a transaction's events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedIds {
    pub proposal_id: Option<u64>,
    pub code_id: Option<u64>,
    pub contract_address: Option<String>,
}

pub fn extract_ids(result: &TxResult) -> ExtractedIds {
    let parse = |kind: &str, key: &str| {
        result
            .event_attribute(kind, key)
            .and_then(|value| value.trim_matches('"').parse::<u64>().ok())
    };

    ExtractedIds {
        proposal_id: parse("submit_proposal", "proposal_id"),
        code_id: parse("store_code", "code_id").or_else(|| parse("instantiate", "code_id")),
        contract_address: result
            .event_attribute("instantiate", "_contract_address")
            .map(str::to_string),
    }
}

/// Check the offered deposit against the chain's minimum for the same denom
pub fn check_deposit(offered: &Coin, min_deposit: &[Coin]) -> Result<(), ErrorKind> {
    if min_deposit.is_empty() {
        return Ok(());
    }

    match min_deposit.iter().find(|coin| coin.denom == offered.denom) {
        Some(required) if offered.amount >= required.amount => Ok(()),
        Some(required) => Err(ErrorKind::InsufficientDeposit {
            offered: offered.to_string(),
            required: required.to_string(),
        }),
        None => Err(ErrorKind::InsufficientDeposit {
            offered: offered.to_string(),
            required: min_deposit
                .iter()
                .map(Coin::to_string)
                .collect::<Vec<_>>()
                .join(" or "),
        }),
    }
}

fn broadcast_error(e: ChainError) -> ErrorKind {
    ErrorKind::BroadcastError(e.to_string())
}

/// Signs and broadcasts built proposals on one network
pub struct Submitter {
    client: Arc<dyn ChainClient>,
    network: Network,
    chain_id: String,
    gas: GasSettings,
}

impl Submitter {
    pub fn new(client: Arc<dyn ChainClient>, env: &Environment) -> Result<Self, ErrorKind> {
        Ok(Self {
            client,
            network: env.network,
            chain_id: env.axelar.chain_id.clone(),
            gas: GasSettings::new(env.gas_price()?, env.axelar.gas_adjustment),
        })
    }

    /// Submit `proposal` for `contract` under `authority`, signed by `signer`
    ///
    /// The broadcast happens at most once. An interrupt raised before it
    /// aborts with `Interrupted`; one raised while waiting returns the
    /// receipt as `Pending` so the tx hash can be followed up.
    pub async fn submit(
        &self,
        contract: &str,
        proposal: &BuiltProposal,
        authority: &Authority,
        signer: &SignerKey,
        interrupt: &Interrupt,
        options: &SubmitOptions,
    ) -> Result<SubmissionReceipt, ErrorKind> {
        if let Some(required) = &proposal.required_signer {
            if required != &signer.address {
                return Err(ErrorKind::Signer(format!(
                    "run-as account {} does not match signer {}",
                    required, signer.address
                )));
            }
        }

        if let Authority::Governance { deposit } = authority {
            let min_deposit = self
                .client
                .min_deposit()
                .await
                .map_err(|e| ErrorKind::QueryError(format!("deposit params: {}", e)))?;
            check_deposit(deposit, &min_deposit)?;
            debug!("Deposit {} meets minimum", deposit);
        }

        let account = self
            .client
            .account(&signer.address)
            .await
            .map_err(|e| ErrorKind::QueryError(format!("account {}: {}", signer.address, e)))?;
        let tx_signer = TxSigner::new(&self.chain_id, signer, account);

        let simulation_fee = TxFee {
            gas_limit: 0,
            amount: Coin::new(0, self.gas.price.denom.clone()),
        };
        let simulation_tx = tx_signer
            .sign(vec![proposal.message.clone()], &proposal.memo, &simulation_fee)
            .map_err(|e| ErrorKind::Signer(e.to_string()))?;

        let gas_used = self
            .client
            .simulate(&simulation_tx)
            .await
            .map_err(|e| ErrorKind::SimulationFailure(e.to_string()))?;
        let fee = self.gas.fee_from_simulation(gas_used);
        info!(
            "Simulated {} for {}: {} gas used, limit {}, fee {}",
            proposal.kind, contract, gas_used, fee.gas_limit, fee.amount
        );

        let mut receipt = SubmissionReceipt {
            network: self.network,
            contract: contract.to_string(),
            kind: proposal.kind.to_string(),
            status: SubmissionStatus::Simulated,
            tx_hash: None,
            height: None,
            proposal_id: None,
            code_id: proposal.code_id,
            contract_address: proposal.contract_address.clone(),
            gas_used,
            gas_limit: fee.gas_limit,
            fee: fee.amount.to_string(),
            submitted_at: Utc::now(),
        };

        if options.dry_run {
            info!("Dry run: not broadcasting");
            return Ok(receipt);
        }

        if interrupt.is_raised() {
            return Err(ErrorKind::Interrupted);
        }

        let tx = tx_signer
            .sign(vec![proposal.message.clone()], &proposal.memo, &fee)
            .map_err(|e| ErrorKind::Signer(e.to_string()))?;

        let broadcast = self.client.broadcast(&tx).await.map_err(broadcast_error)?;
        if broadcast.code != 0 {
            return Err(ErrorKind::BroadcastError(format!(
                "code {}: {}",
                broadcast.code, broadcast.raw_log
            )));
        }

        receipt.status = SubmissionStatus::Broadcast;
        receipt.tx_hash = Some(broadcast.txhash.clone());
        receipt.submitted_at = Utc::now();
        info!("{} for {} broadcast as {}", proposal.kind, contract, broadcast.txhash);

        if !options.wait {
            return Ok(receipt);
        }

        match self.wait_for_inclusion(&broadcast.txhash, interrupt, options).await? {
            Some(result) => {
                if result.code != 0 {
                    return Err(ErrorKind::BroadcastError(format!(
                        "tx {} failed in block {} with code {}: {}",
                        result.txhash, result.height, result.code, result.raw_log
                    )));
                }

                let ids = extract_ids(&result);
                receipt.status = SubmissionStatus::Included;
                receipt.height = Some(result.height);
                receipt.proposal_id = ids.proposal_id;
                receipt.code_id = ids.code_id.or(receipt.code_id);
                receipt.contract_address = ids.contract_address.or(receipt.contract_address);
                info!("{} included at height {}", broadcast.txhash, result.height);
            }
            None => {
                receipt.status = SubmissionStatus::Pending;
                warn!(
                    "{} not seen in a block yet; follow up with the tx hash",
                    broadcast.txhash
                );
            }
        }

        Ok(receipt)
    }

    /// Poll until the transaction is included, the wait times out or the
    /// operator interrupts; `None` unless included
    async fn wait_for_inclusion(
        &self,
        txhash: &str,
        interrupt: &Interrupt,
        options: &SubmitOptions,
    ) -> Result<Option<TxResult>, ErrorKind> {
        let deadline = Instant::now() + options.wait_timeout;

        loop {
            match self.client.tx(txhash).await {
                Ok(Some(result)) => return Ok(Some(result)),
                Ok(None) => debug!("{} not yet included", txhash),
                // the tx is in flight either way; keep polling
                Err(e) => warn!("Polling {} failed: {}", txhash, e),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = sleep(options.poll_interval) => {}
                _ = interrupt.raised() => {
                    warn!("Interrupted while waiting for {}", txhash);
                    return Ok(None);
                }
            }
        }
    }
}
