// Per-contract deployment progress
// Resolved -> ChecksumVerified -> Stored -> Instantiated | MigrationSubmitted -> Verified

use std::fmt;
use tracing::{debug, warn};

use crate::artifact::Checksum;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStage {
    Resolved,
    ChecksumVerified { checksum: Checksum },
    /// Code stored; the id is unknown until a governance proposal executes
    Stored { code_id: Option<u64> },
    Instantiated { address: Option<String> },
    MigrationSubmitted { code_id: u64 },
    Verified,
    Failed { reason: String },
}

impl DeploymentStage {
    pub fn name(&self) -> &'static str {
        match self {
            DeploymentStage::Resolved => "resolved",
            DeploymentStage::ChecksumVerified { .. } => "checksum-verified",
            DeploymentStage::Stored { .. } => "stored",
            DeploymentStage::Instantiated { .. } => "instantiated",
            DeploymentStage::MigrationSubmitted { .. } => "migration-submitted",
            DeploymentStage::Verified => "verified",
            DeploymentStage::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStage::Verified | DeploymentStage::Failed { .. })
    }

    /// Whether `next` directly follows `self`
    fn allows(&self, next: &DeploymentStage) -> bool {
        use DeploymentStage::*;

        match (self, next) {
            (Verified | Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Resolved, ChecksumVerified { .. }) => true,
            (ChecksumVerified { .. }, Stored { .. }) => true,
            (Stored { .. }, Instantiated { .. } | MigrationSubmitted { .. } | Verified) => true,
            (Instantiated { .. } | MigrationSubmitted { .. }, Verified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStage::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Rejected stage change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move {contract} from {from} to {to}")]
pub struct InvalidTransition {
    pub contract: String,
    pub from: &'static str,
    pub to: &'static str,
}

/// Progress of one contract through the gates
#[derive(Debug, Clone)]
pub struct Deployment {
    pub contract: String,
    stage: DeploymentStage,
    history: Vec<&'static str>,
}

impl Deployment {
    /// A deployment whose artifact has been located
    pub fn resolved(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            stage: DeploymentStage::Resolved,
            history: vec!["resolved"],
        }
    }

    /// A deployment starting from code already on chain (instantiate, migrate)
    pub fn from_stored(contract: impl Into<String>, code_id: u64) -> Self {
        Self {
            contract: contract.into(),
            stage: DeploymentStage::Stored { code_id: Some(code_id) },
            history: vec!["stored"],
        }
    }

    pub fn stage(&self) -> &DeploymentStage {
        &self.stage
    }

    /// Stage names passed through, oldest first
    pub fn history(&self) -> &[&'static str] {
        &self.history
    }

    pub fn advance(&mut self, next: DeploymentStage) -> Result<(), InvalidTransition> {
        if !self.stage.allows(&next) {
            return Err(InvalidTransition {
                contract: self.contract.clone(),
                from: self.stage.name(),
                to: next.name(),
            });
        }

        debug!("{}: {} -> {}", self.contract, self.stage.name(), next);
        self.history.push(next.name());
        self.stage = next;
        Ok(())
    }

    /// Move to `Failed`; a terminal deployment stays where it is
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.stage.is_terminal() {
            return;
        }
        warn!("{}: failed at {}: {}", self.contract, self.stage.name(), reason);
        self.history.push("failed");
        self.stage = DeploymentStage::Failed { reason };
    }
}
