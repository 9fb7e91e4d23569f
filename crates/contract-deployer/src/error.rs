// Error taxonomy for deployment operations
// Every failure reported to the operator names the contract, network and operation

use std::fmt;
use thiserror::Error;

use crate::deployment::InvalidTransition;
use crate::environment::Network;

/// Process exit codes, distinct per failure family so scripts can branch on them
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const CHECKSUM: i32 = 3;
    pub const BROADCAST: i32 = 4;
    pub const QUERY: i32 = 5;
    pub const FETCH: i32 = 6;
    pub const REQUEST: i32 = 7;
    pub const INTERRUPTED: i32 = 130;
}

/// What went wrong, independent of where it happened
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("failed to fetch {url}: {reason}")]
    FetchError { url: String, reason: String },

    #[error("checksum mismatch for {file}: manifest lists {expected}, artifact hashes to {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("no entry for {file} in checksum manifest {manifest}")]
    ManifestEntryNotFound { file: String, manifest: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing address: {0}")]
    MissingAddress(String),

    #[error("simulation failed: {0}")]
    SimulationFailure(String),

    #[error("broadcast failed: {0}")]
    BroadcastError(String),

    #[error("insufficient deposit: offered {offered}, chain requires at least {required}")]
    InsufficientDeposit { offered: String, required: String },

    #[error("query failed: {0}")]
    QueryError(String),

    #[error("failed to decode query response: {0}")]
    DecodeError(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("signer unavailable: {0}")]
    Signer(String),

    #[error("interrupted by operator before broadcast, nothing was submitted")]
    Interrupted,

    #[error(transparent)]
    Stage(#[from] InvalidTransition),
}

impl ErrorKind {
    /// Exit code for this failure family
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::ChecksumMismatch { .. } | ErrorKind::ManifestEntryNotFound { .. } => {
                exit_code::CHECKSUM
            }
            ErrorKind::SimulationFailure(_)
            | ErrorKind::BroadcastError(_)
            | ErrorKind::InsufficientDeposit { .. } => exit_code::BROADCAST,
            ErrorKind::QueryError(_) | ErrorKind::DecodeError(_) => exit_code::QUERY,
            ErrorKind::FetchError { .. } => exit_code::FETCH,
            ErrorKind::InvalidPayload(_) | ErrorKind::MissingAddress(_) => exit_code::REQUEST,
            ErrorKind::Interrupted => exit_code::INTERRUPTED,
            ErrorKind::Environment(_) | ErrorKind::Signer(_) | ErrorKind::Stage(_) => {
                exit_code::GENERIC
            }
        }
    }

    /// Gates that must stop the workflow without any further chain interaction
    pub fn is_hard_stop(&self) -> bool {
        matches!(
            self,
            ErrorKind::ChecksumMismatch { .. }
                | ErrorKind::ManifestEntryNotFound { .. }
                | ErrorKind::SimulationFailure(_)
        )
    }
}

/// The operation that was being attempted when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ResolveArtifact,
    VerifyChecksum,
    StoreCode,
    Instantiate,
    Migrate,
    ResolveCodeId,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ResolveArtifact => "resolve-artifact",
            Operation::VerifyChecksum => "verify-checksum",
            Operation::StoreCode => "store-code",
            Operation::Instantiate => "instantiate",
            Operation::Migrate => "migrate",
            Operation::ResolveCodeId => "resolve-code-id",
            Operation::Query => "query",
        };
        f.write_str(name)
    }
}

/// An error with the triage context the operator needs
#[derive(Error, Debug)]
#[error("{operation} of {contract} on {network} failed: {kind}")]
pub struct DeployError {
    pub contract: String,
    pub network: Network,
    pub operation: Operation,
    pub kind: ErrorKind,
}

impl DeployError {
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

/// Contract, network and operation under which component errors are reported
#[derive(Debug, Clone)]
pub struct OpContext {
    pub contract: String,
    pub network: Network,
    pub operation: Operation,
}

impl OpContext {
    pub fn new(contract: impl Into<String>, network: Network, operation: Operation) -> Self {
        Self {
            contract: contract.into(),
            network,
            operation,
        }
    }

    /// Same contract and network, different stage
    pub fn with_operation(&self, operation: Operation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    pub fn wrap(&self, kind: ErrorKind) -> DeployError {
        DeployError {
            contract: self.contract.clone(),
            network: self.network,
            operation: self.operation,
            kind,
        }
    }
}

/// Attach an [`OpContext`] to a component result
pub trait InContext<T> {
    fn in_context(self, ctx: &OpContext) -> Result<T, DeployError>;
}

impl<T> InContext<T> for Result<T, ErrorKind> {
    fn in_context(self, ctx: &OpContext) -> Result<T, DeployError> {
        self.map_err(|kind| ctx.wrap(kind))
    }
}

/// Exit code for an error surfaced to `main`
pub fn exit_code_of(error: &anyhow::Error) -> i32 {
    if let Some(e) = error.downcast_ref::<DeployError>() {
        return e.exit_code();
    }
    if let Some(kind) = error.downcast_ref::<ErrorKind>() {
        return kind.exit_code();
    }
    exit_code::GENERIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_family() {
        let checksum = ErrorKind::ManifestEntryNotFound {
            file: "multisig.wasm".to_string(),
            manifest: "checksums.txt".to_string(),
        };
        let broadcast = ErrorKind::BroadcastError("code 5: insufficient funds".to_string());
        let query = ErrorKind::DecodeError("invalid base64".to_string());

        assert_eq!(checksum.exit_code(), exit_code::CHECKSUM);
        assert_eq!(broadcast.exit_code(), exit_code::BROADCAST);
        assert_eq!(query.exit_code(), exit_code::QUERY);
        assert_ne!(checksum.exit_code(), broadcast.exit_code());
        assert_ne!(broadcast.exit_code(), query.exit_code());
    }

    #[test]
    fn test_context_appears_in_message() {
        let ctx = OpContext::new("Multisig", Network::Testnet, Operation::Migrate);
        let err: Result<(), ErrorKind> =
            Err(ErrorKind::MissingAddress("no address for Multisig".to_string()));

        let err = err.in_context(&ctx).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("migrate"));
        assert!(message.contains("Multisig"));
        assert!(message.contains("testnet"));
        assert_eq!(err.exit_code(), exit_code::REQUEST);
    }

    #[test]
    fn test_exit_code_through_anyhow() {
        let ctx = OpContext::new("Multisig", Network::Testnet, Operation::VerifyChecksum);
        let deploy: anyhow::Error = ctx
            .wrap(ErrorKind::ChecksumMismatch {
                file: "multisig.wasm".to_string(),
                expected: "aa".to_string(),
                actual: "bb".to_string(),
            })
            .into();
        assert_eq!(exit_code_of(&deploy), exit_code::CHECKSUM);

        let bare: anyhow::Error = ErrorKind::Interrupted.into();
        assert_eq!(exit_code_of(&bare), exit_code::INTERRUPTED);

        assert_eq!(exit_code_of(&anyhow::anyhow!("config")), exit_code::GENERIC);
    }

    #[test]
    fn test_hard_stops() {
        assert!(ErrorKind::SimulationFailure("out of gas".to_string()).is_hard_stop());
        assert!(!ErrorKind::QueryError("timeout".to_string()).is_hard_stop());
    }
}
