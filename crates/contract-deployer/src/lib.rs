// Contract deployer library
// Components are exposed individually so each gate can be driven and tested on its own

pub mod artifact;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod config;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod interrupt;
pub mod keystore;
pub mod proposal;
pub mod retry;
pub mod submit;
pub mod verify;

// Re-export commonly used types for convenience
pub use artifact::{ArtifactResolver, Checksum, ResolvedArtifact};
pub use chain::{ChainClient, ChainError, LcdClient};
pub use config::DeployerConfig;
pub use deployment::{Deployment, DeploymentStage};
pub use environment::{Environment, Network};
pub use error::{DeployError, ErrorKind, Operation};
pub use interrupt::Interrupt;
pub use keystore::{KeyError, KeyManager, SignerKey};
pub use proposal::{Authority, BuiltProposal, ProposalBuilder, ProposalRequest};
pub use submit::{SubmissionReceipt, Submitter};
pub use verify::{ContractInfo, QueryResult, StateVerifier};
