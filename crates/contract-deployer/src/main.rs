use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_deployer::cli::Cli;
use contract_deployer::commands;
use contract_deployer::error::{exit_code, exit_code_of, DeployError};
use contract_deployer::interrupt::Interrupt;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("contract_deployer={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Loading configuration from: {}", cli.config.display());

    let code = match commands::run(cli, Interrupt::ctrl_c()).await {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            if let Some(deploy) = e.downcast_ref::<DeployError>() {
                if deploy.kind.is_hard_stop() {
                    error!("Stopped at the {} gate, no transaction was broadcast", deploy.operation);
                }
            }
            exit_code_of(&e)
        }
    };

    std::process::exit(code);
}
