mod cli;
mod config;
mod data_aquisition;
mod mib;
mod poller;

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigArgs};
use config::{Config, ConfigError};
use data_aquisition::{credentials::CredentialValidator, snmp::SnmpConnector};
use poller::{HostOrchestrator, RunError, SnapshotAggregator};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("could not start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("{0} is uncontactable with every configured credential group")]
    Uncontactable(String),
    #[error("could not print output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli.config)?;
    match cli.command {
        Command::Config(args) => print_config(&config, &args),
        Command::Run => runtime()?.block_on(run(&config)),
        Command::Test(args) => runtime()?.block_on(test_host(&config, &args.host)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, AppError> {
    tokio::runtime::Runtime::new().map_err(AppError::Runtime)
}

async fn run(config: &Config) -> Result<(), AppError> {
    let connector = Arc::new(SnmpConnector::new(config.snmp.clone()));
    let summary = HostOrchestrator::new(config.hosts.clone(), &config.snmp_directory, connector)
        .with_workers(config.workers)
        .run()
        .await?;
    if !summary.skipped.is_empty() {
        info!(hosts = ?summary.skipped, "skipped hosts");
    }
    Ok(())
}

/// Validates one host with every credential group and prints what it would store.
async fn test_host(config: &Config, hostname: &str) -> Result<(), AppError> {
    let validator = CredentialValidator::new(Arc::new(SnmpConnector::new(config.snmp.clone())));
    let host = config.ad_hoc_host(hostname);
    let Some(session) = validator.credentials(&host).await else {
        return Err(AppError::Uncontactable(hostname.to_string()));
    };

    let snapshot = SnapshotAggregator::default().snapshot(&session).await;
    let report = json!({
        "hostname": session.hostname(),
        "snmp_group": session.profile().group_name,
        "snmp_version": session.profile().version(),
        "snapshot": snapshot,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn print_config(config: &Config, args: &ConfigArgs) -> Result<(), AppError> {
    let (hosts, snmp_auth) = args.sections();
    let mut report = serde_json::Map::new();
    if hosts {
        report.insert("hosts".to_string(), serde_json::to_value(config.host_summaries())?);
    }
    if snmp_auth {
        report.insert("snmp_auth".to_string(), serde_json::to_value(config.redacted_auth())?);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
