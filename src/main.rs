//! serverprep - Main entry point
//!
//! Parses arguments, resolves settings, runs the pre-flight checks and hands
//! off to the `Bootstrapper`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use serverprep::bootstrap::{Bootstrapper, RunSummary};
use serverprep::cli::Cli;
use serverprep::config_file::{BootstrapConfig, resolve_settings};
use serverprep::error::ServerPrepError;
use serverprep::host_fs::LocalFs;
use serverprep::sanity::verify_environment;
use serverprep::tool_runner::SystemRunner;

/// Initialize the logger: progress on stdout, warnings and errors on stderr.
/// `RUST_LOG` overrides the level.
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let file_config = match cli.config {
        Some(ref path) => {
            info!("Using configuration file {}", path.display());
            BootstrapConfig::load_from_file(path)
                .with_context(|| format!("Cannot use configuration file {}", path.display()))?
        }
        None => BootstrapConfig::default(),
    };

    let settings = resolve_settings(&cli.overrides(), &file_config)
        .context("Cannot resolve run settings")?;
    debug!("Resolved settings: {:?}", settings);

    if cli.dry_run {
        warn!("Dry-run mode: no changes will be made to this host");
    }

    let runner = SystemRunner::new(cli.dry_run);
    let fs = LocalFs::new(cli.dry_run);

    let sanity = verify_environment(&runner);
    let mut bootstrapper = Bootstrapper::new(&runner, &fs);
    let summary = bootstrapper.run(&settings, &sanity)?;
    Ok(summary)
}

/// Exit status for a failed run: 2 for input and precondition problems,
/// 1 for everything else.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ServerPrepError>()
        .map(ServerPrepError::exit_code)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed: {:?}", cli);

    match run(&cli) {
        Ok(summary) => {
            info!("Server preparation complete");
            info!(
                "Admin user {} (home {}), sshd listening on port {}",
                summary.admin_user,
                summary.provision.home.display(),
                summary.ssh_port
            );
            info!(
                "sshd_config: {} directive(s) changed, backup at {}",
                summary.sshd_changes,
                summary.backup_path.display()
            );
            if summary.dry_run {
                info!("Dry run finished; nothing was changed");
            }
            info!(
                "Keep this session open and test a new login first: {}",
                summary.connection_hint()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
