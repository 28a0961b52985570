//! Package stage: refresh the index, upgrade, clean up and install the
//! baseline tool set.

use tracing::{info, warn};

use crate::error::{Result, ServerPrepError};
use crate::sanity::{binary_exists, get_package_for_binary};
use crate::tool_runner::{CommandRunner, run_tool_checked};
use crate::tools::apt::{AptAutoremoveArgs, AptDistUpgradeArgs, AptInstallArgs, AptUpdateArgs};

/// Packages every prepared server gets.
pub const BASELINE_PACKAGES: &[&str] = &[
    "sudo",
    "ufw",
    "openssh-server",
    "ca-certificates",
    "curl",
    "vim",
];

/// Binaries later stages call, checked once installation is done.
pub const POST_INSTALL_BINARIES: &[&str] = &["sudo", "visudo", "ufw", "sshd"];

/// Packages to install, in order, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub packages: Vec<String>,
}

impl PackagePlan {
    /// The baseline set followed by `extra`.
    pub fn baseline(extra: &[String]) -> Self {
        let mut packages: Vec<String> = BASELINE_PACKAGES.iter().map(|p| p.to_string()).collect();
        for package in extra {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }
        Self { packages }
    }
}

/// Run update, dist-upgrade, autoremove and install, then confirm the tools
/// the later stages need are on PATH.
pub fn update_and_install(runner: &dyn CommandRunner, plan: &PackagePlan) -> Result<()> {
    info!("Refreshing package index");
    run_tool_checked(runner, &AptUpdateArgs)?;

    info!("Upgrading installed packages");
    run_tool_checked(runner, &AptDistUpgradeArgs)?;

    info!("Removing unused packages");
    run_tool_checked(runner, &AptAutoremoveArgs)?;

    info!("Installing packages: {}", plan.packages.join(" "));
    run_tool_checked(
        runner,
        &AptInstallArgs {
            packages: plan.packages.clone(),
        },
    )?;

    let missing: Vec<&str> = POST_INSTALL_BINARIES
        .iter()
        .copied()
        .filter(|binary| !binary_exists(runner, binary))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    if runner.is_dry_run() {
        warn!(
            "[dry-run] not yet installed: {} (later stages would need them)",
            missing.join(", ")
        );
        return Ok(());
    }

    let packages: Vec<&str> = missing.iter().map(|b| get_package_for_binary(b)).collect();
    Err(ServerPrepError::MissingTools(format!(
        "{} (packages: {})",
        missing.join(", "),
        packages.join(" ")
    )))
}
