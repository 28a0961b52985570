//! Run orchestration.
//!
//! `Bootstrapper` drives the stages in their fixed order and records progress
//! in a `RunContext`. The first error stops the run and marks it failed;
//! nothing is rolled back.

use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host_fs::HostFs;
use crate::params::Settings;
use crate::run_state::{RunContext, RunStage};
use crate::sanity::SanityCheckResult;
use crate::stages::firewall::configure_firewall;
use crate::stages::packages::{PackagePlan, update_and_install};
use crate::stages::provision::{AdminAccount, ProvisionReport, provision_admin};
use crate::stages::ssh::{HardenPlan, harden};
use crate::tool_runner::CommandRunner;

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ssh_port: u16,
    pub admin_user: String,
    pub backup_path: PathBuf,
    /// sshd_config directives that had to be changed.
    pub sshd_changes: usize,
    pub provision: ProvisionReport,
    pub stage_history: Vec<(RunStage, u64)>,
    pub dry_run: bool,
}

impl RunSummary {
    /// Command the operator should use to log in from now on.
    pub fn connection_hint(&self) -> String {
        format!("ssh -p {} {}@<server_ip>", self.ssh_port, self.admin_user)
    }
}

/// Sequences the stages over a pair of host ports.
pub struct Bootstrapper<'a> {
    runner: &'a dyn CommandRunner,
    fs: &'a dyn HostFs,
    context: RunContext,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(runner: &'a dyn CommandRunner, fs: &'a dyn HostFs) -> Self {
        Self {
            runner,
            fs,
            context: RunContext::new(),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Validate, then run every stage. `sanity` is the result of the
    /// pre-flight checks, which must pass before anything is changed.
    pub fn run(&mut self, settings: &Settings, sanity: &SanityCheckResult) -> Result<RunSummary> {
        match self.run_stages(settings, sanity) {
            Ok(summary) => Ok(summary),
            Err(err) => {
                let stage = self.context.current_stage();
                if self.context.fail().is_ok() {
                    if stage.mutates_host() {
                        warn!("Run failed during {stage}; changes made so far are left in place");
                    } else {
                        debug!("Run failed during stage: {stage}");
                    }
                }
                Err(err)
            }
        }
    }

    fn enter(&mut self, stage: RunStage) -> Result<()> {
        self.context.transition_to(stage)?;
        info!("==> {stage}");
        Ok(())
    }

    fn run_stages(&mut self, settings: &Settings, sanity: &SanityCheckResult) -> Result<RunSummary> {
        self.enter(RunStage::Validating)?;
        settings.params.validate()?;
        sanity.ensure_ok()?;

        self.enter(RunStage::PackagesUpdating)?;
        update_and_install(
            self.runner,
            &PackagePlan::baseline(&settings.options.extra_packages),
        )?;

        self.enter(RunStage::UserProvisioning)?;
        let provision = provision_admin(self.runner, self.fs, &AdminAccount::from_settings(settings))?;

        self.enter(RunStage::SshHardening)?;
        let hardened = harden(
            self.runner,
            self.fs,
            &HardenPlan::from_settings(settings),
            Local::now(),
        )?;

        self.enter(RunStage::FirewallConfiguring)?;
        configure_firewall(self.runner, hardened.port)?;

        self.context.transition_to(RunStage::Done)?;

        Ok(RunSummary {
            ssh_port: hardened.port,
            admin_user: settings.params.admin_user.clone(),
            sshd_changes: hardened.changed(),
            backup_path: hardened.backup_path,
            provision,
            stage_history: self.context.stage_history().to_vec(),
            dry_run: self.runner.is_dry_run(),
        })
    }
}
