//! Firewall stage: drop any earlier rules, deny inbound by default, allow
//! outbound, open the SSH port and enable ufw. After a run the SSH port is
//! the only inbound rule, whatever the host had before.

use tracing::info;

use crate::error::Result;
use crate::tool_runner::{CommandRunner, run_tool_checked};
use crate::tools::firewall::{
    Direction, Policy, UfwAllowArgs, UfwDefaultArgs, UfwEnableArgs, UfwResetArgs,
};

/// Apply the policy. `ssh_port` must be the port sshd was restarted with.
pub fn configure_firewall(runner: &dyn CommandRunner, ssh_port: u16) -> Result<()> {
    info!("Configuring firewall (allow {ssh_port}/tcp)");

    run_tool_checked(runner, &UfwResetArgs)?;
    run_tool_checked(
        runner,
        &UfwDefaultArgs {
            policy: Policy::Deny,
            direction: Direction::Incoming,
        },
    )?;
    run_tool_checked(
        runner,
        &UfwDefaultArgs {
            policy: Policy::Allow,
            direction: Direction::Outgoing,
        },
    )?;
    run_tool_checked(runner, &UfwAllowArgs { port: ssh_port })?;
    run_tool_checked(runner, &UfwEnableArgs)?;

    info!("Firewall enabled");
    Ok(())
}
