//! Run stages, in execution order.
//!
//! Each stage is a set of free functions over the host ports
//! (`CommandRunner`, `HostFs`); the `Bootstrapper` sequences them.

pub mod packages;
pub mod provision;
pub mod ssh;
pub mod firewall;
