//! Type-safe tool argument modules.
//!
//! This module contains structs that implement `ToolArgs` for each external
//! program serverprep drives. Each struct maps Rust fields to the exact CLI
//! flags and environment variables the program expects.

pub mod apt;
pub mod firewall;
pub mod system;
pub mod user;
