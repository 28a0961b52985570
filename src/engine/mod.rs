//! Engine modules: pure transformations the stages apply to host state.
//!
//! Nothing in here performs I/O; stages read host files, hand the contents to
//! the engine and write back whatever it produces.

pub mod sshd_config;
