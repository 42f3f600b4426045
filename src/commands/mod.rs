//! CLI command implementations for herakles-smem.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Kernel capability report
//! - `config`: Configuration file generation

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
