//! Shared utilities for pg-provision components
//!
//! This crate provides common functionality used by the provisioner:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution utilities, including running as another OS user

pub mod command;
pub mod config;
pub mod logging;

pub use command::{run, run_with_stdin, CommandOutput, RunAs};
pub use config::ConfigExt;
pub use logging::init_logging;
