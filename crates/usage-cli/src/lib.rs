//! Usage reconciliation CLI library.
//!
//! This crate provides the CLI interface for workspace usage reconciliation.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{BillingConfig, BillingMode, Config};
