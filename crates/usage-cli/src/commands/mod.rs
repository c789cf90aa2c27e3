//! CLI subcommand implementations.

pub mod import;
pub mod reconcile;
pub mod status;
pub mod summary;
pub mod util;
