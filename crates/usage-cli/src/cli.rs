//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::reconcile::ReconcileArgs;

/// Workspace usage reconciliation.
///
/// Converts workspace instance runtimes into credit usage, stores the
/// resulting usage records and reports credits per team.
#[derive(Debug, Parser)]
#[command(name = "usage", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import workspace instances from JSONL on stdin.
    Import,

    /// Reconcile usage for instances running within a time range.
    Reconcile(ReconcileArgs),

    /// Show credits per team across stored usage records.
    Summary {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show database location and row counts.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reconcile_arguments() {
        let cli = Cli::parse_from([
            "usage",
            "reconcile",
            "--from",
            "2022-05-01T00:00:00Z",
            "--to",
            "2022-06-01T00:00:00Z",
            "--dry-run",
        ]);
        let Some(Commands::Reconcile(args)) = cli.command else {
            panic!("expected reconcile command");
        };
        assert_eq!(args.from, "2022-05-01T00:00:00Z");
        assert_eq!(args.to, "2022-06-01T00:00:00Z");
        assert!(args.dry_run);
        assert!(!args.json);
    }

    #[test]
    fn reconcile_requires_a_range() {
        assert!(Cli::try_parse_from(["usage", "reconcile", "--from", "1 day ago"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["usage", "status", "--verbose", "--config", "usage.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("usage.toml")));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }
}
