use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use usage_cli::commands::{import, reconcile, status, summary};
use usage_cli::{Cli, Commands, Config};
use usage_db::Database;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(cli: &Cli) -> Result<(Database, Config)> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Some(Commands::Import) => {
            let (mut db, _config) = open_database(&cli)?;
            let written = import::run(std::io::stdin().lock(), &mut db)?;
            tracing::info!(written, "imported workspace instances");
        }
        Some(Commands::Reconcile(args)) => {
            let (mut db, config) = open_database(&cli)?;
            reconcile::run(&mut stdout, args, &mut db, &config)?;
        }
        Some(Commands::Summary { json }) => {
            let (db, _config) = open_database(&cli)?;
            summary::run(&mut stdout, &db, *json)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(&cli)?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
