//! zhquiz CLI
//!
//! Drives the review scheduler against a local SQLite database.

mod cli;
mod import;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zhquiz_srs::{Config, RequestContext, SchedulerService, SqliteRepository};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(user) = cli.user.clone() {
        config.user = user;
    }
    if let Some(db) = cli.db.clone() {
        config.storage.database = Some(db);
    }

    init_logging(&config.logging.filter);

    let db_path = config
        .db_path()
        .context("no database path configured and no data directory available")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let repo = Arc::new(SqliteRepository::open(&db_path)?);
    let service = SchedulerService::from_config(repo.clone(), &config)?;
    let ctx = RequestContext::new(config.user.clone());

    match cli.command {
        Commands::Due(args) => {
            let saved = service.last_filter(&ctx).await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not load last quiz filter, using defaults");
                None
            });
            let filter = args.to_filter(saved);
            let result = service.initialize(&ctx, &filter).await?;
            print_json(&result)?;
            service.flush().await;
        }
        Commands::Mark { id, outcome } => {
            let state = service.mark(&ctx, id, &outcome).await?;
            print_json(&state)?;
        }
        Commands::Tags => {
            print_json(&service.all_tags(&ctx).await?)?;
        }
        Commands::Show(args) => {
            let items = service.find_many(&ctx, &args.to_lookup()?).await?;
            print_json(&items)?;
        }
        Commands::Import { file } => run_import(&repo, &config.user, &file).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured filter.
fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run_import(repo: &SqliteRepository, user_id: &str, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let entries = import::parse_items(&content)
        .with_context(|| format!("invalid import file {}", file.display()))?;

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for entry in entries {
        for item in entry.into_items(user_id) {
            if repo.insert_item(&item).await? {
                inserted += 1;
            } else {
                skipped += 1;
            }
        }
    }

    info!(inserted, skipped, "Import finished");
    println!("Imported {inserted} items ({skipped} already present)");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
