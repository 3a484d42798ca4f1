use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use steam_catalog_sync::cli::db_counts::{self, DbCountsConfig};
use steam_catalog_sync::config::CollectorConfig;
use steam_catalog_sync::database_ops::alerts::sink_from_config;
use steam_catalog_sync::database_ops::catalog_sync::PgCatalogStore;
use steam_catalog_sync::database_ops::memory_store::MemoryCatalogStore;
use steam_catalog_sync::database_ops::steam::client::SteamStoreClient;
use steam_catalog_sync::orchestrator::{resolve_targets, run_collection};
use steam_catalog_sync::telemetry::{init_tracing, DEFAULT_FILTER};
use steam_catalog_sync::util::db::Db;
use steam_catalog_sync::util::env;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "steam-catalog-sync", version, about = "Steam store catalog collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch details for every eligible app across the configured regions (default)
    Run {
        /// Keep results in memory instead of writing to the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Restrict the run to these app ids (repeat or comma-separate)
        #[arg(long = "app-id", value_delimiter = ',')]
        app_ids: Vec<String>,
    },
    /// Print the app ids the next run would visit
    Targets {
        /// Print at most N ids
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Apply ./migrations
    Migrate,
    /// Print row counts for the catalog tables
    Counts {
        /// Also list the most recently synced apps
        #[arg(long, default_value_t = false)]
        recent_apps: bool,
        /// Override RECENT_APPS_LIMIT (defaults to env/20)
        #[arg(long)]
        recent_apps_limit: Option<i64>,
    },
}

async fn connect(config: &CollectorConfig) -> Result<Db> {
    let url = env::db_url().context("DATABASE_URL (or DB_URL) must be set")?;
    Db::connect(&url, config.db_max_connections).await
}

fn store_client(config: &CollectorConfig) -> Result<SteamStoreClient> {
    SteamStoreClient::new(
        config.endpoints.clone(),
        config.language.clone(),
        config.api_key.clone(),
        config.http_timeout,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();

    env::preflight_check("steam-catalog-sync", &[], CollectorConfig::LOGGED_KEYS)?;
    let mut config = CollectorConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Run {
        dry_run: false,
        app_ids: Vec::new(),
    }) {
        Commands::Run { dry_run, app_ids } => {
            if !app_ids.is_empty() {
                config.app_ids = app_ids;
            }
            let api = store_client(&config)?;
            let alerts = sink_from_config(config.webhook_url.as_deref())?;
            if dry_run {
                let store = MemoryCatalogStore::new();
                run_collection(&config, &api, &store, &*alerts).await?;
                let tables = store.snapshot().await;
                info!(
                    apps = tables.apps.len(),
                    prices = tables.prices.len(),
                    releases = tables.releases.len(),
                    "dry run: nothing persisted"
                );
            } else {
                let db = connect(&config).await?;
                let store = PgCatalogStore::new(db, config.sync_mode);
                run_collection(&config, &api, &store, &*alerts).await?;
            }
        }
        Commands::Targets { limit } => {
            if limit.is_some() {
                config.app_limit = limit;
            }
            let api = store_client(&config)?;
            let db = connect(&config).await?;
            let store = PgCatalogStore::new(db, config.sync_mode);
            for appid in resolve_targets(&config, &api, &store).await? {
                println!("{appid}");
            }
        }
        Commands::Migrate => {
            let db = connect(&config).await?;
            db.migrate().await?;
        }
        Commands::Counts {
            recent_apps,
            recent_apps_limit,
        } => {
            let db = connect(&config).await?;
            db_counts::run(
                &db,
                DbCountsConfig {
                    show_recent_apps: recent_apps.then_some(true),
                    recent_apps_limit,
                },
            )
            .await?;
        }
    }
    Ok(())
}
