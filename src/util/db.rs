use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::env_flag;

/// Tables owned by the collector, in dependency order.
pub const CATALOG_TABLES: &[&str] = &[
    "apps",
    "prices",
    "developers",
    "publishers",
    "genres",
    "languages",
    "releases",
];

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("invalid database URL")?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        if !env_flag("USE_PREPARED", false) {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("failed to connect to database")?;
        info!(max_connections, "connected to db");

        // Off by default; enable explicitly with AUTO_MIGRATE=1/true/on.
        if env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            Self::run_migrations(&pool, Path::new("./migrations")).await?;
        }
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        Self::run_migrations(&self.pool, Path::new("./migrations")).await
    }

    // Lightweight runner: applies `<version>_<description>.sql` files once, in
    // version order, and records them in _sqlx_migrations.
    async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<()> {
        use std::fs;
        if !dir.exists() {
            info!(dir = %dir.display(), "no migrations directory; skipping");
            return Ok(());
        }
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(pool)
        .await?;
        let applied_rows = sqlx::raw_sql("SELECT version FROM _sqlx_migrations")
            .fetch_all(pool)
            .await?;
        let mut applied: HashSet<i64> = HashSet::new();
        for r in applied_rows {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        let mut candidates: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((version, desc)) = parse_migration_name(fname) {
                candidates.push((version, desc, path));
            }
        }
        candidates.sort_by_key(|(v, _, _)| *v);

        for (version, desc, path) in candidates {
            if applied.contains(&version) {
                continue;
            }
            let sql = fs::read_to_string(&path)
                .with_context(|| format!("failed to read migration {}", path.display()))?;
            info!(version, file = ?path, "applying migration");
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO _sqlx_migrations(version, description) VALUES ($1, $2)")
                .bind(version)
                .bind(&desc)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            applied.insert(version);
        }
        info!(applied = applied.len(), "migrations up-to-date");
        Ok(())
    }

    /// Row count per collector table.
    #[instrument(skip(self))]
    pub async fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut out = Vec::with_capacity(CATALOG_TABLES.len());
        for &table in CATALOG_TABLES {
            let n: i64 = match sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .persistent(false)
                .fetch_one(&self.pool)
                .await
            {
                Ok(n) => n,
                // not migrated yet
                Err(e) if is_undefined_table_error(&e) => 0,
                Err(e) => return Err(e).with_context(|| format!("failed to count {table}")),
            };
            out.push((table, n));
        }
        Ok(out)
    }
}

pub fn is_undefined_table_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

/// `0001_catalog_schema.sql` -> `(1, "catalog_schema")`.
fn parse_migration_name(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let (num, rest) = stem.split_once('_')?;
    if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((num.parse().ok()?, rest.to_string()))
}
