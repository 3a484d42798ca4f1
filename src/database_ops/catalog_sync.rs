//! Persists normalized `appdetails` passes into the catalog tables.
//!
//! The base `apps` row is upserted; every child collection is replaced
//! wholesale (delete all rows for the identifier, insert the current ones).
//! Prices are scoped by currency so rows from several regions coexist.
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::config::{FreshnessPolicy, SyncMode};
use crate::database_ops::db::Db;
use crate::database_ops::steam::models::{
    CatalogEntry, DetailResponse, Genre, PriceQuote, ReleaseInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRole {
    /// First configured region; owns the base row and child collections.
    Primary,
    Secondary,
}

impl RegionRole {
    pub fn for_index(idx: usize) -> Self {
        if idx == 0 {
            RegionRole::Primary
        } else {
            RegionRole::Secondary
        }
    }
}

/// Child collections sourced from the primary region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildRows {
    pub developers: Vec<String>,
    pub publishers: Vec<String>,
    pub genres: Vec<Genre>,
    pub languages: Vec<String>,
    pub release: Option<ReleaseInfo>,
}

/// Writes one identifier+region pass produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub appid: String,
    pub base: Option<CatalogEntry>,
    pub price: Option<PriceQuote>,
    pub children: Option<ChildRows>,
}

impl SyncPlan {
    /// Decide what a pass writes. `None` when the pass has nothing to persist.
    ///
    /// `base_written` tells whether an earlier pass of this identifier already
    /// upserted the `apps` row. A secondary success without one writes its own
    /// entry as the base so the price never lands without a base row.
    pub fn for_pass(
        appid: &str,
        response: &DetailResponse,
        role: RegionRole,
        base_written: bool,
    ) -> Option<Self> {
        let plan = match (response, role) {
            (DetailResponse::NoData, _) => return None,
            (DetailResponse::Unavailable, RegionRole::Primary) => SyncPlan {
                appid: appid.to_string(),
                base: Some(CatalogEntry::tombstone(appid)),
                price: None,
                children: None,
            },
            (DetailResponse::Unavailable, RegionRole::Secondary) => return None,
            (DetailResponse::Available(details), RegionRole::Primary) => SyncPlan {
                appid: appid.to_string(),
                base: Some(details.entry.clone()),
                price: details.price.clone(),
                children: Some(ChildRows {
                    developers: details.developers.clone(),
                    publishers: details.publishers.clone(),
                    genres: details.genres.clone(),
                    languages: details.languages.clone(),
                    release: details.release.clone(),
                }),
            },
            (DetailResponse::Available(details), RegionRole::Secondary) => SyncPlan {
                appid: appid.to_string(),
                base: (!base_written).then(|| details.entry.clone()),
                price: details.price.clone(),
                children: None,
            },
        };
        if plan.base.is_none() && plan.price.is_none() && plan.children.is_none() {
            return None;
        }
        Some(plan)
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Identifiers that are not collectible or were synchronized inside the
    /// freshness window.
    async fn rejected_ids(&self, policy: &FreshnessPolicy) -> Result<HashSet<String>>;

    /// Persist one pass. Returns only after every write has finished.
    async fn apply(&self, plan: &SyncPlan) -> Result<()>;
}

/// Postgres-backed store on the shared pool.
#[derive(Clone)]
pub struct PgCatalogStore {
    db: Db,
    mode: SyncMode,
}

impl PgCatalogStore {
    pub fn new(db: Db, mode: SyncMode) -> Self {
        Self { db, mode }
    }

    async fn apply_transactional(&self, plan: &SyncPlan) -> Result<()> {
        let mut tx = self.db.pool.begin().await?;
        if let Some(entry) = &plan.base {
            upsert_base(&mut tx, entry).await?;
        }
        if let Some(quote) = &plan.price {
            replace_price(&mut tx, &plan.appid, quote).await?;
        }
        if let Some(children) = &plan.children {
            replace_names(&mut tx, NameTable::Developers, &plan.appid, &children.developers)
                .await?;
            replace_names(&mut tx, NameTable::Publishers, &plan.appid, &children.publishers)
                .await?;
            replace_genres(&mut tx, &plan.appid, &children.genres).await?;
            replace_names(&mut tx, NameTable::Languages, &plan.appid, &children.languages)
                .await?;
            replace_release(&mut tx, &plan.appid, children.release.as_ref()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply_concurrent(&self, plan: &SyncPlan) -> Result<()> {
        let pool = &self.db.pool;
        let appid = plan.appid.as_str();

        // base row lands before any child row of the same pass
        if let Some(entry) = &plan.base {
            let mut conn = pool.acquire().await?;
            upsert_base(&mut conn, entry).await?;
        }

        let mut jobs: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        if let Some(quote) = &plan.price {
            jobs.push(Box::pin(async move {
                let mut conn = pool.acquire().await?;
                replace_price(&mut conn, appid, quote).await
            }));
        }
        if let Some(children) = &plan.children {
            for (table, names) in [
                (NameTable::Developers, &children.developers),
                (NameTable::Publishers, &children.publishers),
                (NameTable::Languages, &children.languages),
            ] {
                jobs.push(Box::pin(async move {
                    let mut conn = pool.acquire().await?;
                    replace_names(&mut conn, table, appid, names).await
                }));
            }
            jobs.push(Box::pin(async move {
                let mut conn = pool.acquire().await?;
                replace_genres(&mut conn, appid, &children.genres).await
            }));
            jobs.push(Box::pin(async move {
                let mut conn = pool.acquire().await?;
                replace_release(&mut conn, appid, children.release.as_ref()).await
            }));
        }

        let failures: Vec<String> = join_all(jobs)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .map(|e| format!("{e:#}"))
            .collect();
        if !failures.is_empty() {
            bail!(
                "{} child write(s) failed for {}: {}",
                failures.len(),
                appid,
                failures.join("; ")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self, policy))]
    async fn rejected_ids(&self, policy: &FreshnessPolicy) -> Result<HashSet<String>> {
        let cutoff = policy.cutoff(Utc::now())?;
        let ids: Vec<String> = sqlx::query_scalar(
            r#"SELECT appid FROM apps WHERE "type" <> ALL($1) OR update_time > $2"#,
        )
        .bind(&policy.collectible_types)
        .bind(cutoff)
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    #[instrument(skip(self, plan), fields(appid = %plan.appid))]
    async fn apply(&self, plan: &SyncPlan) -> Result<()> {
        match self.mode {
            SyncMode::Transactional => self.apply_transactional(plan).await,
            SyncMode::Concurrent => self.apply_concurrent(plan).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameTable {
    Developers,
    Publishers,
    Languages,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Developers => "developers",
            NameTable::Publishers => "publishers",
            NameTable::Languages => "languages",
        }
    }
}

async fn upsert_base(conn: &mut PgConnection, entry: &CatalogEntry) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO apps (appid, name, "type", recommendations, is_free, update_time)
           VALUES ($1, $2, $3, $4, $5, now())
           ON CONFLICT (appid) DO UPDATE
           SET name = EXCLUDED.name,
               "type" = EXCLUDED."type",
               recommendations = EXCLUDED.recommendations,
               is_free = EXCLUDED.is_free,
               update_time = now()"#,
    )
    .bind(&entry.appid)
    .bind(&entry.name)
    .bind(&entry.app_type)
    .bind(entry.recommendations)
    .bind(entry.is_free)
    .persistent(false)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_price(conn: &mut PgConnection, appid: &str, quote: &PriceQuote) -> Result<()> {
    sqlx::query("DELETE FROM prices WHERE appid = $1 AND currency = $2")
        .bind(appid)
        .bind(&quote.currency)
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        r#"INSERT INTO prices (appid, currency, "initial", "final", discount_percent)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(appid)
    .bind(&quote.currency)
    .bind(&quote.initial)
    .bind(&quote.final_amount)
    .bind(quote.discount_percent)
    .persistent(false)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn replace_names(
    conn: &mut PgConnection,
    table: NameTable,
    appid: &str,
    names: &[String],
) -> Result<()> {
    let table = table.table();
    sqlx::query(&format!("DELETE FROM {table} WHERE appid = $1"))
        .bind(appid)
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    if names.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("INSERT INTO {table} (appid, name) "));
    qb.push_values(names, |mut b, name| {
        b.push_bind(appid).push_bind(name);
    });
    qb.build().persistent(false).execute(&mut *conn).await?;
    debug!(table, appid, rows = names.len(), "replaced child rows");
    Ok(())
}

async fn replace_genres(conn: &mut PgConnection, appid: &str, genres: &[Genre]) -> Result<()> {
    sqlx::query("DELETE FROM genres WHERE appid = $1")
        .bind(appid)
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    if genres.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("INSERT INTO genres (appid, name, id) ");
    qb.push_values(genres, |mut b, genre| {
        b.push_bind(appid).push_bind(&genre.name).push_bind(genre.id);
    });
    qb.build().persistent(false).execute(&mut *conn).await?;
    Ok(())
}

async fn replace_release(
    conn: &mut PgConnection,
    appid: &str,
    release: Option<&ReleaseInfo>,
) -> Result<()> {
    sqlx::query("DELETE FROM releases WHERE appid = $1")
        .bind(appid)
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    if let Some(release) = release {
        sqlx::query(r#"INSERT INTO releases (appid, comming_soon, "date") VALUES ($1, $2, $3)"#)
            .bind(appid)
            .bind(release.coming_soon)
            .bind(&release.date)
            .persistent(false)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::steam::models::AppDetails;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn half_life() -> DetailResponse {
        DetailResponse::Available(Box::new(AppDetails {
            entry: CatalogEntry {
                appid: "70".into(),
                name: "Half-Life".into(),
                app_type: "game".into(),
                recommendations: 500000,
                is_free: false,
            },
            price: Some(PriceQuote {
                currency: "USD".into(),
                initial: BigDecimal::from_str("9.99").unwrap(),
                final_amount: BigDecimal::from_str("9.99").unwrap(),
                discount_percent: 0,
            }),
            developers: vec!["Valve".into()],
            publishers: vec!["Valve".into()],
            genres: vec![Genre { id: 1, name: "Action".into() }],
            languages: vec!["English".into()],
            release: Some(ReleaseInfo {
                date: "8 Nov, 1998".into(),
                coming_soon: false,
            }),
        }))
    }

    #[test]
    fn primary_success_writes_everything() {
        let plan = SyncPlan::for_pass("70", &half_life(), RegionRole::Primary, false).unwrap();
        assert_eq!(plan.base.as_ref().unwrap().name, "Half-Life");
        assert_eq!(plan.price.as_ref().unwrap().currency, "USD");
        let children = plan.children.unwrap();
        assert_eq!(children.developers, vec!["Valve"]);
        assert!(children.release.is_some());
    }

    #[test]
    fn secondary_success_writes_price_only() {
        let plan = SyncPlan::for_pass("70", &half_life(), RegionRole::Secondary, true).unwrap();
        assert!(plan.base.is_none());
        assert!(plan.children.is_none());
        assert!(plan.price.is_some());
    }

    #[test]
    fn primary_failure_is_a_tombstone() {
        let plan =
            SyncPlan::for_pass("20", &DetailResponse::Unavailable, RegionRole::Primary, false)
                .unwrap();
        assert_eq!(plan.base, Some(CatalogEntry::tombstone("20")));
        assert!(plan.price.is_none());
        assert!(plan.children.is_none());
    }

    #[test]
    fn nothing_to_write() {
        assert!(
            SyncPlan::for_pass("1", &DetailResponse::NoData, RegionRole::Primary, false).is_none()
        );
        assert!(
            SyncPlan::for_pass("1", &DetailResponse::Unavailable, RegionRole::Secondary, false)
                .is_none()
        );
        let DetailResponse::Available(mut free) = half_life() else {
            unreachable!()
        };
        free.price = None;
        assert!(SyncPlan::for_pass(
            "70",
            &DetailResponse::Available(free),
            RegionRole::Secondary,
            true
        )
        .is_none());
    }

    #[test]
    fn secondary_without_base_writes_its_entry_first() {
        let plan = SyncPlan::for_pass("70", &half_life(), RegionRole::Secondary, false).unwrap();
        assert_eq!(plan.base.as_ref().unwrap().name, "Half-Life");
        assert_eq!(plan.price.as_ref().unwrap().currency, "USD");
        assert!(plan.children.is_none());
    }

    #[test]
    fn role_by_index() {
        assert_eq!(RegionRole::for_index(0), RegionRole::Primary);
        assert_eq!(RegionRole::for_index(3), RegionRole::Secondary);
    }
}
