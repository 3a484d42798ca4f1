use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::fmt::Write as _;

use crate::util::db::{is_undefined_table_error, Db};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Force whether recently synced apps should be displayed (defaults to env RECENT_APPS).
    pub show_recent_apps: Option<bool>,
    /// Override the recent apps LIMIT (defaults to env RECENT_APPS_LIMIT or 20).
    pub recent_apps_limit: Option<i64>,
}

pub async fn run(db: &Db, cfg: DbCountsConfig) -> Result<()> {
    let counts = db.table_counts().await?;
    println!("{}", render_counts(&counts));

    let per_currency = match sqlx::query(
        "SELECT currency, count(*) AS n FROM prices GROUP BY currency ORDER BY currency",
    )
    .persistent(false)
    .fetch_all(&db.pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) if is_undefined_table_error(&e) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    if !per_currency.is_empty() {
        let mut out = String::new();
        writeln!(out, "prices by currency:").ok();
        for row in per_currency {
            let currency: String = row.try_get("currency")?;
            let n: i64 = row.try_get("n")?;
            writeln!(out, "  {currency}: {n}").ok();
        }
        println!("{}", out);
    }

    let show_recent = cfg
        .show_recent_apps
        .unwrap_or_else(|| env_util::env_flag("RECENT_APPS", false));
    if show_recent {
        let limit = cfg
            .recent_apps_limit
            .unwrap_or_else(|| env_util::env_parse("RECENT_APPS_LIMIT", 20i64));
        let rows = sqlx::query(
            r#"SELECT appid, name, "type", update_time FROM apps ORDER BY update_time DESC LIMIT $1"#,
        )
        .bind(limit)
        .persistent(false)
        .fetch_all(&db.pool)
        .await?;
        let mut out = String::new();
        writeln!(out, "recently synced apps (limit {limit}):").ok();
        for row in rows {
            let appid: String = row.try_get("appid")?;
            let name: String = row.try_get("name")?;
            let app_type: String = row.try_get("type")?;
            let updated: DateTime<Utc> = row.try_get("update_time")?;
            let shown = if app_type.is_empty() { "<unavailable>" } else { name.as_str() };
            writeln!(out, "  {appid} [{app_type}] {shown} @ {}", updated.to_rfc3339()).ok();
        }
        println!("{}", out);
    }
    Ok(())
}

pub fn render_counts(counts: &[(&str, i64)]) -> String {
    let mut out = String::new();
    writeln!(out, "DB COUNTS SUMMARY:").ok();
    let width = counts.iter().map(|(t, _)| t.len()).max().unwrap_or(0);
    for (table, n) in counts {
        writeln!(out, "{table:<width$} : {n}").ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_aligned() {
        let out = render_counts(&[("apps", 12), ("releases", 3)]);
        assert_eq!(
            out,
            "DB COUNTS SUMMARY:\napps     : 12\nreleases : 3\n"
        );
    }
}
