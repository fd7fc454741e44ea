//! Critical CSS result CRUD operations.

use super::connection::ResultStore;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A persisted critical CSS result for one page URL.
///
/// Timestamps are RFC 3339 strings as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CriticalCssRecord {
    pub url: String,
    pub css: String,
    pub original_bytes: i64,
    pub critical_bytes: i64,
    /// `lastmod` of the page when the result was generated, if known.
    pub source_last_modified: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CriticalCssRecord {
    pub fn new(
        url: impl Into<String>, css: impl Into<String>, original_bytes: u64, critical_bytes: u64,
        source_last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            url: url.into(),
            css: css.into(),
            original_bytes: original_bytes as i64,
            critical_bytes: critical_bytes as i64,
            source_last_modified: source_last_modified.map(|ts| ts.to_rfc3339()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Parsed `source_last_modified`; unparsable values read as absent.
    pub fn source_last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.source_last_modified
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

const SELECT_COLUMNS: &str =
    "SELECT url, css, original_bytes, critical_bytes, source_last_modified, created_at, updated_at FROM critical_css";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CriticalCssRecord> {
    Ok(CriticalCssRecord {
        url: row.get(0)?,
        css: row.get(1)?,
        original_bytes: row.get(2)?,
        critical_bytes: row.get(3)?,
        source_last_modified: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl ResultStore {
    /// Insert or replace the result for `record.url`.
    ///
    /// `created_at` of an existing row is preserved.
    pub async fn upsert_result(&self, record: &CriticalCssRecord) -> Result<(), Error> {
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO critical_css (
                        url, css, original_bytes, critical_bytes, source_last_modified, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(url) DO UPDATE SET
                        css = excluded.css,
                        original_bytes = excluded.original_bytes,
                        critical_bytes = excluded.critical_bytes,
                        source_last_modified = excluded.source_last_modified,
                        updated_at = excluded.updated_at",
                    params![
                        &record.url,
                        &record.css,
                        record.original_bytes,
                        record.critical_bytes,
                        &record.source_last_modified,
                        &record.created_at,
                        &record.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get the stored result for `url`, if any.
    pub async fn get_result(&self, url: &str) -> Result<Option<CriticalCssRecord>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CriticalCssRecord>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE url = ?1"))?;
                match stmt.query_row(params![url], row_to_record) {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the result for `url`. Returns whether a row existed.
    pub async fn delete_result(&self, url: &str) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM critical_css WHERE url = ?1", params![url])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Most recently updated results first.
    pub async fn list_results(&self, limit: Option<usize>) -> Result<Vec<CriticalCssRecord>, Error> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.conn
            .call(move |conn| -> Result<Vec<CriticalCssRecord>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY updated_at DESC, url ASC LIMIT ?1"))?;
                let rows = stmt.query_map(params![limit], row_to_record)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every stored result. Returns the number removed.
    pub async fn clear_results(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM critical_css", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Decide whether `url` should be regenerated given its sitemap `lastmod`.
    pub async fn needs_regeneration(
        &self, url: &str, lastmod: Option<DateTime<Utc>>, force: bool,
    ) -> Result<bool, Error> {
        if force {
            return Ok(true);
        }
        let existing = self.get_result(url).await?;
        Ok(regeneration_due(existing.as_ref(), lastmod))
    }
}

fn regeneration_due(existing: Option<&CriticalCssRecord>, lastmod: Option<DateTime<Utc>>) -> bool {
    let Some(record) = existing else {
        return true;
    };
    let Some(lastmod) = lastmod else {
        return false;
    };
    match record.source_last_modified_at() {
        Some(stored) => lastmod > stored,
        None => true,
    }
}
