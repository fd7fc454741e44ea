//! Result store schema.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! upgrade step runs in one transaction together with its version bump, so a
//! failed step leaves the database at the previous version.

use tokio_rusqlite::{Connection, rusqlite};

use crate::Error;

struct Upgrade {
    version: u32,
    sql: &'static str,
}

const UPGRADES: &[Upgrade] = &[Upgrade { version: 1, sql: include_str!("../../migrations/001_critical_css.sql") }];

fn latest() -> u32 {
    UPGRADES.last().map_or(0, |u| u.version)
}

/// Bring the schema up to date and return the resulting version.
///
/// A database written by a newer build is refused rather than downgraded.
pub async fn run(conn: &Connection) -> Result<u32, Error> {
    conn.call(upgrade).await.map_err(Error::from)
}

fn upgrade(conn: &mut rusqlite::Connection) -> Result<u32, Error> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let latest = latest();
    if current > latest {
        return Err(Error::MigrationFailed(format!(
            "result store schema version {current} is newer than supported version {latest}"
        )));
    }

    for step in UPGRADES.iter().filter(|u| u.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        tx.commit()?;
        tracing::info!(version = step.version, "result store schema upgraded");
    }

    Ok(latest)
}
