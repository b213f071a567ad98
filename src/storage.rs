//! SQLite fetch cache for upstream payloads.
//!
//! Collaborators use it to avoid hammering rate-limited sources; the scoring
//! core never reads from it.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS fetch_cache (
    cache_key TEXT PRIMARY KEY,
    cache_json TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
) WITHOUT ROWID;
"#;

pub struct FetchCache {
    conn: Mutex<Connection>,
}

impl FetchCache {
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create cache directory for {}", db_path))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open cache database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize cache schema")?;

        info!("💾 Fetch cache initialized at: {}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Cached JSON for `cache_key` if it was stored no more than `ttl_seconds` before `now`.
    pub fn get_fresh(&self, cache_key: &str, ttl_seconds: i64, now: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT cache_json, fetched_at FROM fetch_cache WHERE cache_key = ?1",
        )?;
        let mut rows = stmt.query([cache_key])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let json: String = row.get(0)?;
        let fetched_at: i64 = row.get(1)?;
        if now - fetched_at > ttl_seconds {
            return Ok(None);
        }
        Ok(Some(json))
    }

    pub fn upsert(&self, cache_key: &str, cache_json: &str, fetched_at: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO fetch_cache (cache_key, cache_json, fetched_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(cache_key) DO UPDATE SET cache_json=excluded.cache_json, fetched_at=excluded.fetched_at",
            params![cache_key, cache_json, fetched_at],
        )?;
        Ok(())
    }

    /// Flush the WAL before the process exits.
    pub fn close(&self) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
            warn!("Fetch cache checkpoint failed: {}", e);
        }
    }
}
