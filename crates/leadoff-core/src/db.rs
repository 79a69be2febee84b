// SQLite persistence layer for the alert log and the watchlist.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::alerts::{AlertRecord, AlertStore};
use crate::names::normalize_name;
use crate::snapshot::GameId;

/// SQLite-backed persistence for alert records and watched player names.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = FULL;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS alerts (
                seq           INTEGER NOT NULL,
                game_id       INTEGER NOT NULL,
                target_inning INTEGER NOT NULL,
                batter_id     INTEGER NOT NULL,
                batter_name   TEXT NOT NULL,
                team_name     TEXT NOT NULL,
                detected_at   TEXT NOT NULL,
                outcome       TEXT,
                PRIMARY KEY (game_id, target_inning, batter_id)
            );

            CREATE TABLE IF NOT EXISTS watchlist (
                normalized   TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                added_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection. A poisoned lock still guards a
    /// usable connection; every write is a single statement or transaction.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Load every persisted alert in the order it was recorded.
    pub fn load_alerts(&self) -> Result<Vec<AlertRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT game_id, target_inning, batter_id, batter_name, team_name, detected_at, outcome
                 FROM alerts ORDER BY seq",
            )
            .context("failed to prepare load_alerts query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .context("failed to query alerts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map alert rows")?;

        rows.into_iter()
            .map(
                |(game_id, target_inning, batter_id, batter_name, team_name, detected_at, outcome)| {
                    let detected_at = DateTime::parse_from_rfc3339(&detected_at)
                        .with_context(|| format!("invalid detected_at timestamp {detected_at:?}"))?
                        .with_timezone(&Utc);
                    Ok(AlertRecord {
                        game_id: GameId(game_id as u64),
                        target_inning,
                        batter_id: batter_id as u64,
                        batter_name,
                        team_name,
                        detected_at,
                        outcome,
                    })
                },
            )
            .collect()
    }

    /// Replace the whole alert log in one transaction. Either the new list
    /// is fully written or the previous list is left intact.
    pub fn replace_alerts(&self, records: &[AlertRecord]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM alerts", [])
            .context("failed to delete previous alerts")?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO alerts
                        (seq, game_id, target_inning, batter_id, batter_name, team_name, detected_at, outcome)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .context("failed to prepare alert insert")?;
            for (seq, record) in records.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    record.game_id.0 as i64,
                    record.target_inning,
                    record.batter_id as i64,
                    record.batter_name,
                    record.team_name,
                    record.detected_at.to_rfc3339(),
                    record.outcome,
                ])
                .context("failed to insert alert")?;
            }
        }
        tx.commit().context("failed to commit alert log")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Watchlist
    // ------------------------------------------------------------------

    /// Watched display names, oldest first.
    pub fn load_watchlist(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT display_name FROM watchlist ORDER BY rowid")
            .context("failed to prepare load_watchlist query")?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query watchlist")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map watchlist rows")?;
        Ok(names)
    }

    /// Add a watched name. Returns `false` if an equivalent name (after
    /// normalization) is already present.
    pub fn add_watch(&self, display_name: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO watchlist (normalized, display_name) VALUES (?1, ?2)",
                params![normalize_name(display_name), display_name.trim()],
            )
            .context("failed to add watchlist entry")?;
        Ok(changed > 0)
    }

    /// Remove a watched name. Returns `false` if it was not present.
    pub fn remove_watch(&self, display_name: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "DELETE FROM watchlist WHERE normalized = ?1",
                params![normalize_name(display_name)],
            )
            .context("failed to remove watchlist entry")?;
        Ok(changed > 0)
    }
}

impl AlertStore for Database {
    fn load(&self) -> Result<Vec<AlertRecord>> {
        self.load_alerts()
    }

    fn save_all(&self, records: &[AlertRecord]) -> Result<()> {
        self.replace_alerts(records)
    }
}
