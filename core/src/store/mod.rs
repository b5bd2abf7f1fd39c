//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods and never execute SQL directly.
//!
//! All writes made while processing one sol land in a single
//! transaction (`begin_sol` / `commit_sol`). A run may work against an
//! in-memory database and periodically `backup_to` a file.

mod commodity;
mod events;
mod population;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension};

use crate::{error::SimResult, types::Sol};

pub struct SimStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // Shared-memory URIs report "memory" here rather than failing.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests and fast runs).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_kernel.sql"))?;
        Ok(())
    }

    // ── Per-sol transaction ────────────────────────────────────

    pub fn begin_sol(&self) -> SimResult<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit_sol(&self) -> SimResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_sol(&self) -> SimResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Nest one event's writes so they can be dropped on failure.
    pub fn begin_event(&self) -> SimResult<()> {
        self.conn.execute_batch("SAVEPOINT event")?;
        Ok(())
    }

    pub fn release_event(&self) -> SimResult<()> {
        self.conn.execute_batch("RELEASE event")?;
        Ok(())
    }

    pub fn rollback_event(&self) -> SimResult<()> {
        self.conn.execute_batch("ROLLBACK TO event; RELEASE event")?;
        Ok(())
    }

    /// Copy the whole database to `path`. Used to flush an in-memory
    /// working copy to durable storage.
    pub fn backup_to(&self, path: &str) -> SimResult<()> {
        self.conn.backup(DatabaseName::Main, path, None)?;
        Ok(())
    }

    // ── Simulation ─────────────────────────────────────────────

    pub fn insert_simulation(
        &self,
        simulation_id: &str,
        seed: u64,
        version: &str,
        config_json: &str,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO simulation (simulation_id, seed, version, config_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![simulation_id, seed as i64, version, config_json],
        )?;
        Ok(())
    }

    pub fn simulation_config(&self, simulation_id: &str) -> SimResult<Option<String>> {
        let json = self
            .conn
            .query_row(
                "SELECT config_json FROM simulation WHERE simulation_id = ?1",
                params![simulation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json)
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, simulation_id: &str, sol: Sol, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (simulation_id, sol, state_json) VALUES (?1, ?2, ?3)",
            params![simulation_id, sol as i64, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot(&self, simulation_id: &str) -> SimResult<Option<(Sol, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT sol, state_json FROM snapshot
                 WHERE simulation_id = ?1
                 ORDER BY sol DESC LIMIT 1",
                params![simulation_id],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(result)
    }
}
