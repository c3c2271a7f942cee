//! SQLite access to the shared miner statistics database

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use crate::core::error::Result;
use crate::core::{Algorithm, Combination, Miner, Software};

/// A pool serving one algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub id: i64,
    pub algorithm_id: i64,
    pub url: String,
    pub port: i64,
}

/// Database wrapper for the statistics store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database shared with the statistics collectors
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // The collectors write concurrently; WAL keeps our reads from blocking them
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;

        info!("Database opened at {:?}", path);
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Create any missing tables. Existing tables are left untouched.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS algorithms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS miner_softwares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                algo_param TEXT NOT NULL DEFAULT '',
                pool_param TEXT NOT NULL DEFAULT '',
                wallet_param TEXT NOT NULL DEFAULT '',
                password_param TEXT NOT NULL DEFAULT '',
                other_params TEXT NOT NULL DEFAULT ''
            );

            -- Software/algorithm pairings
            CREATE TABLE IF NOT EXISTS miner_software_algos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                miner_software_id INTEGER NOT NULL,
                algorithm_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                extra_params TEXT,
                do_not_use INTEGER
            );

            CREATE TABLE IF NOT EXISTS miners (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                miner_software_algo_id INTEGER,
                send_email INTEGER,
                last_check_in TEXT,
                offline_notice_sent INTEGER NOT NULL DEFAULT 0
            );

            -- Executable location of each software on each miner
            CREATE TABLE IF NOT EXISTS miner_miner_softwares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                miner_id INTEGER NOT NULL,
                miner_software_id INTEGER NOT NULL,
                file_path TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS miner_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                miner_id INTEGER NOT NULL,
                miner_software_id INTEGER NOT NULL,
                algorithm_id INTEGER NOT NULL,
                work_per_second REAL NOT NULL,
                mh_factor REAL NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pools (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL DEFAULT '',
                algorithm_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                port INTEGER NOT NULL,
                mh_factor REAL NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS coin_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                price REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pool_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pool_id INTEGER NOT NULL,
                coin_price_id INTEGER NOT NULL,
                profit_estimate REAL NOT NULL DEFAULT 0,
                profit_actual24_hours REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_miner_stats_triple
                ON miner_stats (miner_id, miner_software_id, algorithm_id);
            CREATE INDEX IF NOT EXISTS idx_pool_stats_pool ON pool_stats (pool_id);
            "#,
        )?;

        info!("Database schema verified");
        Ok(())
    }

    /// Read-only access for queries that need no transaction
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction. It rolls back when dropped without [`StoreTx::commit`].
    pub fn begin(&self) -> Result<StoreTx<'_>> {
        Ok(StoreTx {
            tx: self.conn.unchecked_transaction()?,
        })
    }

    /// Look up a miner by id outside of any transaction
    pub fn miner(&self, id: i64) -> Result<Option<Miner>> {
        query_miner(&self.conn, "WHERE id = ?1", params![id])
    }

    /// Look up a miner by name outside of any transaction
    pub fn miner_by_name(&self, name: &str) -> Result<Option<Miner>> {
        query_miner(&self.conn, "WHERE name = ?1", params![name])
    }

    /// Store a check-in instant showing the miner is still active
    pub fn record_check_in(&self, miner_id: i64, at: DateTime<Utc>) -> Result<()> {
        let tx = self.begin()?;
        tx.record_check_in(miner_id, at)?;
        tx.commit()
    }
}

/// Scoped read/write access to the store
///
/// Dropping a `StoreTx` without committing rolls back every write made
/// through it.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn miner(&self, id: i64) -> Result<Option<Miner>> {
        query_miner(&self.tx, "WHERE id = ?1", params![id])
    }

    pub fn software(&self, id: i64) -> Result<Option<Software>> {
        let software = self
            .tx
            .query_row(
                "SELECT id, name, algo_param, pool_param, wallet_param, password_param, other_params \
                 FROM miner_softwares WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Software {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        algo_param: row.get(2)?,
                        pool_param: row.get(3)?,
                        wallet_param: row.get(4)?,
                        password_param: row.get(5)?,
                        other_params: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(software)
    }

    pub fn algorithm(&self, id: i64) -> Result<Option<Algorithm>> {
        let algorithm = self
            .tx
            .query_row(
                "SELECT id, name FROM algorithms WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Algorithm {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(algorithm)
    }

    /// Executable path registered for a software on a miner
    pub fn software_path(&self, miner_id: i64, software_id: i64) -> Result<Option<PathBuf>> {
        let path: Option<String> = self
            .tx
            .query_row(
                "SELECT file_path FROM miner_miner_softwares \
                 WHERE miner_id = ?1 AND miner_software_id = ?2 ORDER BY id DESC LIMIT 1",
                params![miner_id, software_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Pool serving an algorithm
    pub fn pool_for_algorithm(&self, algorithm_id: i64) -> Result<Option<Pool>> {
        let pool = self
            .tx
            .query_row(
                "SELECT id, algorithm_id, url, port FROM pools \
                 WHERE algorithm_id = ?1 ORDER BY id LIMIT 1",
                params![algorithm_id],
                |row| {
                    Ok(Pool {
                        id: row.get(0)?,
                        algorithm_id: row.get(1)?,
                        url: row.get(2)?,
                        port: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(pool)
    }

    /// Record a new active combination and clear the offline notice
    pub fn set_active_combination(&self, miner_id: i64, combination_id: i64) -> Result<()> {
        self.tx.execute(
            "UPDATE miners SET miner_software_algo_id = ?1, offline_notice_sent = 0 WHERE id = ?2",
            params![combination_id, miner_id],
        )?;
        debug!(
            "Miner {} active combination set to {}",
            miner_id, combination_id
        );
        Ok(())
    }

    pub fn record_check_in(&self, miner_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.tx.execute(
            "UPDATE miners SET last_check_in = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), miner_id],
        )?;
        Ok(())
    }

    /// Commit every write made through this transaction
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn query_miner(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Miner>> {
    let sql = format!(
        "SELECT id, name, miner_software_algo_id, send_email, last_check_in, offline_notice_sent \
         FROM miners {}",
        filter
    );
    let miner = conn.query_row(&sql, params, miner_from_row).optional()?;
    Ok(miner)
}

fn miner_from_row(row: &Row<'_>) -> rusqlite::Result<Miner> {
    let last_check_in: Option<String> = row.get(4)?;
    Ok(Miner {
        id: row.get(0)?,
        name: row.get(1)?,
        active_combination_id: row.get(2)?,
        send_email: row.get(3)?,
        last_check_in: last_check_in
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
        offline_notice_sent: row.get(5)?,
    })
}
