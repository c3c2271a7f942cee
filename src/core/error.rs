//! Error types for the automation core

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop the automation loop.
///
/// All variants are fatal: the loop never swallows one of these. Recoverable
/// conditions (a worker that exits by itself, a stubborn worker during
/// termination) are handled inside the supervisor and control loop and never
/// reach this type unless they exhaust their retry budget.
#[derive(Error, Debug)]
pub enum Error {
    /// The configured miner has no row in the catalog
    #[error("Unable to locate this miner in the database: {0}")]
    MinerNotFound(String),

    /// Nothing could be scored, usually because no statistics were collected yet
    #[error(
        "Could not determine an optimization for miner {miner_id}. Load pool statistics \
         and miner statistics before starting automation."
    )]
    NoViableOptimization { miner_id: i64 },

    /// A combination points at a software or algorithm row that does not exist
    #[error("Miner software algo has a bad software or algo link: {0}")]
    DanglingCombination(i64),

    /// No executable path is registered for the software on this miner
    #[error("No file path found for miner software: {0}")]
    NoSoftwarePath(String),

    /// No pool serves the algorithm
    #[error("No pool found for algorithm {0}")]
    NoPool(i64),

    /// The OS refused to start the worker
    #[error("Unable to start mining software {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker survived every termination attempt
    #[error("Unable to close inferior process {pid} after {attempts} attempts")]
    Unkillable { pid: u32, attempts: u32 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors, including failed commits
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results using the core error type.
pub type Result<T> = std::result::Result<T, Error>;
