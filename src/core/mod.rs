//! Core module - Selection, launch building, process supervision and the control loop

mod automation;
pub mod error;
mod launch;
mod miner;
pub mod notify;
mod process;
pub mod retry;
pub mod selector;
pub mod settings;

/// Seconds between liveness checks
pub const TICK_SECS: u64 = 30;

pub use automation::{Automation, Tick};
pub use error::{Error, Result};
pub use launch::{switch_combination, LaunchContext, PoolUrls, StratumPoolUrls};
pub use miner::{
    Algorithm, Combination, LaunchSpec, Miner, ScoredCombination, ScoringMode, Software,
};
pub use notify::{notify_best_effort, report_fatal, Notifier, TracingNotifier};
pub use process::{OsProcesses, ProcessBackend, Supervisor, WorkerState};
pub use retry::{BoundedRetry, Sleeper, ThreadSleeper};
pub use settings::{Config, EmailSettings};
