//! Catalog records - The miner, its software and algorithm combinations

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// The mining hardware being supervised
#[derive(Debug, Clone, PartialEq)]
pub struct Miner {
    pub id: i64,
    pub name: String,
    /// Combination currently recorded as running
    pub active_combination_id: Option<i64>,
    /// Email preference; unset means no email
    pub send_email: Option<bool>,
    pub last_check_in: Option<DateTime<Utc>>,
    pub offline_notice_sent: bool,
}

impl Miner {
    /// Whether change notifications may be emailed for this miner
    pub fn wants_email(&self) -> bool {
        self.send_email.unwrap_or(false)
    }

    /// Whether `combination` is the one already recorded as running
    pub fn is_running(&self, combination: &Combination) -> bool {
        self.active_combination_id == Some(combination.id)
    }
}

/// A mining algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct Algorithm {
    pub id: i64,
    pub name: String,
}

/// A mining program and the flag names it expects on its command line
#[derive(Debug, Clone, PartialEq)]
pub struct Software {
    pub id: i64,
    /// Display name, used as argv[0]
    pub name: String,
    pub algo_param: String,
    pub pool_param: String,
    pub wallet_param: String,
    pub password_param: String,
    /// Free-form arguments appended to every launch
    pub other_params: String,
}

/// A software/algorithm pairing that can run on a miner
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub id: i64,
    pub software_id: i64,
    pub algorithm_id: i64,
    /// Algorithm name as the software spells it
    pub name: String,
    pub extra_params: Option<String>,
    pub do_not_use: Option<bool>,
}

impl Combination {
    pub fn is_eligible(&self) -> bool {
        !self.do_not_use.unwrap_or(false)
    }
}

/// A combination together with the score that selected it
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCombination {
    pub combination: Combination,
    pub score: f64,
}

/// Which profitability figure drives the ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// Pool profit estimates
    #[default]
    Estimate,
    /// Trailing 24 hour actual profit
    Actual24h,
}

impl ScoringMode {
    pub fn from_use_estimates(use_estimates: bool) -> Self {
        if use_estimates {
            Self::Estimate
        } else {
            Self::Actual24h
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Estimate => "estimates",
            Self::Actual24h => "24 hour actuals",
        }
    }
}

/// Executable and ordered argument vector for one worker launch
///
/// `args[0]` is the display name handed to the process as argv[0].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }

    /// The name the worker sees as argv[0]
    pub fn display_name(&self) -> &str {
        self.args
            .first()
            .map(String::as_str)
            .or_else(|| self.path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or("worker")
    }

    /// Arguments after argv[0]
    pub fn arguments(&self) -> &[String] {
        self.args.get(1..).unwrap_or(&[])
    }
}
