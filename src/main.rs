//! Automate - Keep the most profitable mining software running
//!
//! Supervises one mining process for one miner and periodically switches it
//! to the software/algorithm combination with the best expected profit, as
//! measured by the statistics collectors sharing its database.

mod core;
mod persistence;
mod platform;

use std::path::PathBuf;

use anyhow::{Context, Result};
use single_instance::SingleInstance;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{
    report_fatal, Automation, Config, LaunchContext, OsProcesses, StratumPoolUrls,
    Supervisor, ThreadSleeper, TracingNotifier,
};
use crate::persistence::Database;

/// Application name constant
pub const APP_NAME: &str = "Automate";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    init_logging();

    info!("{} v{} starting...", APP_NAME, APP_VERSION);

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config file {:?}", config_path))?;
    info!("Configuration loaded from {:?}", config_path);

    if config.reboot_on_failure {
        info!("rebootOnFailure is set, but host reboots are not performed");
    }

    // Two supervisors for one miner would fight over the active combination
    let instance = SingleInstance::new(&format!("automate-{}", config.miner_name))
        .map_err(|e| anyhow::anyhow!("Failed to create single instance lock: {}", e))?;
    if !instance.is_single() {
        anyhow::bail!(
            "Another {} is already supervising miner '{}'",
            APP_NAME,
            config.miner_name
        );
    }

    let db = Database::open(&config.database)?;
    db.initialize()?;

    let notifier = TracingNotifier::new(config.email.clone());
    let ctx = LaunchContext {
        config: &config,
        notifier: &notifier,
        pool_urls: &StratumPoolUrls,
    };
    let supervisor = Supervisor::new(OsProcesses::new(), ThreadSleeper);

    // The worker is killed when the automation is dropped on the way out
    let outcome = Automation::start(&db, ctx, supervisor)
        .and_then(|mut automation| automation.run().map(|never| match never {}));

    if let Err(e) = outcome {
        report_fatal(&config, &notifier, &e);
        return Err(e.into());
    }

    Ok(())
}

/// Initialize the logging system
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("automate=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
