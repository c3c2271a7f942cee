//! Control loop - Keeps the best combination running on the miner

use std::convert::Infallible;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::{Error, Result};
use super::launch::{switch_combination, LaunchContext};
use super::miner::{LaunchSpec, Miner, ScoringMode};
use super::process::{ProcessBackend, Supervisor};
use super::retry::Sleeper;
use super::selector;
use super::TICK_SECS;
use crate::persistence::Database;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Worker was alive; check-in recorded
    Heartbeat,
    /// Worker had exited and was started again with the same command line
    Respawned { pid: u32 },
    /// Optimization ran and the best combination was already running
    Unchanged,
    /// Optimization ran and the worker was switched
    Switched { pid: u32 },
}

/// The automation loop for one miner
pub struct Automation<'a, B, S> {
    db: &'a Database,
    ctx: LaunchContext<'a>,
    mode: ScoringMode,
    period_secs: u64,
    miner: Miner,
    supervisor: Supervisor<B, S>,
    spec: LaunchSpec,
    since_check_secs: u64,
}

impl<'a, B: ProcessBackend, S: Sleeper> Automation<'a, B, S> {
    /// Pick the best combination, record it and start the worker
    pub fn start(
        db: &'a Database,
        ctx: LaunchContext<'a>,
        mut supervisor: Supervisor<B, S>,
    ) -> Result<Self> {
        let mut miner = db
            .miner_by_name(&ctx.config.miner_name)?
            .ok_or_else(|| Error::MinerNotFound(ctx.config.miner_name.clone()))?;
        let mode = ctx.config.scoring_mode();
        info!(
            "Automating miner '{}' (id {}), ranking by {}",
            miner.name,
            miner.id,
            mode.label()
        );

        let best = selector::select(db, miner.id, mode)?;
        let spec = switch_combination(db, &mut miner, &best.combination, &ctx)?;
        supervisor.launch(&spec)?;

        Ok(Self {
            db,
            period_secs: ctx.config.optimization_check_time.max(TICK_SECS),
            ctx,
            mode,
            miner,
            supervisor,
            spec,
            since_check_secs: 0,
        })
    }

    #[cfg(test)]
    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    #[cfg(test)]
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    #[cfg(test)]
    pub fn supervisor(&self) -> &Supervisor<B, S> {
        &self.supervisor
    }

    #[cfg(test)]
    pub fn supervisor_mut(&mut self) -> &mut Supervisor<B, S> {
        &mut self.supervisor
    }

    /// Run ticks until a fatal error occurs
    pub fn run(&mut self) -> Result<Infallible> {
        loop {
            let tick = self.tick()?;
            debug!("Tick finished: {:?}", tick);
        }
    }

    /// Either re-optimize, when a full period has passed since the last
    /// check, or wait one tick and check on the worker.
    pub fn tick(&mut self) -> Result<Tick> {
        if self.since_check_secs > 0 && self.since_check_secs >= self.period_secs {
            self.since_check_secs = 0;
            return self.optimize();
        }

        self.supervisor
            .sleeper()
            .sleep(Duration::from_secs(TICK_SECS));
        self.since_check_secs += TICK_SECS;

        if self.supervisor.probe() {
            self.check_in();
            return Ok(Tick::Heartbeat);
        }

        info!(
            "Restarting mining software after unexpected exit (worker {})",
            self.supervisor.state().label()
        );
        let pid = self.supervisor.respawn(&self.spec)?;
        Ok(Tick::Respawned { pid })
    }

    fn optimize(&mut self) -> Result<Tick> {
        let best = selector::select(self.db, self.miner.id, self.mode)?;
        if self.miner.is_running(&best.combination) {
            debug!("Current combination is still optimal");
            return Ok(Tick::Unchanged);
        }

        info!(
            "Switching from combination {:?} to {}",
            self.miner.active_combination_id, best.combination.id
        );
        self.supervisor.terminate()?;
        self.spec = switch_combination(self.db, &mut self.miner, &best.combination, &self.ctx)?;
        let pid = self.supervisor.launch(&self.spec)?;
        Ok(Tick::Switched { pid })
    }

    /// Store a check-in instant to indicate this miner is still active
    fn check_in(&mut self) {
        let now = Utc::now();
        match self.db.record_check_in(self.miner.id, now) {
            Ok(()) => {
                self.miner.last_check_in = Some(now);
                debug!("Checked in at {}", now);
            }
            Err(e) => warn!("Failed to record check-in: {}", e),
        }
    }
}
