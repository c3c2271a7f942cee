//! Launch spec builder - Records a combination switch and builds the command line

use chrono::Local;
use tracing::info;

use super::error::{Error, Result};
use super::miner::{Combination, LaunchSpec, Miner};
use super::notify::{notify_best_effort, Notifier};
use super::settings::Config;
use crate::persistence::{Database, StoreTx};

/// Resolves the stratum endpoint serving an algorithm
pub trait PoolUrls {
    fn pool_url(&self, tx: &StoreTx<'_>, algorithm_id: i64) -> Result<String>;
}

/// `stratum+tcp://host:port` built from the `pools` catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct StratumPoolUrls;

impl PoolUrls for StratumPoolUrls {
    fn pool_url(&self, tx: &StoreTx<'_>, algorithm_id: i64) -> Result<String> {
        let pool = tx
            .pool_for_algorithm(algorithm_id)?
            .ok_or(Error::NoPool(algorithm_id))?;
        Ok(format!("stratum+tcp://{}:{}", pool.url, pool.port))
    }
}

/// Collaborators and static settings needed to switch combinations
pub struct LaunchContext<'a> {
    pub config: &'a Config,
    pub notifier: &'a dyn Notifier,
    pub pool_urls: &'a dyn PoolUrls,
}

/// Make `combination` the miner's active one and build its launch spec
///
/// Everything happens in one transaction; any error leaves the miner record
/// as it was. `miner` is refreshed from the committed row.
pub fn switch_combination(
    db: &Database,
    miner: &mut Miner,
    combination: &Combination,
    ctx: &LaunchContext<'_>,
) -> Result<LaunchSpec> {
    let tx = db.begin()?;

    let software = tx.software(combination.software_id)?;
    let algorithm = tx.algorithm(combination.algorithm_id)?;
    let (Some(software), Some(algorithm)) = (software, algorithm) else {
        return Err(Error::DanglingCombination(combination.id));
    };
    let path = tx
        .software_path(miner.id, software.id)?
        .ok_or_else(|| Error::NoSoftwarePath(software.name.clone()))?;

    info!("Found new optimal software/algorithm...");
    let body = format!(
        "Software: {}\r\nAlgo: {}\r\nChanged: {}\r\n",
        software.name,
        algorithm.name,
        Local::now().to_rfc2822()
    );
    info!("{}", body.trim_end());

    // The email preference may have changed since startup
    let current = tx
        .miner(miner.id)?
        .ok_or_else(|| Error::MinerNotFound(miner.name.clone()))?;
    if ctx.config.email.is_configured() && current.wants_email() {
        notify_best_effort(
            ctx.notifier,
            &format!("{}: New Optimal", ctx.config.miner_name),
            &body,
        );
    }

    tx.set_active_combination(miner.id, combination.id)?;

    let pool_url = ctx.pool_urls.pool_url(&tx, combination.algorithm_id)?;

    let mut args = vec![
        software.name.clone(),
        software.algo_param.clone(),
        combination.name.clone(),
        software.pool_param.clone(),
        pool_url,
        software.wallet_param.clone(),
        ctx.config.wallet.clone(),
        software.password_param.clone(),
        ctx.config.pool_password.clone(),
    ];
    args.extend(software.other_params.split_whitespace().map(String::from));
    if let Some(extra) = combination.extra_params.as_deref() {
        args.extend(extra.split_whitespace().map(String::from));
    }

    tx.commit()?;

    *miner = Miner {
        active_combination_id: Some(combination.id),
        offline_notice_sent: false,
        ..current
    };

    Ok(LaunchSpec::new(path, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::testing::RecordingNotifier;
    use crate::core::settings::EmailSettings;
    use crate::persistence::fixtures;
    use std::path::PathBuf;

    struct Setup {
        db: Database,
        miner: Miner,
        combination: Combination,
        config: Config,
    }

    fn config(email: bool) -> Config {
        Config {
            miner_name: "rig-01".into(),
            wallet: "W".into(),
            pool_password: "x".into(),
            email: if email {
                EmailSettings {
                    server: "smtp.example.com".into(),
                    to: "ops@example.com".into(),
                    ..Default::default()
                }
            } else {
                EmailSettings::default()
            },
            ..Default::default()
        }
    }

    fn setup(send_email: Option<bool>, other: &str, extra: Option<&str>) -> Setup {
        let db = fixtures::store();
        let miner_id = fixtures::miner(&db, "rig-01", send_email);
        let x17 = fixtures::algorithm(&db, "x17");
        let sw = fixtures::software(&db, "worker", other);
        fixtures::software_path(&db, miner_id, sw, "/bin/worker");
        fixtures::pool(&db, x17, "p", 3333, 1.0);
        let combo_id = fixtures::combination(&db, sw, x17, "x17", extra);
        let combination = Combination {
            id: combo_id,
            software_id: sw,
            algorithm_id: x17,
            name: "x17".into(),
            extra_params: extra.map(String::from),
            do_not_use: None,
        };
        let miner = db.miner(miner_id).unwrap().unwrap();
        Setup {
            db,
            miner,
            combination,
            config: config(true),
        }
    }

    fn switch(s: &mut Setup, notifier: &RecordingNotifier) -> Result<LaunchSpec> {
        let ctx = LaunchContext {
            config: &s.config,
            notifier,
            pool_urls: &StratumPoolUrls,
        };
        switch_combination(&s.db, &mut s.miner, &s.combination, &ctx)
    }

    #[test]
    fn builds_arguments_in_fixed_order() {
        let mut s = setup(None, "", None);
        let spec = switch(&mut s, &RecordingNotifier::default()).unwrap();

        assert_eq!(spec.path, PathBuf::from("/bin/worker"));
        assert_eq!(
            spec.args,
            [
                "worker",
                "--algo",
                "x17",
                "--pool",
                "stratum+tcp://p:3333",
                "--wallet",
                "W",
                "--pass",
                "x"
            ]
        );
    }

    #[test]
    fn software_then_combination_extras_are_appended() {
        let mut s = setup(None, "--api  127.0.0.1:4067 ", Some("--intensity 21"));
        let spec = switch(&mut s, &RecordingNotifier::default()).unwrap();

        assert_eq!(
            &spec.args[9..],
            ["--api", "127.0.0.1:4067", "--intensity", "21"]
        );
    }

    #[test]
    fn switch_is_persisted_and_reflected_on_the_miner() {
        let mut s = setup(None, "", None);
        switch(&mut s, &RecordingNotifier::default()).unwrap();

        assert_eq!(s.miner.active_combination_id, Some(s.combination.id));
        let stored = s.db.miner(s.miner.id).unwrap().unwrap();
        assert_eq!(stored.active_combination_id, Some(s.combination.id));
        assert!(!stored.offline_notice_sent);
    }

    #[test]
    fn notifies_only_when_miner_and_config_allow() {
        let mut s = setup(Some(true), "", None);
        let notifier = RecordingNotifier::default();
        switch(&mut s, &notifier).unwrap();
        assert_eq!(notifier.subjects(), vec!["rig-01: New Optimal"]);
        let (_, body) = notifier.sent.borrow()[0].clone();
        assert!(body.starts_with("Software: worker\r\nAlgo: x17\r\nChanged: "));

        let mut s = setup(Some(false), "", None);
        let notifier = RecordingNotifier::default();
        switch(&mut s, &notifier).unwrap();
        assert!(notifier.subjects().is_empty());

        let mut s = setup(Some(true), "", None);
        s.config = config(false);
        let notifier = RecordingNotifier::default();
        switch(&mut s, &notifier).unwrap();
        assert!(notifier.subjects().is_empty());
    }

    #[test]
    fn preference_is_reread_from_the_store() {
        let mut s = setup(Some(false), "", None);
        // Stale in-memory copy says yes, the row says no
        s.miner.send_email = Some(true);
        let notifier = RecordingNotifier::default();
        switch(&mut s, &notifier).unwrap();
        assert!(notifier.subjects().is_empty());
        assert_eq!(s.miner.send_email, Some(false));
    }

    #[test]
    fn notification_failure_does_not_abort_the_switch() {
        let mut s = setup(Some(true), "", None);
        let spec = switch(&mut s, &RecordingNotifier::failing()).unwrap();
        assert_eq!(spec.args[0], "worker");
        assert_eq!(
            s.db.miner(s.miner.id).unwrap().unwrap().active_combination_id,
            Some(s.combination.id)
        );
    }

    #[test]
    fn dangling_link_is_fatal_and_nothing_is_written() {
        let mut s = setup(None, "", None);
        s.combination.algorithm_id = 999;
        let err = switch(&mut s, &RecordingNotifier::default()).unwrap_err();
        assert!(matches!(err, Error::DanglingCombination(id) if id == s.combination.id));
        assert_eq!(
            s.db.miner(s.miner.id).unwrap().unwrap().active_combination_id,
            None
        );
    }

    #[test]
    fn missing_file_path_is_fatal() {
        let mut s = setup(None, "", None);
        let other = fixtures::software(&s.db, "lolminer", "");
        s.combination.software_id = other;
        let err = switch(&mut s, &RecordingNotifier::default()).unwrap_err();
        assert!(matches!(err, Error::NoSoftwarePath(name) if name == "lolminer"));
    }

    #[test]
    fn missing_pool_rolls_back_the_switch() {
        let mut s = setup(None, "", None);
        let sha = fixtures::algorithm(&s.db, "sha256");
        s.combination.algorithm_id = sha;
        let err = switch(&mut s, &RecordingNotifier::default()).unwrap_err();
        assert!(matches!(err, Error::NoPool(id) if id == sha));
        assert_eq!(
            s.db.miner(s.miner.id).unwrap().unwrap().active_combination_id,
            None
        );
        assert_eq!(s.miner.active_combination_id, None);
    }
}
