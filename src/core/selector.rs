//! Optimization selector - Ranks software/algorithm combinations by profitability

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::error::{Error, Result};
use super::miner::{Combination, ScoredCombination, ScoringMode};
use crate::persistence::Database;

/// Rows joined for every candidate:
///
/// * `average_stat` - mean work rate per miner/software/algorithm (and sample factor)
/// * `latest_stat` - newest sample per triple, anchoring the catalog rows
/// * `latest_pool_stat` - newest market snapshot per pool
const CANDIDATES: &str = r#"
    FROM miners
    INNER JOIN (
        SELECT miner_id, miner_software_id, algorithm_id, MAX(id) AS latest_stat_id
        FROM miner_stats
        WHERE miner_id = ?1
        GROUP BY miner_id, miner_software_id, algorithm_id
    ) latest_stat ON latest_stat.miner_id = miners.id
    INNER JOIN miner_stats ON miner_stats.id = latest_stat.latest_stat_id
    INNER JOIN miner_softwares ON miner_softwares.id = latest_stat.miner_software_id
    INNER JOIN algorithms ON algorithms.id = latest_stat.algorithm_id
    INNER JOIN miner_software_algos
        ON miner_software_algos.algorithm_id = algorithms.id
        AND miner_software_algos.miner_software_id = miner_softwares.id
    INNER JOIN pools ON pools.algorithm_id = algorithms.id
    INNER JOIN (
        SELECT MAX(id) AS id, pool_id FROM pool_stats GROUP BY pool_id
    ) latest_pool_stat ON latest_pool_stat.pool_id = pools.id
    INNER JOIN pool_stats ON pool_stats.id = latest_pool_stat.id
    INNER JOIN coin_prices ON coin_prices.id = pool_stats.coin_price_id
    INNER JOIN (
        SELECT miner_id, miner_software_id, algorithm_id,
               AVG(work_per_second) AS average_work, mh_factor
        FROM miner_stats
        WHERE miner_id = ?1
        GROUP BY miner_id, miner_software_id, algorithm_id, mh_factor
    ) average_stat ON average_stat.miner_id = miners.id
        AND average_stat.miner_software_id = miner_softwares.id
        AND average_stat.algorithm_id = algorithms.id
    WHERE miners.id = ?1
        AND (miner_software_algos.do_not_use IS NULL OR miner_software_algos.do_not_use = 0)
"#;

impl ScoringMode {
    /// SQL expression scoring one candidate row
    fn score_expression(&self) -> &'static str {
        match self {
            Self::Estimate => {
                "coin_prices.price * pool_stats.profit_estimate \
                 * (average_stat.average_work * average_stat.mh_factor / pools.mh_factor)"
            }
            Self::Actual24h => {
                "coin_prices.price * 0.001 * pool_stats.profit_actual24_hours \
                 * (average_stat.average_work * average_stat.mh_factor / pools.mh_factor)"
            }
        }
    }
}

/// Find the most profitable eligible combination for a miner
///
/// Fails with [`Error::NoViableOptimization`] when no combination has both
/// miner statistics and pool statistics to score against.
pub fn best_combination(
    db: &Database,
    miner_id: i64,
    mode: ScoringMode,
) -> Result<ScoredCombination> {
    let sql = format!(
        "SELECT miner_software_algos.id, miner_software_algos.miner_software_id, \
                miner_software_algos.algorithm_id, miner_software_algos.name, \
                miner_software_algos.extra_params, miner_software_algos.do_not_use, \
                CAST({score} AS REAL) AS score \
         {candidates} \
         ORDER BY score DESC \
         LIMIT 1",
        score = mode.score_expression(),
        candidates = CANDIDATES,
    );

    let best = db
        .connection()
        .query_row(&sql, params![miner_id], |row| {
            Ok(ScoredCombination {
                combination: Combination {
                    id: row.get(0)?,
                    software_id: row.get(1)?,
                    algorithm_id: row.get(2)?,
                    name: row.get(3)?,
                    extra_params: row.get(4)?,
                    do_not_use: row.get(5)?,
                },
                score: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            })
        })
        .optional()?;

    match best {
        Some(best) => {
            debug!(
                "Best combination for miner {} by {}: {} (score {})",
                miner_id,
                mode.label(),
                best.combination.id,
                best.score
            );
            Ok(best)
        }
        None => Err(Error::NoViableOptimization { miner_id }),
    }
}

/// Pick the best combination and log whether it changes what is running
pub fn select(db: &Database, miner_id: i64, mode: ScoringMode) -> Result<ScoredCombination> {
    info!("Determining optimal software/algo combination...");
    let best = best_combination(db, miner_id, mode)?;
    debug_assert!(best.combination.is_eligible());
    info!(
        "Optimal combination is {} ({}), score {:.6}",
        best.combination.id, best.combination.name, best.score
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::fixtures;
    use test_case::test_case;

    struct Catalog {
        db: Database,
        miner: i64,
        trex: i64,
        x17: i64,
        kawpow: i64,
        combo_a: i64,
        combo_b: i64,
    }

    /// Two combinations on different algorithms. With the estimate figures
    /// below, A scores 120 and B scores 95.
    fn catalog() -> Catalog {
        let db = fixtures::store();
        let miner = fixtures::miner(&db, "rig", None);
        let x17 = fixtures::algorithm(&db, "x17");
        let kawpow = fixtures::algorithm(&db, "kawpow");
        let trex = fixtures::software(&db, "t-rex", "");
        let combo_a = fixtures::combination(&db, trex, x17, "x17", None);
        let combo_b = fixtures::combination(&db, trex, kawpow, "kawpow", None);

        let pool_x17 = fixtures::pool(&db, x17, "x17.pool", 3333, 1.0);
        let pool_kawpow = fixtures::pool(&db, kawpow, "kawpow.pool", 3638, 1.0);
        // price * estimate * work: 2 * 3 * 20 = 120 and 1 * 5 * 19 = 95
        fixtures::pool_stat(&db, pool_x17, 2.0, 3.0, 1.0);
        fixtures::pool_stat(&db, pool_kawpow, 1.0, 5.0, 1000.0);

        fixtures::miner_stat(&db, miner, trex, x17, 10.0, 1.0);
        fixtures::miner_stat(&db, miner, trex, x17, 30.0, 1.0);
        fixtures::miner_stat(&db, miner, trex, kawpow, 19.0, 1.0);

        Catalog {
            db,
            miner,
            trex,
            x17,
            kawpow,
            combo_a,
            combo_b,
        }
    }

    #[test]
    fn highest_score_wins() {
        let c = catalog();
        let best = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, c.combo_a);
        assert!((best.score - 120.0).abs() < 1e-9);
    }

    #[test]
    fn ineligible_combination_is_skipped_then_no_viable_optimization() {
        let c = catalog();
        fixtures::set_do_not_use(&c.db, c.combo_a, true);
        let best = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, c.combo_b);
        assert!((best.score - 95.0).abs() < 1e-9);

        fixtures::clear_miner_stats(&c.db, c.trex, c.kawpow);
        let err = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap_err();
        assert!(matches!(err, Error::NoViableOptimization { miner_id } if miner_id == c.miner));
    }

    #[test]
    fn explicitly_eligible_flag_is_kept() {
        let c = catalog();
        fixtures::set_do_not_use(&c.db, c.combo_a, false);
        let best = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, c.combo_a);
    }

    #[test]
    fn actual_mode_uses_trailing_profit() {
        let c = catalog();
        // A: 2 * 0.001 * 1 * 20 = 0.04, B: 1 * 0.001 * 1000 * 19 = 19
        let best = best_combination(&c.db, c.miner, ScoringMode::Actual24h).unwrap();
        assert_eq!(best.combination.id, c.combo_b);
        assert!((best.score - 19.0).abs() < 1e-9);
    }

    #[test]
    fn only_latest_pool_snapshot_counts() {
        let c = catalog();
        let pool_x17 = c
            .db
            .begin()
            .unwrap()
            .pool_for_algorithm(c.x17)
            .unwrap()
            .unwrap()
            .id;
        // Market for x17 collapses: 2 * 0.5 * 20 = 20 < 95
        fixtures::pool_stat(&c.db, pool_x17, 2.0, 0.5, 1.0);
        let best = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, c.combo_b);
    }

    #[test_case(1.0, 1.0, true; "equal factors keep A ahead")]
    #[test_case(1.0, 10.0, false; "pool reports in larger units")]
    #[test_case(0.5, 1.0, false; "samples in smaller units")]
    fn normalization_factors_scale_work(sample_factor: f64, pool_factor: f64, a_wins: bool) {
        let db = fixtures::store();
        let miner = fixtures::miner(&db, "rig", None);
        let x17 = fixtures::algorithm(&db, "x17");
        let kawpow = fixtures::algorithm(&db, "kawpow");
        let sw = fixtures::software(&db, "t-rex", "");
        let a = fixtures::combination(&db, sw, x17, "x17", None);
        let b = fixtures::combination(&db, sw, kawpow, "kawpow", None);
        let pool_a = fixtures::pool(&db, x17, "a", 1, pool_factor);
        let pool_b = fixtures::pool(&db, kawpow, "b", 2, 1.0);
        fixtures::pool_stat(&db, pool_a, 1.0, 1.0, 1.0);
        fixtures::pool_stat(&db, pool_b, 1.0, 1.0, 1.0);
        fixtures::miner_stat(&db, miner, sw, x17, 100.0, sample_factor);
        fixtures::miner_stat(&db, miner, sw, kawpow, 60.0, 1.0);

        let best = best_combination(&db, miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, if a_wins { a } else { b });
    }

    #[test]
    fn selection_is_idempotent() {
        let c = catalog();
        let first = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        let second = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn other_miners_statistics_are_ignored() {
        let c = catalog();
        let other = fixtures::miner(&c.db, "other-rig", None);
        fixtures::miner_stat(&c.db, other, c.trex, c.kawpow, 1_000_000.0, 1.0);
        let best = best_combination(&c.db, c.miner, ScoringMode::Estimate).unwrap();
        assert_eq!(best.combination.id, c.combo_a);
    }

    #[test]
    fn no_statistics_is_no_viable_optimization() {
        let db = fixtures::store();
        let miner = fixtures::miner(&db, "rig", None);
        let err = best_combination(&db, miner, ScoringMode::Estimate).unwrap_err();
        assert!(matches!(err, Error::NoViableOptimization { .. }));
    }
}
