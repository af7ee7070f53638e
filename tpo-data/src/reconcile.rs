//! Splices the frozen historical profile with the freshly computed live profile.

use crate::{
    bar::BarSequence,
    error::DataError,
    profile::{ContextParams, DayProfile, DayRank, DistributionRow, ProfileContext, ProfileEngine},
    session::SessionState,
};
use serde::Serialize;
use tracing::debug;

/// One contiguous profile sequence plus the historical day ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledProfile {
    pub profiles: Vec<DayProfile>,
    /// Re-indexed `0..n`.
    pub distribution: Vec<DistributionRow>,
    pub ranking: DayRank,
}

impl ReconciledProfile {
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileReconciler;

impl ProfileReconciler {
    /// Historical records except the last, followed by every live record.
    ///
    /// The last historical record is the still-open period the live window supersedes.
    /// It is dropped unconditionally, so a gap between the two windows loses that day.
    pub fn reconcile(
        historical: &ProfileContext,
        live: ProfileContext,
        ranking: DayRank,
    ) -> ReconciledProfile {
        let kept = historical.profiles.len().saturating_sub(1);
        let kept_rows = historical.distribution.len().saturating_sub(1);

        let profiles: Vec<DayProfile> = historical.profiles[..kept]
            .iter()
            .cloned()
            .chain(live.profiles)
            .collect();

        let distribution: Vec<DistributionRow> = historical.distribution[..kept_rows]
            .iter()
            .cloned()
            .chain(live.distribution)
            .enumerate()
            .map(|(index, row)| DistributionRow { index, ..row })
            .collect();

        debug!(
            historical = historical.profiles.len(),
            profiles = profiles.len(),
            rows = distribution.len(),
            "reconciled historical and live profiles"
        );

        ReconciledProfile {
            profiles,
            distribution,
            ranking,
        }
    }

    /// Compute the live context over `live_bars`, rank the unchanged historical context
    /// and reconcile both. Engine failures propagate.
    pub fn refresh<Engine>(
        engine: &Engine,
        session: &SessionState,
        live_bars: &BarSequence,
        params: &ContextParams,
    ) -> Result<ReconciledProfile, DataError>
    where
        Engine: ProfileEngine + ?Sized,
    {
        let live = engine.compute_context(live_bars, params)?;
        let ranking = engine.compute_day_rank(session.historical_context())?;
        Ok(Self::reconcile(session.historical_context(), live, ranking))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bar::test_utils::series,
        config::ProfileConfig,
        profile::TpoEngine,
    };

    const HALF_HOUR_MS: i64 = 30 * 60_000;
    const DAY_MS: i64 = 86_400_000;
    // 2023-11-10 00:00:00 UTC
    const START_MS: i64 = 1_699_574_400_000;

    fn context(days: usize, start_ms: i64, tick_size: u64) -> ProfileContext {
        let bars = series(start_ms, HALF_HOUR_MS, days * 48, |i| 100.0 + (i % 9) as f64);
        let params = ContextParams {
            freq: 2,
            style: Default::default(),
            avglen: 2,
            tick_size,
            session_hours: 24,
        };
        TpoEngine.compute_context(&bars, &params).unwrap()
    }

    fn session(days: usize) -> SessionState {
        let bars = series(START_MS, HALF_HOUR_MS, days * 48, |i| 100.0 + (i % 9) as f64);
        SessionState::new("BTCUSDT", bars, &TpoEngine, &ProfileConfig::default()).unwrap()
    }

    #[test]
    fn test_reconcile_record_counts() {
        struct TestCase {
            historical: usize,
            live: usize,
            expected: usize,
        }

        let tests = vec![
            TestCase {
                // TC0: typical, one live day
                historical: 4,
                live: 1,
                expected: 4,
            },
            TestCase {
                // TC1: live window spanning midnight
                historical: 4,
                live: 2,
                expected: 5,
            },
            TestCase {
                // TC2: single historical day is fully superseded
                historical: 1,
                live: 1,
                expected: 1,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let historical = context(test.historical, START_MS, 2);
            let live_start = START_MS + (test.historical as i64 - 1) * DAY_MS;
            let live = context(test.live, live_start, 1);
            let ranking = TpoEngine.compute_day_rank(&historical).unwrap();

            let actual = ProfileReconciler::reconcile(&historical, live, ranking);
            assert_eq!(actual.len(), test.expected, "TC{} failed", index);
            assert_eq!(actual.distribution.len(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_reconcile_reindexes_and_keeps_order() {
        let historical = context(4, START_MS, 2);
        let live = context(1, START_MS + 3 * DAY_MS, 1);
        let live_first = live.profiles[0].clone();
        let ranking = TpoEngine.compute_day_rank(&historical).unwrap();

        let actual = ProfileReconciler::reconcile(&historical, live, ranking.clone());

        let indices: Vec<usize> = actual.distribution.iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(&actual.profiles[..3], &historical.profiles[..3]);
        assert_eq!(actual.profiles[3], live_first);
        assert_eq!(actual.ranking, ranking);
    }

    #[test]
    fn test_refresh_ranks_historical_context() {
        let session = session(4);
        let live_bars = series(START_MS + 3 * DAY_MS, HALF_HOUR_MS, 20, |i| 200.0 + i as f64);
        let params = session.params().with_tick_size(1);

        let actual = ProfileReconciler::refresh(&TpoEngine, &session, &live_bars, &params).unwrap();

        let expected_ranking = TpoEngine.compute_day_rank(session.historical_context()).unwrap();
        assert_eq!(actual.ranking, expected_ranking);
        assert_eq!(actual.len(), 4);
        assert_eq!(actual.profiles[3].periods, 10);
    }

    #[test]
    fn test_refresh_propagates_engine_failure() {
        let session = session(4);
        let live_bars = series(START_MS + 3 * DAY_MS, HALF_HOUR_MS, 20, |_| 100.0);
        let params = session.params().with_tick_size(0);

        let actual = ProfileReconciler::refresh(&TpoEngine, &session, &live_bars, &params);
        assert!(matches!(actual, Err(DataError::Profile(_))));
    }
}
