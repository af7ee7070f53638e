use super::{
    ContextParams, DayProfile, DayRank, DistributionRow, INITIAL_BALANCE_PERIODS,
    PriceLevel, ProfileContext, ProfileEngine, ProfileStyle, VALUE_AREA_SHARE, rank,
};
use crate::{
    bar::{Bar, BarSequence},
    error::DataError,
    merge::day_segments,
};
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::debug;

const TPO_LETTERS: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Letter of TPO period `period`, cycling `A..Z`, `a..z`.
pub fn tpo_letter(period: usize) -> char {
    char::from(TPO_LETTERS[period % TPO_LETTERS.len()])
}

/// Classic time-price-opportunity profile, one per UTC calendar day.
#[derive(Debug, Clone, Copy, Default)]
pub struct TpoEngine;

impl ProfileEngine for TpoEngine {
    fn compute_context(
        &self,
        bars: &BarSequence,
        params: &ContextParams,
    ) -> Result<ProfileContext, DataError> {
        validate(params)?;

        let session = Duration::hours(i64::from(params.session_hours));
        let profiles: Vec<DayProfile> = day_segments(bars)
            .into_iter()
            .map(|segment| {
                let day = &bars.bars()[segment.start..segment.end];
                let session_end = day[0].timestamp + session;
                let cut = day.partition_point(|bar| bar.timestamp < session_end);
                build_profile(&day[..cut], params)
            })
            .collect::<Result<_, _>>()?;

        let distribution = profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| DistributionRow::from_profile(index, profile))
            .collect();

        debug!(
            bars = bars.len(),
            days = profiles.len(),
            tick_size = params.tick_size,
            freq = params.freq,
            style = %params.style,
            "computed profile context"
        );

        Ok(ProfileContext {
            profiles,
            distribution,
            params: *params,
        })
    }

    fn compute_day_rank(&self, context: &ProfileContext) -> Result<DayRank, DataError> {
        rank::day_rank(context)
    }
}

fn validate(params: &ContextParams) -> Result<(), DataError> {
    if params.tick_size == 0 {
        return Err(DataError::Profile("tick size must be positive".to_string()));
    }
    if params.freq == 0 {
        return Err(DataError::Profile("TPO period must span at least 1 bar".to_string()));
    }
    if params.session_hours == 0 {
        return Err(DataError::Profile("session must last at least 1 hour".to_string()));
    }
    Ok(())
}

fn level_entry(levels: &mut BTreeMap<i64, PriceLevel>, key: i64, tick: f64) -> &mut PriceLevel {
    levels.entry(key).or_insert_with(|| PriceLevel {
        price: key as f64 * tick,
        letters: String::new(),
        tpo_count: 0,
        volume: 0.0,
    })
}

/// Build the profile of one (non-empty) session.
fn build_profile(day: &[Bar], params: &ContextParams) -> Result<DayProfile, DataError> {
    let tick = params.tick_size as f64;
    let level_of = |price: f64| (price / tick).floor() as i64;

    let mut by_key: BTreeMap<i64, PriceLevel> = BTreeMap::new();
    let mut periods = 0;

    for (period, chunk) in day.chunks(params.freq).enumerate() {
        let letter = tpo_letter(period);
        let (low, high) = extremes(chunk);
        for key in level_of(low)..=level_of(high) {
            let level = level_entry(&mut by_key, key, tick);
            level.letters.push(letter);
            level.tpo_count += 1;
        }

        for bar in chunk {
            let (from, to) = (level_of(bar.low), level_of(bar.high));
            if to < from {
                continue;
            }
            let share = bar.volume / (to - from + 1) as f64;
            for key in from..=to {
                level_entry(&mut by_key, key, tick).volume += share;
            }
        }

        periods += 1;
    }

    let levels: Vec<PriceLevel> = by_key.into_values().collect();
    if levels.is_empty() {
        return Err(DataError::Profile(format!(
            "session starting {} spans no price levels",
            day[0].timestamp
        )));
    }
    let weights: Vec<f64> = levels
        .iter()
        .map(|level| match params.style {
            ProfileStyle::Tpo => level.tpo_count as f64,
            ProfileStyle::Volume => level.volume,
        })
        .collect();

    let (low, high) = extremes(day);
    let poc_index = point_of_control(&levels, &weights, (high + low) / 2.0, tick);
    let (va_low, va_high) = value_area(&weights, poc_index, VALUE_AREA_SHARE);

    let ib_bars = (INITIAL_BALANCE_PERIODS * params.freq).min(day.len());
    let (ib_low, ib_high) = extremes(&day[..ib_bars]);

    // Extremes are excluded: a single letter at the edge is a tail, not a single print
    let single_prints = levels
        .get(1..levels.len().saturating_sub(1))
        .unwrap_or(&[])
        .iter()
        .filter(|level| level.tpo_count == 1)
        .map(|level| level.price)
        .collect();

    let first = &day[0];
    let last = &day[day.len() - 1];

    Ok(DayProfile {
        date: first.date(),
        start: first.timestamp,
        poc: levels[poc_index].price + tick / 2.0,
        vah: levels[va_high].price + tick,
        val: levels[va_low].price,
        ib_high,
        ib_low,
        single_prints,
        open: first.open,
        high,
        low,
        close: last.close,
        volume: day.iter().map(|bar| bar.volume).sum(),
        periods,
        levels,
    })
}

/// `(low, high)` of a slice of bars.
fn extremes(bars: &[Bar]) -> (f64, f64) {
    bars.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), bar| {
        (low.min(bar.low), high.max(bar.high))
    })
}

/// Heaviest level; ties go to the level closest to the middle of the day's range.
fn point_of_control(levels: &[PriceLevel], weights: &[f64], mid: f64, tick: f64) -> usize {
    let distance = |index: usize| (levels[index].price + tick / 2.0 - mid).abs();

    (0..levels.len())
        .max_by(|&a, &b| {
            weights[a]
                .total_cmp(&weights[b])
                .then_with(|| distance(b).total_cmp(&distance(a)))
        })
        .unwrap_or(0)
}

/// Expand from the POC towards the heavier neighbour until `share` of the total
/// weight is covered. Returns inclusive level indices.
fn value_area(weights: &[f64], poc: usize, share: f64) -> (usize, usize) {
    let target = weights.iter().sum::<f64>() * share;
    let (mut low, mut high) = (poc, poc);
    let mut covered = weights[poc];

    while covered < target {
        let below = low.checked_sub(1).map(|index| weights[index]);
        let above = weights.get(high + 1).copied();

        match (below, above) {
            (Some(below), Some(above)) if below >= above => {
                low -= 1;
                covered += below;
            }
            (_, Some(above)) => {
                high += 1;
                covered += above;
            }
            (Some(below), None) => {
                low -= 1;
                covered += below;
            }
            (None, None) => break,
        }
    }

    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::test_utils::{bar, series};

    const HALF_HOUR_MS: i64 = 30 * 60_000;
    // 2023-11-14 00:00:00 UTC
    const MIDNIGHT_MS: i64 = 1_699_920_000_000;

    fn params(freq: usize, tick_size: u64, style: ProfileStyle) -> ContextParams {
        ContextParams {
            freq,
            style,
            avglen: 2,
            tick_size,
            session_hours: 24,
        }
    }

    fn day(bars: Vec<Bar>) -> BarSequence {
        BarSequence::new(bars).unwrap()
    }

    #[test]
    fn test_tpo_letters() {
        assert_eq!(tpo_letter(0), 'A');
        assert_eq!(tpo_letter(25), 'Z');
        assert_eq!(tpo_letter(26), 'a');
        assert_eq!(tpo_letter(51), 'z');
        assert_eq!(tpo_letter(52), 'A');
    }

    #[test]
    fn test_compute_context_rejects_invalid_params() {
        struct TestCase {
            params: ContextParams,
            expected: DataError,
        }

        let tests = vec![
            TestCase {
                // TC0: zero tick size
                params: params(2, 0, ProfileStyle::Tpo),
                expected: DataError::Profile("tick size must be positive".to_string()),
            },
            TestCase {
                // TC1: zero bars per period
                params: params(0, 5, ProfileStyle::Tpo),
                expected: DataError::Profile("TPO period must span at least 1 bar".to_string()),
            },
            TestCase {
                // TC2: empty session
                params: ContextParams {
                    session_hours: 0,
                    ..params(2, 5, ProfileStyle::Tpo)
                },
                expected: DataError::Profile("session must last at least 1 hour".to_string()),
            },
        ];

        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 10, |_| 100.0);
        for (index, test) in tests.into_iter().enumerate() {
            let actual = TpoEngine.compute_context(&bars, &test.params).unwrap_err();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_compute_context_rejects_inverted_bars() {
        struct TestCase {
            input: Vec<Bar>,
            expected: DataError,
        }

        let tests = vec![
            TestCase {
                // TC0: high and low swapped on the only bar
                input: vec![bar(MIDNIGHT_MS, 100.0, 90.0, 110.0, 100.0, 1.0)],
                expected: DataError::Profile(
                    "session starting 2023-11-14 00:00:00 UTC spans no price levels".to_string(),
                ),
            },
            TestCase {
                // TC1: second day made only of inverted bars
                input: vec![
                    bar(MIDNIGHT_MS - HALF_HOUR_MS, 100.0, 101.0, 99.0, 100.0, 1.0),
                    bar(MIDNIGHT_MS, 100.0, 90.0, 110.0, 100.0, 1.0),
                    bar(MIDNIGHT_MS + HALF_HOUR_MS, 100.0, 80.0, 120.0, 100.0, 1.0),
                ],
                expected: DataError::Profile(
                    "session starting 2023-11-14 00:00:00 UTC spans no price levels".to_string(),
                ),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = TpoEngine
                .compute_context(&day(test.input), &params(2, 1, ProfileStyle::Tpo))
                .unwrap_err();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_one_profile_per_day() {
        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 3 * 48, |i| 100.0 + (i % 5) as f64);
        let context = TpoEngine
            .compute_context(&bars, &params(2, 1, ProfileStyle::Tpo))
            .unwrap();

        assert_eq!(context.len(), 3);
        assert_eq!(context.distribution.len(), 3);
        let indices: Vec<usize> = context.distribution.iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(context.profiles.iter().all(|profile| profile.periods == 24));
        assert!(context.profiles.windows(2).all(|pair| pair[0].date < pair[1].date));
    }

    #[test]
    fn test_profile_levels_poc_and_value_area() {
        let bars = day(vec![
            // A: levels 100, 101, 102
            bar(MIDNIGHT_MS, 100.0, 102.5, 100.0, 102.0, 1.0),
            // B: levels 101, 102, 103
            bar(MIDNIGHT_MS + HALF_HOUR_MS, 102.0, 103.5, 101.0, 101.0, 1.0),
            // C: level 101
            bar(MIDNIGHT_MS + 2 * HALF_HOUR_MS, 101.0, 101.5, 101.0, 101.2, 1.0),
        ]);

        let context = TpoEngine
            .compute_context(&bars, &params(1, 1, ProfileStyle::Tpo))
            .unwrap();
        let profile = &context.profiles[0];

        let letters: Vec<(f64, &str)> = profile
            .levels
            .iter()
            .map(|level| (level.price, level.letters.as_str()))
            .collect();
        assert_eq!(
            letters,
            vec![(100.0, "A"), (101.0, "ABC"), (102.0, "AB"), (103.0, "B")]
        );

        // 7 TPOs, 70% = 4.9: POC (3) + the heavier upper neighbour (2)
        assert_eq!(profile.poc, 101.5);
        assert_eq!(profile.val, 101.0);
        assert_eq!(profile.vah, 103.0);
        assert_eq!(profile.ib_high, 103.5);
        assert_eq!(profile.ib_low, 100.0);
        assert!(profile.single_prints.is_empty());
        assert_eq!(profile.open, 100.0);
        assert_eq!(profile.close, 101.2);
        assert_eq!(profile.periods, 3);
        assert_eq!(context.distribution[0].tpo_count, 7);
    }

    #[test]
    fn test_single_prints_exclude_extremes() {
        let bars = day(vec![
            // A: levels 100..=103
            bar(MIDNIGHT_MS, 100.0, 103.5, 100.0, 103.0, 1.0),
            // B: level 100
            bar(MIDNIGHT_MS + HALF_HOUR_MS, 100.0, 100.5, 100.0, 100.0, 1.0),
            // C: level 103
            bar(MIDNIGHT_MS + 2 * HALF_HOUR_MS, 103.0, 103.5, 103.0, 103.0, 1.0),
        ]);

        let context = TpoEngine
            .compute_context(&bars, &params(1, 1, ProfileStyle::Tpo))
            .unwrap();

        assert_eq!(context.profiles[0].single_prints, vec![101.0, 102.0]);
        assert_eq!(context.distribution[0].single_prints, 2);
    }

    #[test]
    fn test_volume_style_moves_poc() {
        let bars = day(vec![
            // Levels 100 and 101 get 5 each
            bar(MIDNIGHT_MS, 100.0, 101.5, 100.0, 101.0, 10.0),
            bar(MIDNIGHT_MS + HALF_HOUR_MS, 101.0, 101.5, 101.0, 101.0, 2.0),
            bar(MIDNIGHT_MS + 2 * HALF_HOUR_MS, 100.0, 100.5, 100.0, 100.0, 40.0),
        ]);

        let by_volume = TpoEngine
            .compute_context(&bars, &params(1, 1, ProfileStyle::Volume))
            .unwrap();
        let volumes: Vec<f64> = by_volume.profiles[0].levels.iter().map(|l| l.volume).collect();

        assert_eq!(volumes, vec![45.0, 7.0]);
        assert_eq!(by_volume.profiles[0].poc, 100.5);
        assert_eq!(by_volume.profiles[0].volume, 52.0);
    }

    #[test]
    fn test_session_hours_clip_the_day() {
        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 48, |_| 100.0);
        let params = ContextParams {
            session_hours: 1,
            ..params(1, 1, ProfileStyle::Tpo)
        };

        let context = TpoEngine.compute_context(&bars, &params).unwrap();
        assert_eq!(context.profiles[0].periods, 2);
        assert_eq!(context.profiles[0].volume, 20.0);
    }

    #[test]
    fn test_value_area_walks_towards_heavier_side() {
        struct TestCase {
            weights: Vec<f64>,
            poc: usize,
            expected: (usize, usize),
        }

        let tests = vec![
            TestCase {
                // TC0: single level
                weights: vec![4.0],
                poc: 0,
                expected: (0, 0),
            },
            TestCase {
                // TC1: heavier below
                weights: vec![1.0, 3.0, 6.0, 1.0, 1.0],
                poc: 2,
                expected: (1, 2),
            },
            TestCase {
                // TC2: poc at the top edge
                weights: vec![2.0, 2.0, 2.0, 5.0],
                poc: 3,
                expected: (1, 3),
            },
            TestCase {
                // TC3: all weights zero
                weights: vec![0.0, 0.0, 0.0],
                poc: 1,
                expected: (1, 1),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = value_area(&test.weights, test.poc, VALUE_AREA_SHARE);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
