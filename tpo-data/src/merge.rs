//! History/live bar reconciliation and the day-boundary index driving range selection.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bar::{Bar, BarSequence},
    error::DataError,
    resample::bucket_start,
};

/// Folds a freshly resampled live window into the frozen historical window.
#[derive(Debug, Clone, Copy)]
pub struct HistoryLiveMerger {
    period: Duration,
}

impl HistoryLiveMerger {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Concatenate `history` and `live`, keeping one bar per period bucket.
    ///
    /// Live bars replace historical bars of the same bucket. `live` is expected to start
    /// on a complete bucket (see [`drop_partial_head`](crate::resample::drop_partial_head)).
    pub fn merge(&self, history: &BarSequence, live: &BarSequence) -> Result<BarSequence, DataError> {
        if self.period <= Duration::zero() {
            return Err(DataError::InvalidParameter(format!(
                "merge period must be positive, got {}",
                self.period
            )));
        }

        let mut by_bucket: BTreeMap<DateTime<Utc>, Bar> = history
            .iter()
            .map(|bar| (bucket_start(bar.timestamp, self.period), *bar))
            .collect();

        let mut replaced = 0usize;
        for bar in live {
            let bucket = bucket_start(bar.timestamp, self.period);
            if by_bucket.insert(bucket, *bar).is_some() {
                replaced += 1;
            }
        }

        debug!(
            history = history.len(),
            live = live.len(),
            replaced,
            merged = by_bucket.len(),
            "merged history and live bars"
        );

        // Distinct buckets carry distinct timestamps, so ordering by bucket orders by time
        BarSequence::new(by_bucket.into_values().collect())
    }
}

/// Contiguous run of bars sharing one calendar date (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaySegment {
    pub date: NaiveDate,
    /// Index of the first bar of the day.
    pub start: usize,
    /// One past the index of the last bar of the day.
    pub end: usize,
}

impl DaySegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Split `bars` into calendar-date segments, in timestamp order.
pub fn day_segments(bars: &BarSequence) -> Vec<DaySegment> {
    let mut segments = Vec::new();
    let mut start = 0;

    for (date, group) in &bars.iter().chunk_by(|bar| bar.date()) {
        let len = group.count();
        segments.push(DaySegment {
            date,
            start,
            end: start + len,
        });
        start += len;
    }

    segments
}

/// Day boundary marks used by the range selector: the first timestamp of every day
/// in the merged sequence followed by a synthetic `today 23:59:59` terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayIndex {
    marks: Vec<DateTime<Utc>>,
}

impl DayIndex {
    /// Rebuild the index from scratch for `bars`.
    pub fn build(bars: &BarSequence, today: NaiveDate) -> Self {
        let mut marks: Vec<DateTime<Utc>> = day_segments(bars)
            .iter()
            .map(|segment| bars.bars()[segment.start].timestamp)
            .collect();

        marks.push(end_of_day(today));
        Self { marks }
    }

    pub fn marks(&self) -> &[DateTime<Utc>] {
        &self.marks
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Always `false`; the terminator is always present.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.marks.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<DateTime<Utc>> {
        self.marks.get(index).copied()
    }
}

/// Shorthand for [`DayIndex::build`].
pub fn day_index(bars: &BarSequence, today: NaiveDate) -> DayIndex {
    DayIndex::build(bars, today)
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last_second).and_utc()
}

/// Slider endpoints, as indices into a [`DayIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The most recent day: from the last real day mark to the terminator.
    pub fn latest_day(index: &DayIndex) -> Self {
        let end = index.last_index();
        Self {
            start: end.saturating_sub(1),
            end,
        }
    }

    /// Clamp both ends into `index` and order them.
    pub fn normalised(&self, index: &DayIndex) -> Self {
        let last = index.last_index();
        let (a, b) = (self.start.min(last), self.end.min(last));
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Shift the start mark by `delta`, keeping it before the end mark.
    pub fn shift_start(&self, delta: isize, index: &DayIndex) -> Self {
        let range = self.normalised(index);
        let start = range.start.saturating_add_signed(delta).min(range.end.saturating_sub(1));
        Self { start, ..range }
    }

    /// Shift the end mark by `delta`, keeping it after the start mark.
    pub fn shift_end(&self, delta: isize, index: &DayIndex) -> Self {
        let range = self.normalised(index);
        let end = range
            .end
            .saturating_add_signed(delta)
            .clamp((range.start + 1).min(index.last_index()), index.last_index());
        Self { end, ..range }
    }
}

/// Bars with `marks[start] <= timestamp <= marks[end]`.
pub fn select<'a>(bars: &'a BarSequence, index: &DayIndex, range: SelectionRange) -> &'a [Bar] {
    let range = range.normalised(index);
    match (index.get(range.start), index.get(range.end)) {
        (Some(from), Some(to)) => &bars.bars()[bars.index_range(from, to)],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::test_utils::{bar, series};

    const MINUTE_MS: i64 = 60_000;
    const HALF_HOUR_MS: i64 = 30 * MINUTE_MS;
    const DAY_MS: i64 = 86_400_000;
    // 2023-11-14 00:00:00 UTC
    const MIDNIGHT_MS: i64 = 1_699_920_000_000;

    fn date(ms: i64) -> NaiveDate {
        DateTime::from_timestamp_millis(ms).unwrap().date_naive()
    }

    fn merger() -> HistoryLiveMerger {
        HistoryLiveMerger::new(Duration::minutes(30))
    }

    #[test]
    fn test_merge_with_itself_is_idempotent() {
        let history = series(MIDNIGHT_MS, HALF_HOUR_MS, 96, |i| 100.0 + i as f64);
        let merged = merger().merge(&history, &history).unwrap();

        assert_eq!(merged.len(), history.len());
        assert_eq!(merged.first().timestamp, history.first().timestamp);
        assert_eq!(merged.last().timestamp, history.last().timestamp);
        assert!(merged.bars().windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[test]
    fn test_merge_live_wins_on_conflict() {
        // History: 00:00 .. 03:30 (8 bars), closes 100..107
        let history = series(MIDNIGHT_MS, HALF_HOUR_MS, 8, |i| 100.0 + i as f64);

        // Live bars stamped with the last fine minute of 03:00, 03:30 and 04:00 buckets
        let live = BarSequence::new(vec![
            bar(MIDNIGHT_MS + 6 * HALF_HOUR_MS + 29 * MINUTE_MS, 1.0, 1.0, 1.0, 206.0, 1.0),
            bar(MIDNIGHT_MS + 7 * HALF_HOUR_MS + 29 * MINUTE_MS, 1.0, 1.0, 1.0, 207.0, 1.0),
            bar(MIDNIGHT_MS + 8 * HALF_HOUR_MS + 12 * MINUTE_MS, 1.0, 1.0, 1.0, 208.0, 1.0),
        ])
        .unwrap();

        let merged = merger().merge(&history, &live).unwrap();
        let closes: Vec<f64> = merged.closes().collect();

        // 03:00 and 03:30 replaced, 04:00 appended
        assert_eq!(
            closes,
            vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 206.0, 207.0, 208.0]
        );
        assert_eq!(
            merged.last().timestamp.timestamp_millis(),
            MIDNIGHT_MS + 8 * HALF_HOUR_MS + 12 * MINUTE_MS
        );
    }

    #[test]
    fn test_merge_appends_disjoint_live_window() {
        let history = series(MIDNIGHT_MS, HALF_HOUR_MS, 2, |_| 100.0);
        let live = series(MIDNIGHT_MS + 4 * HALF_HOUR_MS, HALF_HOUR_MS, 2, |_| 200.0);

        let merged = merger().merge(&history, &live).unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.bars()[2].close, 200.0);
    }

    #[test]
    fn test_day_segments() {
        let bars = series(MIDNIGHT_MS, 12 * 60 * MINUTE_MS, 5, |_| 1.0);
        let segments = day_segments(&bars);

        assert_eq!(
            segments,
            vec![
                DaySegment { date: date(MIDNIGHT_MS), start: 0, end: 2 },
                DaySegment { date: date(MIDNIGHT_MS + DAY_MS), start: 2, end: 4 },
                DaySegment { date: date(MIDNIGHT_MS + 2 * DAY_MS), start: 4, end: 5 },
            ]
        );
    }

    #[test]
    fn test_day_index_len_is_distinct_dates_plus_one() {
        struct TestCase {
            start_ms: i64,
            step_ms: i64,
            count: usize,
        }

        let tests = vec![
            TestCase {
                // TC0: single bar
                start_ms: MIDNIGHT_MS,
                step_ms: HALF_HOUR_MS,
                count: 1,
            },
            TestCase {
                // TC1: four full days of 30m bars
                start_ms: MIDNIGHT_MS,
                step_ms: HALF_HOUR_MS,
                count: 4 * 48,
            },
            TestCase {
                // TC2: sparse bars spanning days with gaps
                start_ms: MIDNIGHT_MS + 23 * 60 * MINUTE_MS,
                step_ms: 7 * 60 * MINUTE_MS,
                count: 20,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let bars = series(test.start_ms, test.step_ms, test.count, |_| 1.0);
            let day_index = day_index(&bars, bars.last().date());
            assert_eq!(day_index.len(), bars.distinct_dates() + 1, "TC{} failed", index);
        }
    }

    #[test]
    fn test_day_index_marks_and_terminator() {
        let bars = series(MIDNIGHT_MS + 90 * MINUTE_MS, 12 * 60 * MINUTE_MS, 3, |_| 1.0);
        let today = date(MIDNIGHT_MS + DAY_MS);
        let day_index = DayIndex::build(&bars, today);

        assert_eq!(day_index.marks()[0], bars.bars()[0].timestamp);
        assert_eq!(day_index.marks()[1], bars.bars()[2].timestamp);
        assert_eq!(
            day_index.marks()[2],
            DateTime::from_timestamp_millis(MIDNIGHT_MS + 2 * DAY_MS - 1_000).unwrap()
        );
    }

    #[test]
    fn test_select_latest_day() {
        // Three days of 30m bars
        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 3 * 48, |_| 1.0);
        let day_index = DayIndex::build(&bars, bars.last().date());
        let range = SelectionRange::latest_day(&day_index);

        assert_eq!(range, SelectionRange::new(2, 3));
        let selected = select(&bars, &day_index, range);
        assert_eq!(selected.len(), 48);
        assert!(selected.iter().all(|bar| bar.date() == bars.last().date()));
    }

    #[test]
    fn test_select_clamps_and_orders_range() {
        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 3 * 48, |_| 1.0);
        let day_index = DayIndex::build(&bars, bars.last().date());

        // Slider max is one past the last mark
        let selected = select(&bars, &day_index, SelectionRange::new(4, 1));
        assert_eq!(selected.len(), 2 * 48);
    }

    #[test]
    fn test_selection_shift_keeps_order() {
        let bars = series(MIDNIGHT_MS, HALF_HOUR_MS, 5 * 48, |_| 1.0);
        let day_index = DayIndex::build(&bars, bars.last().date());
        let range = SelectionRange::latest_day(&day_index);

        assert_eq!(range.shift_start(-2, &day_index), SelectionRange::new(2, 5));
        assert_eq!(range.shift_start(1, &day_index), range);
        assert_eq!(range.shift_start(-10, &day_index), SelectionRange::new(0, 5));
        assert_eq!(range.shift_end(1, &day_index), range);
        assert_eq!(
            SelectionRange::new(0, 5).shift_end(-3, &day_index),
            SelectionRange::new(0, 2)
        );
        assert_eq!(
            SelectionRange::new(0, 5).shift_end(-9, &day_index),
            SelectionRange::new(0, 1)
        );
    }
}
