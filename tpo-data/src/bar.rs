//! Canonical OHLCV bar and the ordered sequence every pipeline stage consumes.

use std::ops::Range;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A single OHLCV observation for a fixed time period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Calendar date of the bar (UTC).
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Price range covered by the bar.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Ordered, duplicate free sequence of [`Bar`]s.
///
/// Timestamps are strictly increasing and the sequence is never empty. Consumers only
/// get shared access; every transformation allocates a new sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSequence {
    bars: Vec<Bar>,
}

impl BarSequence {
    /// Validate and wrap an already ordered vector of bars.
    pub fn new(bars: Vec<Bar>) -> Result<Self, DataError> {
        if bars.is_empty() {
            return Err(DataError::EmptyResponse);
        }

        if let Some(row) = bars
            .windows(2)
            .position(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(DataError::schema(
                row + 1,
                format!(
                    "timestamp {} does not follow {}",
                    bars[row + 1].timestamp,
                    bars[row].timestamp
                ),
            ));
        }

        Ok(Self { bars })
    }

    /// Sort by timestamp and keep the last occurrence of every duplicate timestamp.
    pub fn from_unordered(mut bars: Vec<Bar>) -> Result<Self, DataError> {
        // Stable sort keeps arrival order within equal timestamps
        bars.sort_by_key(|bar| bar.timestamp);

        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }

        Self::new(deduped)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always `false`; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// The most recent `n` bars (or fewer if the sequence is shorter).
    pub fn tail(&self, n: usize) -> &[Bar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bars.iter().map(|bar| bar.close)
    }

    /// Number of distinct calendar dates covered.
    pub fn distinct_dates(&self) -> usize {
        self.bars
            .windows(2)
            .filter(|pair| pair[0].date() != pair[1].date())
            .count()
            + 1
    }

    /// Bar index range covering `[from, to]` (both inclusive).
    pub fn index_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Range<usize> {
        let start = self.bars.partition_point(|bar| bar.timestamp < from);
        let end = self.bars.partition_point(|bar| bar.timestamp <= to);
        start..end.max(start)
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}

impl<'a> IntoIterator for &'a BarSequence {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
