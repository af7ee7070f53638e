//! Fixed-period OHLCV resampling.
//!
//! Fine bars (eg/ 1m) are folded into coarser epoch-aligned buckets (eg/ 30m). Bucket
//! boundaries only depend on the bar timestamps, never on how many bars were fetched,
//! so a historical 30m window and a freshly resampled live window share one grid.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    bar::{Bar, BarSequence},
    error::DataError,
};

/// Kline interval supported by the exchange client and the resampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum Interval {
    #[display("1m")]
    #[serde(rename = "1m")]
    OneMinute,
    #[display("3m")]
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[display("5m")]
    #[serde(rename = "5m")]
    FiveMinutes,
    #[display("15m")]
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[display("30m")]
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[display("1h")]
    #[serde(rename = "1h")]
    OneHour,
    #[display("2h")]
    #[serde(rename = "2h")]
    TwoHours,
    #[display("4h")]
    #[serde(rename = "4h")]
    FourHours,
    #[display("1d")]
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn duration(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::ThreeMinutes => Duration::minutes(3),
            Interval::FiveMinutes => Duration::minutes(5),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::ThirtyMinutes => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
            Interval::TwoHours => Duration::hours(2),
            Interval::FourHours => Duration::hours(4),
            Interval::OneDay => Duration::days(1),
        }
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::OneMinute),
            "3m" => Ok(Interval::ThreeMinutes),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "30m" => Ok(Interval::ThirtyMinutes),
            "1h" => Ok(Interval::OneHour),
            "2h" => Ok(Interval::TwoHours),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            other => Err(DataError::InvalidParameter(format!("unknown interval: {other}"))),
        }
    }
}

/// Start of the epoch-aligned bucket containing `timestamp`.
pub fn bucket_start(timestamp: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_ms = period.num_milliseconds();
    let ts_ms = timestamp.timestamp_millis();
    let aligned = ts_ms.div_euclid(period_ms) * period_ms;
    DateTime::from_timestamp_millis(aligned).unwrap_or(timestamp)
}

/// Drop leading bars until the first bucket boundary, unless the first bar already
/// opens its bucket.
///
/// A fetch window of the most recent N fine bars almost never starts on a boundary, so
/// its first coarse bucket would be incomplete.
pub fn drop_partial_head(bars: &BarSequence, period: Duration) -> Result<BarSequence, DataError> {
    if period <= Duration::zero() {
        return Err(DataError::InvalidParameter(format!(
            "resample period must be positive, got {period}"
        )));
    }

    let first = bars.first().timestamp;
    let head_bucket = bucket_start(first, period);
    if first == head_bucket {
        return Ok(bars.clone());
    }

    let start = bars
        .bars()
        .partition_point(|bar| bucket_start(bar.timestamp, period) == head_bucket);
    debug!(dropped = start, %period, "dropped partial head bucket");

    BarSequence::new(bars.bars()[start..].to_vec())
}

/// Resample `bars` into buckets of `period`.
///
/// `open` is the first open, `high`/`low` the bucket extrema, `close` the last close,
/// `volume` the sum and `timestamp` the last fine bar's timestamp. Empty buckets are
/// skipped, not forward filled.
pub fn resample(bars: &BarSequence, period: Duration) -> Result<BarSequence, DataError> {
    if period <= Duration::zero() {
        return Err(DataError::InvalidParameter(format!(
            "resample period must be positive, got {period}"
        )));
    }

    let mut out: Vec<Bar> = Vec::new();
    let mut current: Option<(DateTime<Utc>, Bar)> = None;

    for bar in bars {
        let bucket = bucket_start(bar.timestamp, period);

        match current.as_mut() {
            Some((start, acc)) if *start == bucket => {
                acc.timestamp = bar.timestamp;
                acc.high = acc.high.max(bar.high);
                acc.low = acc.low.min(bar.low);
                acc.close = bar.close;
                acc.volume += bar.volume;
            }
            _ => {
                // Bucket boundary crossed - emit completed bucket
                if let Some((_, done)) = current.replace((bucket, *bar)) {
                    out.push(done);
                }
            }
        }
    }

    if let Some((_, done)) = current {
        out.push(done);
    }

    debug!(fine = bars.len(), coarse = out.len(), %period, "resampled bars");
    BarSequence::new(out)
}
