//! Raw kline payload -> [`BarSequence`].
//!
//! Exchanges return candles as an array of fixed-width records:
//!
//! ```text
//! [
//!   [1700000000000, "37000.1", "37010.0", "36990.5", "37005.2", "12.3", 1700000059999, ...],
//!   ...
//! ]
//! ```
//!
//! Only the first six fields (open time, open, high, low, close, volume) are kept.

use chrono::DateTime;
use serde_json::Value;
use tracing::debug;

use crate::{
    bar::{Bar, BarSequence},
    error::DataError,
};

/// Minimum number of fields a kline record must carry.
pub const KLINE_FIELDS: usize = 6;

const FIELD_NAMES: [&str; KLINE_FIELDS] = ["open_time", "open", "high", "low", "close", "volume"];

/// Normalise a raw kline payload into an ordered, duplicate free [`BarSequence`].
pub fn normalize(payload: &Value) -> Result<BarSequence, DataError> {
    let records = match payload {
        Value::Array(records) if !records.is_empty() => records,
        _ => return Err(DataError::EmptyResponse),
    };

    let bars = records
        .iter()
        .enumerate()
        .map(|(row, record)| parse_record(row, record))
        .collect::<Result<Vec<_>, _>>()?;

    let sequence = BarSequence::from_unordered(bars)?;
    debug!(
        records = records.len(),
        bars = sequence.len(),
        first = %sequence.first().timestamp,
        last = %sequence.last().timestamp,
        "normalised kline payload"
    );

    Ok(sequence)
}

fn parse_record(row: usize, record: &Value) -> Result<Bar, DataError> {
    let fields = record
        .as_array()
        .ok_or_else(|| DataError::schema(row, "record is not an array"))?;

    if fields.len() < KLINE_FIELDS {
        return Err(DataError::schema(
            row,
            format!("expected at least {KLINE_FIELDS} fields, got {}", fields.len()),
        ));
    }

    let open_time = parse_millis(row, &fields[0])?;
    let timestamp = DateTime::from_timestamp_millis(open_time)
        .ok_or_else(|| DataError::schema(row, format!("open_time {open_time} out of range")))?;

    let [open, high, low, close, volume] = [1, 2, 3, 4, 5].map(|index| parse_f64(row, index, &fields[index]));
    let bar = Bar {
        timestamp,
        open: open?,
        high: high?,
        low: low?,
        close: close?,
        volume: volume?,
    };

    validate_ohlcv(row, &bar)?;
    Ok(bar)
}

/// `low <= open, close <= high` and a non-negative volume.
fn validate_ohlcv(row: usize, bar: &Bar) -> Result<(), DataError> {
    if bar.low > bar.high {
        return Err(DataError::schema(
            row,
            format!("low {} above high {}", bar.low, bar.high),
        ));
    }

    let inside = |price: f64| (bar.low..=bar.high).contains(&price);
    if !inside(bar.open) || !inside(bar.close) {
        return Err(DataError::schema(
            row,
            format!(
                "open {} / close {} outside range [{}, {}]",
                bar.open, bar.close, bar.low, bar.high
            ),
        ));
    }

    if bar.volume < 0.0 {
        return Err(DataError::schema(row, format!("negative volume {}", bar.volume)));
    }

    Ok(())
}

fn parse_millis(row: usize, value: &Value) -> Result<i64, DataError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| DataError::schema(row, format!("open_time is not an integer: {value}")))
}

fn parse_f64(row: usize, index: usize, value: &Value) -> Result<f64, DataError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| DataError::schema(row, format!("{} is not numeric: {value}", FIELD_NAMES[index])))
}
