use crate::{bar::BarSequence, error::DataError};
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Day ranking over the per-day summaries of a [`ProfileContext`].
pub mod rank;

/// Default [`ProfileEngine`] building one TPO profile per UTC calendar day.
pub mod tpo;

pub use tpo::TpoEngine;

/// Share of the day's weight covered by the value area.
pub const VALUE_AREA_SHARE: f64 = 0.70;

/// Number of TPO periods forming the initial balance.
pub const INITIAL_BALANCE_PERIODS: usize = 2;

/// Computes market profiles and day rankings over a window of bars.
///
/// The reconciliation pipeline never looks inside the produced records; it only
/// concatenates and re-indexes them, so alternative engines can be swapped in freely.
pub trait ProfileEngine: Send + Sync {
    fn compute_context(
        &self,
        bars: &BarSequence,
        params: &ContextParams,
    ) -> Result<ProfileContext, DataError>;

    fn compute_day_rank(&self, context: &ProfileContext) -> Result<DayRank, DataError>;
}

/// Measure used to weight price levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStyle {
    /// Count of TPO periods touching a level.
    #[default]
    #[display("tpo")]
    Tpo,
    /// Bar volume spread evenly across the levels each bar touched.
    #[display("volume")]
    Volume,
}

impl FromStr for ProfileStyle {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tpo" => Ok(ProfileStyle::Tpo),
            "volume" | "vol" => Ok(ProfileStyle::Volume),
            other => Err(DataError::InvalidParameter(format!(
                "unknown profile style: {other}"
            ))),
        }
    }
}

/// Engine parameters for one [`ProfileEngine::compute_context`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextParams {
    /// Bars per TPO period.
    pub freq: usize,
    pub style: ProfileStyle,
    /// Number of prior days averaged for relative volume.
    pub avglen: usize,
    /// Price level width.
    pub tick_size: u64,
    /// Session length from the first bar of each day.
    pub session_hours: u32,
}

impl ContextParams {
    /// Same parameters with a different price level width.
    pub fn with_tick_size(self, tick_size: u64) -> Self {
        Self { tick_size, ..self }
    }
}

/// One price level of a [`DayProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Lower bound of the level.
    pub price: f64,
    /// TPO letters in period order, eg/ "ABDE".
    pub letters: String,
    pub tpo_count: usize,
    pub volume: f64,
}

/// Market profile of a single day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayProfile {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    /// Ascending by price.
    pub levels: Vec<PriceLevel>,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub ib_high: f64,
    pub ib_low: f64,
    pub single_prints: Vec<f64>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub periods: usize,
}

/// Per-day summary row, as displayed in the distribution table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub index: usize,
    pub date: NaiveDate,
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub ib_high: f64,
    pub ib_low: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub tpo_count: usize,
    pub single_prints: usize,
}

impl DistributionRow {
    pub fn from_profile(index: usize, profile: &DayProfile) -> Self {
        Self {
            index,
            date: profile.date,
            poc: profile.poc,
            vah: profile.vah,
            val: profile.val,
            ib_high: profile.ib_high,
            ib_low: profile.ib_low,
            open: profile.open,
            high: profile.high,
            low: profile.low,
            close: profile.close,
            volume: profile.volume,
            tpo_count: profile.levels.iter().map(|level| level.tpo_count).sum(),
            single_prints: profile.single_prints.len(),
        }
    }
}

/// Output of [`ProfileEngine::compute_context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileContext {
    pub profiles: Vec<DayProfile>,
    pub distribution: Vec<DistributionRow>,
    pub params: ContextParams,
}

impl ProfileContext {
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn last(&self) -> Option<&DayProfile> {
        self.profiles.last()
    }
}

/// Ranking factors of one day, each in `[-1, 1]` except `relative_volume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub date: NaiveDate,
    pub close_vs_poc: f64,
    pub close_vs_value: f64,
    pub poc_migration: f64,
    pub range_extension: f64,
    pub relative_volume: f64,
    pub power1: f64,
    pub power: f64,
}

/// Strength summary of the most recent day plus the per-day breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRank {
    pub power: f64,
    pub power1: f64,
    pub highd: f64,
    pub lowd: f64,
    pub breakdown: Vec<BreakdownRow>,
}
