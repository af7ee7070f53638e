//! One refresh cycle: live fetch -> resample -> merge -> live profile -> reconcile.
//!
//! Every cycle builds a fresh [`DisplayFrame`] from the immutable [`SessionState`] and
//! the latest remote snapshot. Nothing from a previous frame is patched, so a failed
//! cycle simply leaves the previous frame in place.

use crate::{
    bar::{Bar, BarSequence},
    error::DataError,
    exchange::{CandleRequest, CandleSource, ExchangeClient},
    merge::{DayIndex, HistoryLiveMerger, SelectionRange, select},
    profile::{DayProfile, ProfileEngine},
    reconcile::{ProfileReconciler, ReconciledProfile},
    resample::{Interval, drop_partial_head, resample},
    session::SessionState,
    tick_size::estimate_tick_size,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info};

/// Period shared by the historical window and the resampled live window.
pub const FRAME_INTERVAL: Interval = Interval::ThirtyMinutes;

/// Single-flight guard: at most one refresh runs at a time and extra triggers are dropped.
#[derive(Debug, Clone, Default)]
pub struct RefreshGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one refresh; releases the [`RefreshGate`] on drop.
#[derive(Debug)]
pub struct RefreshPermit {
    busy: Arc<AtomicBool>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if a refresh is already in flight.
    pub fn try_acquire(&self) -> Option<RefreshPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Everything the presenter needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    pub label: String,
    pub merged: BarSequence,
    pub day_index: DayIndex,
    pub selection: SelectionRange,
    pub selected: Vec<Bar>,
    pub profile: ReconciledProfile,
    /// `None` until the first live refresh succeeds.
    pub live_tick_size: Option<u64>,
    pub historical_tick_size: u64,
    pub refreshed_at: DateTime<Utc>,
}

impl DisplayFrame {
    fn assemble(
        session: &SessionState,
        merged: BarSequence,
        profile: ReconciledProfile,
        live_tick_size: Option<u64>,
        selection: SelectionRange,
        now: DateTime<Utc>,
    ) -> Self {
        let day_index = DayIndex::build(&merged, now.date_naive());
        let selection = selection.normalised(&day_index);
        let selected = select(&merged, &day_index, selection).to_vec();

        Self {
            label: session.label(),
            merged,
            day_index,
            selection,
            selected,
            profile,
            live_tick_size,
            historical_tick_size: session.historical_tick_size(),
            refreshed_at: now,
        }
    }

    /// Same frame with a different selection; no network or engine work.
    pub fn reselect(&self, selection: SelectionRange) -> Self {
        let selection = selection.normalised(&self.day_index);
        Self {
            selection,
            selected: select(&self.merged, &self.day_index, selection).to_vec(),
            ..self.clone()
        }
    }

    /// Profiles of the calendar days touched by the selected bars.
    pub fn selected_profiles(&self) -> Vec<&DayProfile> {
        match (self.selected.first(), self.selected.last()) {
            (Some(first), Some(last)) => self
                .profile
                .profiles
                .iter()
                .filter(|profile| profile.date >= first.date() && profile.date <= last.date())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Historical-only frame shown until the first live refresh completes.
pub fn initial_frame<Engine>(
    session: &SessionState,
    engine: &Engine,
    selection: SelectionRange,
    now: DateTime<Utc>,
) -> Result<DisplayFrame, DataError>
where
    Engine: ProfileEngine + ?Sized,
{
    let historical = session.historical_context();
    let profile = ReconciledProfile {
        profiles: historical.profiles.clone(),
        distribution: historical.distribution.clone(),
        ranking: engine.compute_day_rank(historical)?,
    };

    Ok(DisplayFrame::assemble(
        session,
        session.history().clone(),
        profile,
        None,
        selection,
        now,
    ))
}

/// Pure refresh over already fetched live 1m bars.
///
/// The live bars are resampled to [`FRAME_INTERVAL`] and merged into the history. The
/// live profiles are then computed over the merged bars from the date of the last
/// historical profile onward, not over the resampled live bars alone. That slice
/// still carries history for the part of the superseded day the live fetch missed.
/// The live tick size is estimated from the resampled live bars only.
pub fn compute_frame<Engine>(
    session: &SessionState,
    live_bars: &BarSequence,
    selection: SelectionRange,
    engine: &Engine,
    now: DateTime<Utc>,
) -> Result<DisplayFrame, DataError>
where
    Engine: ProfileEngine + ?Sized,
{
    let period = FRAME_INTERVAL.duration();
    let live = resample(&drop_partial_head(live_bars, period)?, period)?;
    let merged = HistoryLiveMerger::new(period).merge(session.history(), &live)?;

    let live_tick_size = estimate_tick_size(&live, session.params().freq)?;
    let live_window = live_window(session, &merged)?;
    let params = session.params().with_tick_size(live_tick_size);
    let profile = ProfileReconciler::refresh(engine, session, &live_window, &params)?;

    debug!(
        live = live.len(),
        merged = merged.len(),
        live_window = live_window.len(),
        live_tick_size,
        "computed display frame"
    );

    Ok(DisplayFrame::assemble(
        session,
        merged,
        profile,
        Some(live_tick_size),
        selection,
        now,
    ))
}

/// Merged bars from the day of the last historical profile onward; that profile is the
/// one the reconciler supersedes.
fn live_window(session: &SessionState, merged: &BarSequence) -> Result<BarSequence, DataError> {
    let from = session
        .historical_context()
        .last()
        .map(|profile| profile.date)
        .unwrap_or_else(|| merged.last().date());

    let start = merged.bars().partition_point(|bar| bar.date() < from);
    BarSequence::new(merged.bars()[start..].to_vec())
}

/// Fetch the latest live window and compute a new frame.
pub async fn refresh<Source, Engine>(
    client: &ExchangeClient<Source>,
    session: &SessionState,
    engine: &Engine,
    selection: SelectionRange,
    now: DateTime<Utc>,
) -> Result<DisplayFrame, DataError>
where
    Source: CandleSource,
    Engine: ProfileEngine + ?Sized,
{
    let live_bars = client
        .fetch_candles(&CandleRequest::live(session.symbol()))
        .await?;
    let frame = compute_frame(session, &live_bars, selection, engine, now)?;

    info!(
        symbol = session.symbol(),
        bars = frame.merged.len(),
        profiles = frame.profile.len(),
        live_tick_size = frame.live_tick_size,
        power = frame.profile.ranking.power,
        "refreshed display frame"
    );

    Ok(frame)
}
