//! Process-lifetime state computed once at startup and shared read-only by every refresh.

use crate::{
    bar::BarSequence,
    config::{FeedConfig, ProfileConfig},
    error::DataError,
    exchange::{CandleRequest, CandleSource, ExchangeClient},
    profile::{ContextParams, ProfileContext, ProfileEngine},
    tick_size::estimate_tick_size,
};
use chrono::{DateTime, Utc};
use tracing::info;

/// Frozen historical window plus the engine parameters derived from it.
#[derive(Debug, Clone)]
pub struct SessionState {
    symbol: String,
    history: BarSequence,
    historical_context: ProfileContext,
    historical_tick_size: u64,
    params: ContextParams,
}

impl SessionState {
    /// Derive the historical tick size, ranking window and profile context from `history`.
    pub fn new<Engine>(
        symbol: impl Into<String>,
        history: BarSequence,
        engine: &Engine,
        config: &ProfileConfig,
    ) -> Result<Self, DataError>
    where
        Engine: ProfileEngine + ?Sized,
    {
        let symbol = symbol.into();
        let context_days = history.distinct_dates();
        let avglen = context_days.saturating_sub(2).max(1);

        let estimate = estimate_tick_size(&history, config.freq)?;
        let historical_tick_size = estimate.saturating_mul(config.history_tick_multiplier).max(1);

        let params = ContextParams {
            freq: config.freq,
            style: config.style,
            avglen,
            tick_size: historical_tick_size,
            session_hours: config.session_hours,
        };
        let historical_context = engine.compute_context(&history, &params)?;

        info!(
            %symbol,
            bars = history.len(),
            context_days,
            avglen,
            historical_tick_size,
            profiles = historical_context.len(),
            "session initialised from history"
        );

        Ok(Self {
            symbol,
            history,
            historical_context,
            historical_tick_size,
            params,
        })
    }

    /// Fetch the historical window and build the session from it.
    pub async fn bootstrap<Source, Engine>(
        client: &ExchangeClient<Source>,
        engine: &Engine,
        feed: &FeedConfig,
        profile: &ProfileConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, DataError>
    where
        Source: CandleSource,
        Engine: ProfileEngine + ?Sized,
    {
        let request = CandleRequest::history(&feed.symbol, now, feed.history_days)
            .with_limit(feed.candle_limit);
        let history = client.fetch_candles(&request).await?;

        Self::new(&feed.symbol, history, engine, profile)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Header label, eg/ "BTCUSDT Live".
    pub fn label(&self) -> String {
        format!("{} Live", self.symbol)
    }

    pub fn history(&self) -> &BarSequence {
        &self.history
    }

    pub fn historical_context(&self) -> &ProfileContext {
        &self.historical_context
    }

    pub fn historical_tick_size(&self) -> u64 {
        self.historical_tick_size
    }

    /// Engine parameters of the historical context.
    pub fn params(&self) -> &ContextParams {
        &self.params
    }
}
