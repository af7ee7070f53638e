use crate::{
    bar::BarSequence, config::FeedConfig, error::DataError, normalize::normalize,
    resample::Interval,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Binance spot REST [`CandleSource`].
pub mod binance;

pub use binance::HttpCandleSource;

/// Default (and Binance maximum) candles per kline request.
pub const DEFAULT_CANDLE_LIMIT: u32 = 1000;

/// Parameters of one kline request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandleRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

impl CandleRequest {
    /// 30m bars from midnight UTC `days` before `now` up to `now`.
    pub fn history(symbol: impl Into<String>, now: DateTime<Utc>, days: u32) -> Self {
        let start = (now - Duration::days(i64::from(days)))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();

        Self {
            symbol: symbol.into(),
            interval: Interval::ThirtyMinutes,
            start: Some(start),
            end: Some(now),
            limit: DEFAULT_CANDLE_LIMIT,
        }
    }

    /// Most recent 1m bars, no time bounds.
    pub fn live(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: Interval::OneMinute,
            start: None,
            end: None,
            limit: DEFAULT_CANDLE_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Query string pairs in Binance kline parameter names.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.to_string()),
        ];
        if let Some(start) = self.start {
            query.push(("startTime", start.timestamp_millis().to_string()));
        }
        if let Some(end) = self.end {
            query.push(("endTime", end.timestamp_millis().to_string()));
        }
        query.push(("limit", self.limit.to_string()));
        query
    }
}

/// Raw kline payload provider for a single host.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_raw(&self, host: &str, request: &CandleRequest) -> Result<Value, DataError>;
}

/// Candle client that retries once on a fallback host.
#[derive(Debug, Clone)]
pub struct ExchangeClient<Source> {
    source: Source,
    primary_host: String,
    fallback_host: String,
}

impl ExchangeClient<HttpCandleSource> {
    /// HTTP client for the hosts and timeout of `config`.
    pub fn from_config(config: &FeedConfig) -> Result<Self, DataError> {
        Ok(Self::new(
            HttpCandleSource::new(config.http_timeout)?,
            config.primary_host.clone(),
            config.fallback_host.clone(),
        ))
    }
}

impl<Source> ExchangeClient<Source>
where
    Source: CandleSource,
{
    pub fn new(
        source: Source,
        primary_host: impl Into<String>,
        fallback_host: impl Into<String>,
    ) -> Self {
        Self {
            source,
            primary_host: primary_host.into(),
            fallback_host: fallback_host.into(),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Fetch and normalise candles from `host` only.
    pub async fn fetch_from(
        &self,
        host: &str,
        request: &CandleRequest,
    ) -> Result<BarSequence, DataError> {
        let payload = self.source.fetch_raw(host, request).await?;
        let bars = normalize(&payload)?;
        debug!(
            host,
            symbol = %request.symbol,
            interval = %request.interval,
            bars = bars.len(),
            "fetched candles"
        );
        Ok(bars)
    }

    /// Fetch from the primary host, then once from the fallback host on any failure.
    ///
    /// When both fail the fallback's error is returned.
    pub async fn fetch_candles(&self, request: &CandleRequest) -> Result<BarSequence, DataError> {
        match self.fetch_from(&self.primary_host, request).await {
            Ok(bars) => Ok(bars),
            Err(primary_error) => {
                warn!(
                    host = %self.primary_host,
                    fallback = %self.fallback_host,
                    error = %primary_error,
                    "primary candle host failed, retrying on fallback"
                );

                self.fetch_from(&self.fallback_host, request)
                    .await
                    .inspect_err(|fallback_error| {
                        error!(
                            host = %self.fallback_host,
                            %primary_error,
                            %fallback_error,
                            "fallback candle host failed"
                        )
                    })
            }
        }
    }
}
