//! Runtime configuration.
//!
//! Every value has a sensible default and may be overridden through a `TPO_*`
//! environment variable, eg/ `TPO_SYMBOL=ETHUSDT TPO_REFRESH_SECS=10`.

use crate::{error::DataError, profile::ProfileStyle};
use std::{fmt::Display, str::FromStr, time::Duration};

/// Candle feed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Instrument symbol, eg/ "BTCUSDT".
    pub symbol: String,
    /// Host tried first for every request.
    pub primary_host: String,
    /// Host tried once when the primary fails.
    pub fallback_host: String,
    /// Calendar days of 30m history loaded at startup.
    pub history_days: u32,
    /// Timeout applied to every HTTP request.
    pub http_timeout: Duration,
    /// Maximum candles per request.
    pub candle_limit: u32,
}

/// 30m candles in one UTC day.
const HISTORY_BARS_PER_DAY: u64 = 48;

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            primary_host: "api.binance.com".to_string(),
            fallback_host: "www.binance.com".to_string(),
            history_days: 4,
            http_timeout: Duration::from_secs(10),
            candle_limit: 1000,
        }
    }
}

impl FeedConfig {
    /// Create a new configuration for `symbol`
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn with_hosts(mut self, primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.primary_host = primary.into();
        self.fallback_host = fallback.into();
        self
    }

    pub fn with_history_days(mut self, days: u32) -> Self {
        self.history_days = days;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_candle_limit(mut self, limit: u32) -> Self {
        self.candle_limit = limit;
        self
    }

    /// Upper bound on the 30m candles of the history request: the window starts at
    /// midnight `history_days` ago, so it touches up to `history_days + 1` days.
    pub fn history_bars(&self) -> u64 {
        (u64::from(self.history_days) + 1) * HISTORY_BARS_PER_DAY
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, DataError> {
        let defaults = Self::default();
        Ok(Self {
            symbol: lookup("TPO_SYMBOL")
                .map(|symbol| symbol.trim().to_uppercase())
                .unwrap_or(defaults.symbol),
            primary_host: lookup("TPO_PRIMARY_HOST").unwrap_or(defaults.primary_host),
            fallback_host: lookup("TPO_FALLBACK_HOST").unwrap_or(defaults.fallback_host),
            history_days: parse_var(lookup, "TPO_HISTORY_DAYS")?.unwrap_or(defaults.history_days),
            http_timeout: parse_var(lookup, "TPO_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            candle_limit: parse_var(lookup, "TPO_CANDLE_LIMIT")?.unwrap_or(defaults.candle_limit),
        })
    }
}

/// Profile engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileConfig {
    /// Bars per TPO period, also the tick size rolling window.
    pub freq: usize,
    pub style: ProfileStyle,
    pub session_hours: u32,
    /// Applied to the estimated tick size of the historical window.
    pub history_tick_multiplier: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            freq: 2,
            style: ProfileStyle::Tpo,
            session_hours: 24,
            history_tick_multiplier: 2,
        }
    }
}

impl ProfileConfig {
    pub fn with_freq(mut self, freq: usize) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_style(mut self, style: ProfileStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_session_hours(mut self, hours: u32) -> Self {
        self.session_hours = hours;
        self
    }

    pub fn with_history_tick_multiplier(mut self, multiplier: u64) -> Self {
        self.history_tick_multiplier = multiplier;
        self
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, DataError> {
        let defaults = Self::default();
        Ok(Self {
            freq: parse_var(lookup, "TPO_FREQ")?.unwrap_or(defaults.freq),
            style: parse_var(lookup, "TPO_STYLE")?.unwrap_or(defaults.style),
            session_hours: parse_var(lookup, "TPO_SESSION_HOURS")?
                .unwrap_or(defaults.session_hours),
            history_tick_multiplier: parse_var(lookup, "TPO_HISTORY_TICK_MULTIPLIER")?
                .unwrap_or(defaults.history_tick_multiplier),
        })
    }
}

/// Refresh timer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    pub interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl RefreshConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, DataError> {
        Ok(Self {
            interval: parse_var(lookup, "TPO_REFRESH_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(Self::default().interval),
        })
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpoConfig {
    pub feed: FeedConfig,
    pub profile: ProfileConfig,
    pub refresh: RefreshConfig,
}

impl TpoConfig {
    /// Defaults overridden by any `TPO_*` environment variables that are set.
    pub fn from_env() -> Result<Self, DataError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by the values `lookup` returns for each `TPO_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DataError> {
        let config = Self {
            feed: FeedConfig::from_lookup(&lookup)?,
            profile: ProfileConfig::from_lookup(&lookup)?,
            refresh: RefreshConfig::from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.profile.freq < 2 {
            return Err(DataError::Config(format!(
                "TPO_FREQ must be at least 2, got {}",
                self.profile.freq
            )));
        }
        if self.profile.session_hours == 0 || self.profile.session_hours > 24 {
            return Err(DataError::Config(format!(
                "TPO_SESSION_HOURS must be within 1..=24, got {}",
                self.profile.session_hours
            )));
        }
        if self.profile.history_tick_multiplier == 0 {
            return Err(DataError::Config(
                "TPO_HISTORY_TICK_MULTIPLIER must be positive".to_string(),
            ));
        }
        if self.feed.history_days == 0 {
            return Err(DataError::Config("TPO_HISTORY_DAYS must be positive".to_string()));
        }
        // A truncated response keeps the oldest candles and leaves a gap before today
        if self.feed.history_bars() > u64::from(self.feed.candle_limit) {
            return Err(DataError::Config(format!(
                "TPO_HISTORY_DAYS={} spans up to {} 30m candles, above TPO_CANDLE_LIMIT={}",
                self.feed.history_days,
                self.feed.history_bars(),
                self.feed.candle_limit
            )));
        }
        if self.refresh.interval.is_zero() {
            return Err(DataError::Config("TPO_REFRESH_SECS must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, DataError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|error| DataError::Config(format!("{key}={raw}: {error}")))
        })
        .transpose()
}
