#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::unused_self,
    rust_2018_idioms,
    missing_debug_implementations
)]

//! # TPO-Data
//! Live market profile (time-price-opportunity) pipeline over exchange candles.
//!
//! A frozen historical window of 30 minute bars is loaded once at startup and a live
//! window of 1 minute bars is polled on every refresh. Each refresh:
//! * normalises the raw kline payload into a [`BarSequence`](bar::BarSequence).
//! * resamples the live bars onto the historical 30 minute grid.
//! * merges both windows and rebuilds the day index driving range selection.
//! * estimates a volatility-scaled tick size and runs the [`ProfileEngine`](profile::ProfileEngine)
//!   over the live window.
//! * splices the historical and live profiles into one contiguous sequence.
//!
//! ## Example
//! ```rust,no_run
//! use tpo_data::{
//!     config::TpoConfig,
//!     exchange::ExchangeClient,
//!     merge::SelectionRange,
//!     profile::TpoEngine,
//!     refresh::refresh,
//!     session::SessionState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TpoConfig::from_env()?;
//!     let client = ExchangeClient::from_config(&config.feed)?;
//!     let now = chrono::Utc::now();
//!
//!     let session =
//!         SessionState::bootstrap(&client, &TpoEngine, &config.feed, &config.profile, now).await?;
//!
//!     let frame = refresh(&client, &session, &TpoEngine, SelectionRange::new(0, 1), now).await?;
//!     println!("{}: power {:.1}", frame.label, frame.profile.ranking.power);
//!     Ok(())
//! }
//! ```

/// Canonical OHLCV [`Bar`](bar::Bar) and the ordered [`BarSequence`](bar::BarSequence).
pub mod bar;

/// Environment driven configuration of the feed, the profile engine and the refresh timer.
pub mod config;

/// All [`Error`](std::error::Error)s generated in TPO-Data.
pub mod error;

/// HTTP candle client with a single fallback host.
pub mod exchange;

/// History/live merge, day index and range selection.
pub mod merge;

/// Raw kline payload normalisation.
pub mod normalize;

/// [`ProfileEngine`](profile::ProfileEngine) interface and the default TPO implementation.
pub mod profile;

/// Historical and live profile reconciliation.
pub mod reconcile;

/// Refresh cycle, single-flight gate and the [`DisplayFrame`](refresh::DisplayFrame).
pub mod refresh;

/// Fixed-period OHLCV resampling.
pub mod resample;

/// Startup state shared read-only by every refresh.
pub mod session;

/// Volatility-scaled price bucket width.
pub mod tick_size;
