/// TPO Live - market profile chart over a refreshing Binance candle feed
///
/// - Loads the historical 30m window once, then polls 1m candles on a timer
/// - Arrow keys move the range selector, `r` forces a refresh, `q` quits
/// - A refresh in flight swallows further triggers until it completes
use std::{
    error::Error,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tpo_data::{
    config::TpoConfig,
    error::DataError,
    exchange::{ExchangeClient, HttpCandleSource},
    merge::SelectionRange,
    profile::TpoEngine,
    refresh::{DisplayFrame, RefreshGate, initial_frame, refresh},
    session::SessionState,
};
use tpo_tui::{App, AppAction, render};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DRAW_INTERVAL: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

type RefreshResult = Result<DisplayFrame, DataError>;

/// Logs go to stderr so they never tear the alternate screen; redirect with `2>tpo.log`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

/// Start a refresh on a background task unless one is already running.
fn spawn_refresh(
    gate: &RefreshGate,
    client: &Arc<ExchangeClient<HttpCandleSource>>,
    session: &Arc<SessionState>,
    selection: SelectionRange,
    results: &mpsc::UnboundedSender<RefreshResult>,
) -> bool {
    let Some(permit) = gate.try_acquire() else {
        debug!("refresh already in flight, trigger dropped");
        return false;
    };

    let client = Arc::clone(client);
    let session = Arc::clone(session);
    let results = results.clone();
    tokio::spawn(async move {
        let result = refresh(&*client, &session, &TpoEngine, selection, Utc::now()).await;
        // Release before delivery so the next trigger is accepted straight away
        drop(permit);
        let _ = results.send(result);
    });
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = TpoConfig::from_env()?;
    info!(
        symbol = %config.feed.symbol,
        primary = %config.feed.primary_host,
        fallback = %config.feed.fallback_host,
        refresh_secs = config.refresh.interval.as_secs(),
        "starting tpo-live"
    );

    // Startup failures are fatal, surface them before the terminal is taken over
    let client = Arc::new(ExchangeClient::from_config(&config.feed)?);
    let session = Arc::new(
        SessionState::bootstrap(&*client, &TpoEngine, &config.feed, &config.profile, Utc::now())
            .await?,
    );
    let now = Utc::now();
    let index = initial_frame(&session, &TpoEngine, SelectionRange::new(0, 0), now)?.day_index;
    let mut app = App::new(initial_frame(
        &session,
        &TpoEngine,
        SelectionRange::latest_day(&index),
        now,
    )?);

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let gate = RefreshGate::new();
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<RefreshResult>();

    let mut ticker = interval(config.refresh.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_draw = Instant::now() - DRAW_INTERVAL;

    let result: Result<(), Box<dyn Error>> = loop {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.handle_key(key) {
                        AppAction::Quit => break Ok(()),
                        AppAction::Refresh | AppAction::SelectionChanged => {
                            if spawn_refresh(&gate, &client, &session, app.selection(), &result_tx) {
                                app.refresh_started();
                            }
                        }
                        AppAction::None => {}
                    }
                }
            }
        }

        tokio::select! {
            biased;
            Some(result) = result_rx.recv() => app.apply_refresh(result),
            _ = ticker.tick() => {
                if spawn_refresh(&gate, &client, &session, app.selection(), &result_tx) {
                    app.refresh_started();
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        if last_draw.elapsed() >= DRAW_INTERVAL {
            if let Err(error) = terminal.draw(|f| render(f, &app)) {
                break Err(error.into());
            }
            last_draw = Instant::now();
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}
