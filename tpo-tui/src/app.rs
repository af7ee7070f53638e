//! Presenter state: the frame on screen, the range selection and the refresh status.

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tpo_data::{error::DataError, merge::SelectionRange, refresh::DisplayFrame};
use tracing::{info, warn};

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    None,
    Quit,
    Refresh,
    SelectionChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Showing the historical-only frame.
    Historical,
    Refreshing,
    Updated(DateTime<Utc>),
    Failed { at: DateTime<Utc>, message: String },
}

#[derive(Debug, Clone)]
pub struct App {
    frame: DisplayFrame,
    selection: SelectionRange,
    status: RefreshStatus,
    failures: usize,
}

impl App {
    pub fn new(frame: DisplayFrame) -> Self {
        Self {
            selection: frame.selection,
            frame,
            status: RefreshStatus::Historical,
            failures: 0,
        }
    }

    pub fn frame(&self) -> &DisplayFrame {
        &self.frame
    }

    /// Selection the next refresh should use.
    pub fn selection(&self) -> SelectionRange {
        self.selection
    }

    pub fn status(&self) -> &RefreshStatus {
        &self.status
    }

    /// Consecutive failed refreshes.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => AppAction::Quit,
            KeyCode::Char('r') | KeyCode::Char('R') => AppAction::Refresh,
            KeyCode::Left if shift => self.shift_end(-1),
            KeyCode::Right if shift => self.shift_end(1),
            KeyCode::Left => self.shift_start(-1),
            KeyCode::Right => self.shift_start(1),
            KeyCode::Char('[') => self.shift_end(-1),
            KeyCode::Char(']') => self.shift_end(1),
            _ => AppAction::None,
        }
    }

    fn shift_start(&mut self, delta: isize) -> AppAction {
        let next = self.selection.shift_start(delta, &self.frame.day_index);
        self.select(next)
    }

    fn shift_end(&mut self, delta: isize) -> AppAction {
        let next = self.selection.shift_end(delta, &self.frame.day_index);
        self.select(next)
    }

    fn select(&mut self, next: SelectionRange) -> AppAction {
        if next == self.selection {
            return AppAction::None;
        }
        self.frame = self.frame.reselect(next);
        self.selection = self.frame.selection;
        AppAction::SelectionChanged
    }

    pub fn refresh_started(&mut self) {
        self.status = RefreshStatus::Refreshing;
    }

    /// Swap in a fresh frame, or keep the current one and record the failure.
    ///
    /// The user's latest selection wins over the one the refresh was started with.
    pub fn apply_refresh(&mut self, result: Result<DisplayFrame, DataError>) {
        match result {
            Ok(frame) => {
                self.frame = frame.reselect(self.selection);
                self.selection = self.frame.selection;
                self.status = RefreshStatus::Updated(self.frame.refreshed_at);
                self.failures = 0;
                info!(
                    bars = self.frame.merged.len(),
                    days = self.frame.day_index.len() - 1,
                    "display frame updated"
                );
            }
            Err(error) => {
                self.failures += 1;
                warn!(%error, failures = self.failures, "refresh failed, keeping previous frame");
                self.status = RefreshStatus::Failed {
                    at: Utc::now(),
                    message: error.to_string(),
                };
            }
        }
    }
}
