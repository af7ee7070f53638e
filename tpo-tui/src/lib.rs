//! # TPO-TUI
//! Terminal presenter for the live market profile built by [`tpo_data`].
//!
//! [`App`] owns the frame on screen and reacts to key presses, [`widget::render`] draws it.

pub mod app;
pub mod widget;

pub use app::{App, AppAction, RefreshStatus};
pub use widget::render;
