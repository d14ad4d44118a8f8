//! Terminal user interface
//!
//! Interactive chat view using Ratatui: conversation sidebar, message pane
//! with history pagination, compose box with typing signals.

mod app;
mod compose;
mod messages;
mod sidebar;
mod ui;

pub use app::run;
