//! Top-level TUI layout

use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::app::{App, Pane};
use super::{compose, messages, sidebar};
use crate::realtime::ConnectionStatus;

/// Render the full interface: sidebar, messages, compose box, status line.
pub fn render(frame: &mut Frame, app: &mut App) {
    let [main, status] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());
    let [side, right] =
        Layout::horizontal([Constraint::Length(28), Constraint::Min(1)]).areas(main);
    let [msgs_area, compose_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(3)]).areas(right);

    let peer_name = app
        .session
        .active()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "no conversation".to_string());
    let typing = app
        .session
        .typing
        .is_typing(app.session.active_conversation_id());

    let buf = frame.buffer_mut();

    sidebar::render(
        side,
        buf,
        &app.chats,
        &app.session.presence,
        app.session.active_conversation_id(),
        &app.sidebar,
        app.active_pane == Pane::Sidebar,
    );

    messages::render(
        msgs_area,
        buf,
        app.session.sync.messages(),
        app.session.own_user_id(),
        &peer_name,
        typing,
        app.session.sync.is_loading(),
        &mut app.messages,
        app.active_pane == Pane::Messages,
    );

    compose::render(
        compose_area,
        buf,
        &app.compose,
        app.active_pane == Pane::Compose,
    );

    render_status_line(frame, status, app);
}

fn render_status_line(frame: &mut Frame, area: ratatui::layout::Rect, app: &App) {
    let (state_text, state_style) = match app.conn.status() {
        ConnectionStatus::Connected => (
            format!(" {} ", app.username),
            Style::default().fg(Color::Green),
        ),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => (
            " reconnecting... ".to_string(),
            Style::default().fg(Color::Yellow),
        ),
        ConnectionStatus::Failed => (
            " offline - press 'r' to reconnect ".to_string(),
            Style::default().fg(Color::Red),
        ),
        ConnectionStatus::Disconnected => (
            " disconnected ".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };

    let mut spans = vec![Span::styled(state_text, state_style)];
    if let Some(ref note) = app.status_note {
        spans.push(Span::styled(
            format!("| {} ", note),
            Style::default().fg(Color::Red),
        ));
    }
    spans.push(Span::styled(
        "| Tab: pane  Enter: open/send  q: quit",
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
