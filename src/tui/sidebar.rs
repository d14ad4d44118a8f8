//! Sidebar pane: conversation list with presence and unread badges.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::ChatUser;
use crate::sync::presence::PresenceTracker;

/// State for the sidebar pane.
#[derive(Default)]
pub struct SidebarState {
    /// Index of the highlighted conversation.
    pub selected: usize,
}

impl SidebarState {
    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn select_next(&mut self, len: usize) {
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

/// Render the sidebar into the given area.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    chats: &[ChatUser],
    presence: &PresenceTracker,
    active_conversation: Option<&str>,
    state: &SidebarState,
    focused: bool,
) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let border_type = if focused {
        BorderType::Double
    } else {
        BorderType::Plain
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(" Chats ");

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    if chats.is_empty() {
        Paragraph::new(Line::from(Span::styled(
            " (no conversations) ",
            Style::default().fg(Color::DarkGray),
        )))
        .render(Rect::new(inner.x, inner.y, inner.width, 1), buf);
        return;
    }

    // Keep the highlighted row in view.
    let visible = inner.height as usize;
    let scroll = state.selected.saturating_sub(visible.saturating_sub(1));

    for (row, (idx, chat)) in chats
        .iter()
        .enumerate()
        .skip(scroll)
        .take(visible)
        .enumerate()
    {
        let y = inner.y + row as u16;
        let is_selected = idx == state.selected;
        let is_active = active_conversation == Some(chat.conversation_id.as_str());

        let dot_style = if presence.is_online(&chat.id) {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        let mut name_style = Style::default().fg(Color::White);
        if is_active {
            name_style = name_style.add_modifier(Modifier::BOLD);
        }
        if is_selected && focused {
            name_style = name_style.bg(Color::DarkGray);
        }

        let mut spans = vec![
            Span::styled("* ", dot_style),
            Span::styled(chat.name.clone(), name_style),
        ];
        if chat.unread > 0 {
            spans.push(Span::styled(
                format!(" ({})", chat.unread),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        }

        Paragraph::new(Line::from(spans)).render(Rect::new(inner.x, y, inner.width, 1), buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_bounds() {
        let mut state = SidebarState::default();
        state.select_previous();
        assert_eq!(state.selected, 0);

        state.select_next(3);
        state.select_next(3);
        state.select_next(3);
        assert_eq!(state.selected, 2);
    }

    #[test]
    fn test_clamp_after_refresh() {
        let mut state = SidebarState { selected: 5 };
        state.clamp(2);
        assert_eq!(state.selected, 1);
        state.clamp(0);
        assert_eq!(state.selected, 0);
    }
}
