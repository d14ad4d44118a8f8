//! Messages pane: the active conversation's history and live messages.
//!
//! Scroll position is tracked as distance from the bottom of the rendered
//! line buffer. Prepending an older page grows the buffer at the top, which
//! leaves that distance -- and therefore the reading position -- unchanged.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::{Direction, Message};

/// State for the messages pane.
#[derive(Default)]
pub struct MessagesState {
    /// Rendered lines between the viewport bottom and the list bottom.
    /// 0 means pinned to the newest message.
    pub scroll_from_bottom: usize,
    /// Line count at last render, for scroll clamping in key handlers.
    pub last_total_lines: usize,
    /// Viewport height at last render.
    pub last_visible: usize,
}

impl MessagesState {
    pub fn scroll_up(&mut self) {
        let max = self.last_total_lines.saturating_sub(self.last_visible);
        if self.scroll_from_bottom < max {
            self.scroll_from_bottom += 1;
        }
    }

    pub fn scroll_down(&mut self) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_from_bottom = 0;
    }

    /// Whether the view sits at the top edge of loaded history, i.e. the
    /// point where older messages should be fetched.
    pub fn at_top(&self) -> bool {
        self.scroll_from_bottom >= self.last_total_lines.saturating_sub(self.last_visible)
    }
}

/// First visible line index for a buffer of `total` lines shown in a
/// `visible`-line viewport at `from_bottom` lines above the end.
pub fn resolve_scroll(total: usize, visible: usize, from_bottom: usize) -> usize {
    let max_from_bottom = total.saturating_sub(visible);
    let clamped = from_bottom.min(max_from_bottom);
    total.saturating_sub(visible) - clamped
}

/// Render the messages pane.
#[allow(clippy::too_many_arguments)]
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    messages: &[Message],
    own_user_id: &str,
    peer_name: &str,
    typing: bool,
    loading: bool,
    state: &mut MessagesState,
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
        .title(format!(" {} ", peer_name));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let width = inner.width as usize;
    let mut lines = build_message_lines(messages, own_user_id, width);
    if typing {
        lines.push(Line::from(Span::styled(
            format!("{} is typing...", peer_name),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::DIM),
        )));
    }

    let total = lines.len();
    let visible = inner.height as usize;
    state.last_total_lines = total;
    state.last_visible = visible;

    let start = resolve_scroll(total, visible, state.scroll_from_bottom);
    for (row, line) in lines.iter().skip(start).take(visible).enumerate() {
        let y = inner.y + row as u16;
        Paragraph::new(line.clone()).render(Rect::new(inner.x, y, inner.width, 1), buf);
    }

    if loading {
        let cell = &mut buf[(inner.x, inner.y)];
        cell.set_char('~');
        cell.set_style(Style::default().fg(Color::Yellow));
    }
}

/// Flatten messages into styled lines: a header line per message, wrapped
/// content, and a blank separator.
fn build_message_lines(messages: &[Message], own_user_id: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in messages {
        let (label, header_style) = match msg.direction(own_user_id) {
            Direction::Sent => (
                "you",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
            Direction::Received => (
                "them",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        };

        lines.push(Line::from(vec![
            Span::styled(label.to_string(), header_style),
            Span::styled(
                format!("  {}", msg.created_at.format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

        for text in wrap_text(&msg.content, width.saturating_sub(2)) {
            lines.push(Line::from(format!("  {}", text)));
        }

        lines.push(Line::from(""));
    }

    lines
}

/// Simple word-wrapping: split content by newlines first, then wrap long lines.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        if line.len() <= max_width {
            result.push(line.to_string());
        } else {
            let words: Vec<&str> = line.split_whitespace().collect();
            let mut current = String::new();
            for word in words {
                if current.is_empty() {
                    current = word.to_string();
                } else if current.len() + 1 + word.len() <= max_width {
                    current.push(' ');
                    current.push_str(word);
                } else {
                    result.push(current);
                    current = word.to_string();
                }
            }
            if !current.is_empty() {
                result.push(current);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_scroll_pinned_bottom() {
        // 100 lines, 20 visible, pinned at bottom: show lines 80..100.
        assert_eq!(resolve_scroll(100, 20, 0), 80);
    }

    #[test]
    fn test_resolve_scroll_clamps() {
        assert_eq!(resolve_scroll(100, 20, 500), 0);
        assert_eq!(resolve_scroll(10, 20, 3), 0);
    }

    #[test]
    fn test_prepend_preserves_distance_from_bottom() {
        let visible = 20;
        let from_bottom = 15;

        let before = resolve_scroll(100, visible, from_bottom);
        // An older page renders as 120 extra lines above the current top.
        let after = resolve_scroll(220, visible, from_bottom);

        // The window shifts down by exactly the prepended amount, so the
        // distance from the bottom (the reading position) is unchanged.
        assert_eq!(after, before + 120);
        assert_eq!(220 - (after + visible), from_bottom);
    }

    #[test]
    fn test_scroll_up_stops_at_top() {
        let mut state = MessagesState {
            scroll_from_bottom: 0,
            last_total_lines: 25,
            last_visible: 20,
        };
        for _ in 0..10 {
            state.scroll_up();
        }
        assert_eq!(state.scroll_from_bottom, 5);
        assert!(state.at_top());
    }

    #[test]
    fn test_wrap_text_long_words() {
        let wrapped = wrap_text("a bb ccc dddd", 5);
        assert_eq!(wrapped, vec!["a bb", "ccc", "dddd"]);
    }
}
