//! Compose pane: the message input box and typing-signal bookkeeping.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use std::time::{Duration, Instant};

/// Re-announce typing at most this often while the user keeps editing.
const TYPING_REFRESH: Duration = Duration::from_secs(2);

/// Emit `typing_stop` after this much edit silence.
const TYPING_IDLE: Duration = Duration::from_secs(3);

/// State for the compose pane.
#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    last_edit: Option<Instant>,
    last_typing_sent: Option<Instant>,
}

/// Typing signal the app should emit after an edit or a tick.
#[derive(Debug, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
    None,
}

impl ComposeState {
    /// Record a character edit. Returns `Start` when a typing announcement
    /// is due (first keystroke, or refresh after `TYPING_REFRESH`).
    pub fn push_char(&mut self, c: char) -> TypingSignal {
        self.input.push(c);
        self.edited()
    }

    pub fn backspace(&mut self) -> TypingSignal {
        self.input.pop();
        self.edited()
    }

    fn edited(&mut self) -> TypingSignal {
        let now = Instant::now();
        self.last_edit = Some(now);
        let due = match self.last_typing_sent {
            None => true,
            Some(sent) => now.duration_since(sent) >= TYPING_REFRESH,
        };
        if due {
            self.last_typing_sent = Some(now);
            TypingSignal::Start
        } else {
            TypingSignal::None
        }
    }

    /// Periodic check: after enough idle time, the peer should stop seeing
    /// the indicator even though no stop keystroke exists.
    pub fn on_tick(&mut self) -> TypingSignal {
        match (self.last_typing_sent, self.last_edit) {
            (Some(_), Some(edit)) if edit.elapsed() >= TYPING_IDLE => {
                self.reset_typing();
                TypingSignal::Stop
            }
            _ => TypingSignal::None,
        }
    }

    /// Take the trimmed input for sending; clears the box. Returns `None`
    /// for whitespace-only content.
    pub fn take_input(&mut self) -> Option<String> {
        let content = self.input.trim().to_string();
        self.input.clear();
        self.reset_typing();
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    fn reset_typing(&mut self) {
        self.last_edit = None;
        self.last_typing_sent = None;
    }

    /// Whether sending reached the wire already announced typing; the app
    /// pairs a final `typing_stop` with every send.
    pub fn announced_typing(&self) -> bool {
        self.last_typing_sent.is_some()
    }
}

/// Render the compose pane.
pub fn render(area: Rect, buf: &mut Buffer, state: &ComposeState, focused: bool) {
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
        .title(" Message (Enter to send) ");

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // Show the tail of the input when it overflows the box, measured in
    // display columns so wide and multibyte characters stay visible.
    let budget = (inner.width as usize).saturating_sub(1);
    let shown = tail_window(&state.input, budget);

    let cursor = if focused { "_" } else { "" };
    Paragraph::new(Line::from(vec![
        Span::raw(shown),
        Span::styled(cursor, Style::default().fg(Color::Yellow)),
    ]))
    .render(Rect::new(inner.x, inner.y, inner.width, 1), buf);
}

/// Longest suffix of `input` that fits in `budget` display columns.
fn tail_window(input: &str, budget: usize) -> String {
    if unicode_width::UnicodeWidthStr::width(input) <= budget {
        return input.to_string();
    }
    let mut cols = 0;
    let mut tail: Vec<char> = Vec::new();
    for c in input.chars().rev() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if cols + w > budget {
            break;
        }
        cols += w;
        tail.push(c);
    }
    tail.reverse();
    tail.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_keystroke_announces_typing() {
        let mut compose = ComposeState::default();
        assert_eq!(compose.push_char('h'), TypingSignal::Start);
        // Immediately after, no re-announcement.
        assert_eq!(compose.push_char('i'), TypingSignal::None);
        assert_eq!(compose.input, "hi");
    }

    #[test]
    fn test_take_input_trims_and_clears() {
        let mut compose = ComposeState::default();
        compose.push_char(' ');
        compose.push_char('h');
        compose.push_char('i');
        compose.push_char(' ');

        assert_eq!(compose.take_input().as_deref(), Some("hi"));
        assert!(compose.input.is_empty());
        assert!(!compose.announced_typing());
    }

    #[test]
    fn test_take_input_rejects_whitespace() {
        let mut compose = ComposeState::default();
        compose.push_char(' ');
        assert_eq!(compose.take_input(), None);
    }

    #[test]
    fn test_tick_without_typing_is_silent() {
        let mut compose = ComposeState::default();
        assert_eq!(compose.on_tick(), TypingSignal::None);
    }

    #[test]
    fn test_tail_window_short_input_unchanged() {
        assert_eq!(tail_window("hi", 8), "hi");
    }

    #[test]
    fn test_tail_window_keeps_multibyte_tail() {
        // 10 accented chars overflowing 8 columns: the last 8 stay visible.
        let input = "é".repeat(10);
        let tail = tail_window(&input, 8);
        assert_eq!(tail.chars().count(), 8);
        assert!(tail.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_tail_window_counts_wide_chars_as_two_columns() {
        assert_eq!(tail_window("日本語です", 4), "です");
    }

    #[test]
    fn test_render_shows_multibyte_tail() {
        let area = Rect::new(0, 0, 10, 3);
        let mut buf = Buffer::empty(area);
        let mut state = ComposeState::default();
        for _ in 0..10 {
            state.push_char('é');
        }

        render(area, &mut buf, &state, false);

        let row: String = (1..9).map(|x| buf[(x, 1)].symbol()).collect();
        assert!(row.contains('é'));
    }
}
