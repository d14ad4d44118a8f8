//! TUI application state and main event loop

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::compose::{ComposeState, TypingSignal};
use super::messages::MessagesState;
use super::sidebar::SidebarState;
use super::ui;
use crate::api::{self, ApiClient, ApiError};
use crate::models::{ChatUser, Message, MessagePage};
use crate::realtime::{events, ConnectionManager, ConnectionStatus};
use crate::sync::{LoadOutcome, LoadTicket, PAGE_SIZE};
use crate::sync::session::Session;

const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Which pane owns the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pane {
    #[default]
    Sidebar,
    Messages,
    Compose,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Sidebar => Pane::Messages,
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Sidebar,
        }
    }
}

/// Everything the event loop feeds back to itself: realtime events plus
/// results of spawned REST calls.
enum AppEvent {
    Server(events::ServerEvent),
    PageLoaded(LoadTicket, Result<MessagePage>),
    SnapshotLoaded(Result<Vec<String>>),
    ChatsLoaded(Result<Vec<ChatUser>>),
}

pub struct App {
    pub client: Arc<ApiClient>,
    pub conn: ConnectionManager,
    pub session: Session,
    pub username: String,
    pub chats: Vec<ChatUser>,
    pub sidebar: SidebarState,
    pub messages: MessagesState,
    pub compose: ComposeState,
    pub active_pane: Pane,
    pub status_note: Option<String>,
    should_exit: bool,
    token: String,
    tx: mpsc::UnboundedSender<AppEvent>,
}

/// Run the interactive client. Requires a prior `login`.
pub async fn run() -> Result<()> {
    let client = Arc::new(ApiClient::new()?);
    let token = client.access_token().ok_or(ApiError::NotLoggedIn)?;

    let me = api::auth::me(&client)
        .await
        .context("Failed to validate session")?;
    client.store_identity(me.id.clone(), me.username.clone())?;

    let chats = api::conversations::list(&client).await?;

    let conn = ConnectionManager::new(client.base_url());
    let (tx, rx) = mpsc::unbounded_channel();
    wire_server_events(&conn, &tx);
    conn.connect(token.clone());

    let mut app = App {
        session: Session::new(me.id),
        username: me.username,
        client,
        conn,
        chats,
        sidebar: SidebarState::default(),
        messages: MessagesState::default(),
        compose: ComposeState::default(),
        active_pane: Pane::Sidebar,
        status_note: None,
        should_exit: false,
        token,
        tx,
    };

    let mut terminal = ratatui::init();
    let result = app.run_loop(&mut terminal, rx).await;
    ratatui::restore();
    app.conn.disconnect();
    result
}

/// Forward every inbound event into the app channel. Parsing happens on
/// the socket task; the loop only sees typed events.
fn wire_server_events(conn: &ConnectionManager, tx: &mpsc::UnboundedSender<AppEvent>) {
    let names = [
        events::MESSAGE_RECEIVED,
        events::USER_ONLINE,
        events::USER_OFFLINE,
        events::USER_TYPING,
        events::USER_STOPPED_TYPING,
        events::JOINED_ROOM,
        events::CONNECTED,
        events::DISCONNECTED,
    ];
    for name in names {
        let tx = tx.clone();
        conn.subscribe(name, move |data| {
            if let Some(event) = events::ServerEvent::parse(name, data) {
                let _ = tx.send(AppEvent::Server(event));
            }
        });
    }
}

impl App {
    async fn run_loop(
        &mut self,
        terminal: &mut DefaultTerminal,
        mut rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Result<()> {
        let mut term_events = EventStream::new();
        let mut tick = tokio::time::interval(TICK_INTERVAL);

        while !self.should_exit {
            terminal.draw(|frame| ui::render(frame, self))?;

            tokio::select! {
                ev = term_events.next() => match ev {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        self.handle_key(key);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("Terminal event stream failed"),
                    None => self.should_exit = true,
                },
                ev = rx.recv() => match ev {
                    Some(ev) => self.handle_app_event(ev),
                    None => self.should_exit = true,
                },
                _ = tick.tick() => self.on_tick(),
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return;
        }
        if key.code == KeyCode::Tab {
            self.active_pane = self.active_pane.next();
            return;
        }

        match self.active_pane {
            Pane::Sidebar => self.handle_sidebar_key(key),
            Pane::Messages => self.handle_messages_key(key),
            Pane::Compose => self.handle_compose_key(key),
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Up | KeyCode::Char('k') => self.sidebar.select_previous(),
            KeyCode::Down | KeyCode::Char('j') => self.sidebar.select_next(self.chats.len()),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('r') => self.refresh(),
            _ => {}
        }
    }

    fn handle_messages_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Esc => self.active_pane = Pane::Sidebar,
            KeyCode::Up | KeyCode::Char('k') => {
                self.messages.scroll_up();
                self.maybe_request_older();
            }
            KeyCode::Down | KeyCode::Char('j') => self.messages.scroll_down(),
            KeyCode::PageUp => {
                for _ in 0..10 {
                    self.messages.scroll_up();
                }
                self.maybe_request_older();
            }
            KeyCode::PageDown => {
                for _ in 0..10 {
                    self.messages.scroll_down();
                }
            }
            KeyCode::End => self.messages.scroll_to_bottom(),
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.active_pane = Pane::Messages,
            KeyCode::Enter => self.send_current(),
            KeyCode::Backspace => {
                let signal = self.compose.backspace();
                self.emit_typing(signal);
            }
            KeyCode::Char(c) => {
                let signal = self.compose.push_char(c);
                self.emit_typing(signal);
            }
            _ => {}
        }
    }

    /// Open the highlighted conversation: all freshly-loaded state from
    /// here on belongs to the new conversation, and any response still in
    /// flight for the previous one will be discarded as stale.
    fn open_selected(&mut self) {
        let Some(chat) = self.chats.get(self.sidebar.selected).cloned() else {
            return;
        };
        if let Some(entry) = self
            .chats
            .iter_mut()
            .find(|c| c.conversation_id == chat.conversation_id)
        {
            entry.unread = 0;
        }

        // The draft belongs to the conversation it was typed in; stop any
        // announced typing there and start the new one with an empty box.
        if self.compose.announced_typing() {
            self.emit_typing(TypingSignal::Stop);
        }
        self.compose = ComposeState::default();

        self.status_note = None;
        self.messages.scroll_to_bottom();
        let ticket = self.session.begin_switch(chat, &self.conn);
        self.spawn_fetch(ticket);
        self.active_pane = Pane::Compose;
    }

    /// Reconnect after a failed link and re-pull the conversation list.
    fn refresh(&mut self) {
        if self.conn.status() == ConnectionStatus::Failed {
            self.conn.connect(self.token.clone());
        }
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api::conversations::list(&client).await;
            let _ = tx.send(AppEvent::ChatsLoaded(result));
        });
    }

    fn maybe_request_older(&mut self) {
        if !self.messages.at_top() {
            return;
        }
        if let Some(ticket) = self.session.sync.begin_older() {
            self.spawn_fetch(ticket);
        }
    }

    fn spawn_fetch(&self, ticket: LoadTicket) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = api::messages::fetch_page(
                &client,
                ticket.conversation_id(),
                ticket.page(),
                PAGE_SIZE,
            )
            .await;
            let _ = tx.send(AppEvent::PageLoaded(ticket, result));
        });
    }

    fn send_current(&mut self) {
        let announced = self.compose.announced_typing();
        let Some(content) = self.compose.take_input() else {
            return;
        };
        match self.session.sync.send(&self.conn, &content) {
            Ok(()) => {
                // The sent message appears only once the server echoes it
                // back through the socket.
                if announced {
                    self.emit_typing(TypingSignal::Stop);
                }
                self.status_note = None;
            }
            Err(e) => self.status_note = Some(format!("{:#}", e)),
        }
    }

    fn emit_typing(&mut self, signal: TypingSignal) {
        let Some(conversation_id) = self.session.active_conversation_id() else {
            return;
        };
        match signal {
            TypingSignal::Start => self
                .conn
                .emit(events::TYPING_START, events::typing(conversation_id)),
            TypingSignal::Stop => self
                .conn
                .emit(events::TYPING_STOP, events::typing(conversation_id)),
            TypingSignal::None => {}
        }
    }

    fn on_tick(&mut self) {
        let signal = self.compose.on_tick();
        self.emit_typing(signal);
        // Typing expiry for the peer's indicator is checked at render time.
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Server(ev) => self.handle_server_event(ev),
            AppEvent::PageLoaded(ticket, result) => self.handle_page(ticket, result),
            AppEvent::SnapshotLoaded(Ok(ids)) => self.session.presence.snapshot(ids),
            AppEvent::SnapshotLoaded(Err(e)) => {
                tracing::warn!("Presence snapshot failed: {:#}", e);
            }
            AppEvent::ChatsLoaded(Ok(chats)) => {
                self.chats = chats;
                self.sidebar.clamp(self.chats.len());
            }
            AppEvent::ChatsLoaded(Err(e)) => {
                self.status_note = Some(format!("Refresh failed: {:#}", e));
            }
        }
    }

    fn handle_page(&mut self, ticket: LoadTicket, result: Result<MessagePage>) {
        match result {
            Ok(page) => {
                let outcome = self.session.sync.apply_page(&ticket, page);
                if ticket.is_initial() && matches!(outcome, LoadOutcome::Applied { .. }) {
                    self.messages.scroll_to_bottom();
                }
                // Older pages change nothing here: scroll is measured from
                // the bottom, so prepended history keeps the view in place.
            }
            Err(e) => {
                self.session.sync.fail_load(&ticket);
                if self.session.active_conversation_id() == Some(ticket.conversation_id()) {
                    self.status_note = Some(format!("Load failed: {:#}", e));
                }
            }
        }
    }

    fn handle_server_event(&mut self, event: events::ServerEvent) {
        if let events::ServerEvent::Connected = event {
            // Incremental presence events did not flow while the link was
            // down; replace the roster with a fresh snapshot.
            let client = Arc::clone(&self.client);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = api::users::online_ids(&client).await;
                let _ = tx.send(AppEvent::SnapshotLoaded(result));
            });
            if let Some(conversation_id) = self.session.active_conversation_id() {
                self.conn.join_channel(conversation_id);
            }
            self.status_note = None;
            return;
        }

        if let events::ServerEvent::Message(ref ev) = event {
            self.note_message(&ev.message);
        }

        let was_pinned = self.messages.scroll_from_bottom == 0;
        let changed = self.session.apply_event(&event);
        if changed && was_pinned {
            self.messages.scroll_to_bottom();
        }
    }

    /// Keep the sidebar preview and unread badge current for any incoming
    /// message, whether or not its conversation is open.
    fn note_message(&mut self, message: &Message) {
        let own = self.session.own_user_id().to_string();
        let active = self
            .session
            .active_conversation_id()
            .map(str::to_string);
        if let Some(chat) = self
            .chats
            .iter_mut()
            .find(|c| c.conversation_id == message.conversation_id)
        {
            chat.last_message = Some(message.content.clone());
            chat.last_message_at = Some(message.created_at);
            if active.as_deref() != Some(chat.conversation_id.as_str()) && message.sender_id != own
            {
                chat.unread += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pane_cycle_order() {
        assert_eq!(Pane::Sidebar.next(), Pane::Messages);
        assert_eq!(Pane::Messages.next(), Pane::Compose);
        assert_eq!(Pane::Compose.next(), Pane::Sidebar);
    }

    fn chat(conversation: &str, peer: &str) -> ChatUser {
        ChatUser {
            id: peer.into(),
            conversation_id: conversation.into(),
            name: peer.into(),
            last_message: None,
            last_message_at: None,
            unread: 0,
            online: false,
        }
    }

    #[test]
    fn test_switch_resets_compose_draft() {
        tokio_test::block_on(async {
            let (tx, _rx) = mpsc::unbounded_channel();
            let mut app = App {
                client: Arc::new(ApiClient::new().unwrap()),
                conn: ConnectionManager::new("http://localhost:3000/api"),
                session: Session::new("me"),
                username: "me".to_string(),
                chats: vec![chat("conv-a", "peer")],
                sidebar: SidebarState::default(),
                messages: MessagesState::default(),
                compose: ComposeState::default(),
                active_pane: Pane::Sidebar,
                status_note: None,
                should_exit: false,
                token: "token".into(),
                tx,
            };

            app.compose.push_char('d');
            app.compose.push_char('r');
            assert!(app.compose.announced_typing());

            app.open_selected();

            // The draft and its typing bookkeeping never cross conversations.
            assert!(app.compose.input.is_empty());
            assert!(!app.compose.announced_typing());
            assert_eq!(app.session.active_conversation_id(), Some("conv-a"));
        });
    }
}
