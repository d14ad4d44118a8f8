//! Conversation session controller
//!
//! Binds the selected conversation to the connection (room join) and to the
//! message synchronizer (reset + reload). Every lifecycle transition runs as
//! one explicit routine with a fixed step order instead of scattered
//! reactions.

use anyhow::Result;
use std::future::Future;

use super::presence::{PresenceTracker, TypingIndicator};
use super::{LoadOutcome, LoadTicket, MessageFetcher, MessageSync};
use crate::models::ChatUser;
use crate::realtime::events::ServerEvent;
use crate::realtime::ConnectionManager;

/// Seam for resolving the existing-or-created conversation with a peer, so
/// conversation selection is testable without a server.
pub trait ConversationResolver {
    fn resolve(&self, peer_user_id: &str) -> impl Future<Output = Result<ChatUser>>;
}

/// Per-login session state: the active conversation plus the trackers fed
/// by the shared connection.
pub struct Session {
    own_user_id: String,
    active: Option<ChatUser>,
    pub sync: MessageSync,
    pub presence: PresenceTracker,
    pub typing: TypingIndicator,
}

impl Session {
    pub fn new(own_user_id: impl Into<String>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            active: None,
            sync: MessageSync::new(),
            presence: PresenceTracker::new(),
            typing: TypingIndicator::new(),
        }
    }

    pub fn own_user_id(&self) -> &str {
        &self.own_user_id
    }

    pub fn active(&self) -> Option<&ChatUser> {
        self.active.as_ref()
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active.as_ref().map(|c| c.conversation_id.as_str())
    }

    /// Start switching to a conversation. Steps, in order: drop any visible
    /// typing indicator, reset the synchronizer (so a live event for the
    /// new conversation cannot land in the old list), join the channel if
    /// connected. Returns the load ticket for the page-1 fetch; the caller
    /// fetches and applies it (a stale ticket after a further switch is
    /// discarded by the synchronizer).
    pub fn begin_switch(&mut self, target: ChatUser, conn: &ConnectionManager) -> LoadTicket {
        tracing::info!("Switching to conversation {}", target.conversation_id);

        self.typing.clear();
        let ticket = self.sync.restart(target.conversation_id.clone());

        // No-op with a log when not connected; the connected handler
        // re-joins once the link is up.
        conn.join_channel(&target.conversation_id);

        self.active = Some(target);
        ticket
    }

    /// Switch to a conversation and load its first page in one call.
    pub async fn switch_to(
        &mut self,
        target: ChatUser,
        conn: &ConnectionManager,
        fetcher: &impl MessageFetcher,
    ) -> Result<LoadOutcome> {
        let ticket = self.begin_switch(target, conn);
        match fetcher
            .fetch_page(ticket.conversation_id(), ticket.page(), super::PAGE_SIZE)
            .await
        {
            Ok(page) => Ok(self.sync.apply_page(&ticket, page)),
            Err(e) => {
                self.sync.fail_load(&ticket);
                Err(e)
            }
        }
    }

    /// Resolve the existing-or-created conversation with a peer and make it
    /// active.
    pub async fn select_conversation<C>(
        &mut self,
        client: &C,
        conn: &ConnectionManager,
        peer_user_id: &str,
    ) -> Result<LoadOutcome>
    where
        C: ConversationResolver + MessageFetcher,
    {
        let chat = client.resolve(peer_user_id).await?;
        self.switch_to(chat, conn, client).await
    }

    /// Route an inbound event into the trackers and the synchronizer.
    /// Returns true when visible state changed.
    ///
    /// `Connected` is not handled here: the presence snapshot it triggers
    /// is a REST call owned by the caller.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::Message(ev) => {
                let appended = self.sync.append_live(ev.message.clone());
                if appended && ev.message.sender_id != self.own_user_id {
                    // The peer's message supersedes their typing state.
                    self.typing
                        .clear_typing(&ev.message.conversation_id, &ev.message.sender_id);
                }
                appended
            }
            ServerEvent::UserOnline(ev) => {
                self.presence.mark_online(&ev.user_id);
                true
            }
            ServerEvent::UserOffline(ev) => {
                self.presence.mark_offline(&ev.user_id);
                true
            }
            ServerEvent::Typing(ev) => {
                let active = self.active_conversation_id().map(str::to_string);
                self.typing.set_typing(
                    &ev.conversation_id,
                    &ev.user_id,
                    active.as_deref(),
                    &self.own_user_id,
                );
                self.typing.is_typing(active.as_deref())
            }
            ServerEvent::StoppedTyping(ev) => {
                self.typing.clear_typing(&ev.conversation_id, &ev.user_id);
                true
            }
            ServerEvent::Disconnected => {
                // Events stop arriving; the roster cannot be trusted until
                // the next snapshot.
                self.presence.clear();
                true
            }
            ServerEvent::JoinedRoom(ev) => {
                tracing::debug!("Joined room {}", ev.conversation_id);
                false
            }
            ServerEvent::Connected => false,
        }
    }
}
