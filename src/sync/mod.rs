//! Message synchronization core
//!
//! Reconciles the paginated REST history with live `message_received`
//! events into one ordered, deduplicated list for the active conversation.

pub mod presence;
pub mod session;

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;

use crate::api::ApiError;
use crate::models::{Message, MessagePage};
use crate::realtime::{events, ConnectionManager};

/// Fixed history page size.
pub const PAGE_SIZE: u32 = 50;

/// Fetch seam for message history, so the synchronizer is testable without
/// a server.
pub trait MessageFetcher {
    fn fetch_page(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<MessagePage>>;
}

/// Identifies one in-flight load. Captures the conversation generation at
/// the time the load started; a result whose ticket no longer matches is
/// discarded instead of corrupting the list of a later conversation.
/// There is no true cancellation of network calls, so staleness is detected
/// here, at apply time.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    conversation_id: String,
    generation: u64,
    page: u32,
}

impl LoadTicket {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether this ticket starts a fresh list rather than paginating.
    pub fn is_initial(&self) -> bool {
        self.page == 1
    }
}

/// Result of applying a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was merged; `added` messages were new.
    Applied { added: usize },
    /// The result belonged to an abandoned conversation or an outdated
    /// reset; nothing changed. Expected control flow, not an error.
    Stale,
    /// The operation was skipped (load already in flight, or no more
    /// history).
    NoOp,
}

/// The message list for the currently active conversation.
///
/// Owns that list exclusively; switching conversations discards it
/// entirely. Invariants: ascending `created_at` order, no duplicate ids.
pub struct MessageSync {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    page: u32,
    has_more: bool,
    loading: bool,
    generation: u64,
}

impl Default for MessageSync {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSync {
    pub fn new() -> Self {
        Self {
            conversation_id: None,
            messages: Vec::new(),
            page: 1,
            has_more: true,
            loading: false,
            generation: 0,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Clear the list and point the synchronizer at a conversation.
    ///
    /// `has_more` starts optimistically true and is corrected by the first
    /// fetch. Bumping the generation invalidates every outstanding ticket.
    pub fn reset(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = Some(conversation_id.into());
        self.messages.clear();
        self.page = 1;
        self.has_more = true;
        self.loading = false;
        self.generation += 1;
    }

    /// Reset to a conversation and start its page-1 load in one step.
    pub fn restart(&mut self, conversation_id: impl Into<String>) -> LoadTicket {
        let conversation_id = conversation_id.into();
        self.reset(conversation_id.clone());
        self.loading = true;
        LoadTicket {
            conversation_id,
            generation: self.generation,
            page: 1,
        }
    }

    /// Start the page-1 load for the active conversation.
    pub fn begin_initial(&mut self) -> Option<LoadTicket> {
        let conversation_id = self.conversation_id.clone()?;
        self.loading = true;
        Some(LoadTicket {
            conversation_id,
            generation: self.generation,
            page: 1,
        })
    }

    /// Start fetching the next older page. `None` (no-op) while a load is
    /// in flight or when history is exhausted.
    pub fn begin_older(&mut self) -> Option<LoadTicket> {
        if self.loading || !self.has_more {
            return None;
        }
        let conversation_id = self.conversation_id.clone()?;
        self.loading = true;
        Some(LoadTicket {
            conversation_id,
            generation: self.generation,
            page: self.page + 1,
        })
    }

    /// Merge a fetched page. Stale tickets are discarded without touching
    /// any state (the in-flight flag they refer to died with their
    /// generation).
    pub fn apply_page(&mut self, ticket: &LoadTicket, page: MessagePage) -> LoadOutcome {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Discarding stale page {} for conversation {}",
                ticket.page,
                ticket.conversation_id
            );
            return LoadOutcome::Stale;
        }

        let mut incoming = page.messages;
        let returned = incoming.len();
        // Stable sort: same-millisecond messages keep arrival order.
        incoming.sort_by_key(|m| m.created_at);

        let added;
        if ticket.is_initial() {
            added = incoming.len();
            self.messages = incoming;
        } else {
            // Older pages are prepended; ids already present are dropped so
            // overlapping pages can never duplicate, and previously loaded
            // messages keep their positions.
            let existing: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
            let mut unique: Vec<Message> = incoming
                .into_iter()
                .filter(|m| !existing.contains(m.id.as_str()))
                .collect();
            added = unique.len();
            unique.extend(self.messages.drain(..));
            self.messages = unique;
        }

        self.has_more = match &page.pagination {
            Some(meta) => meta.page < meta.pages,
            // Metadata missing: a full page suggests more history. On an
            // exact page-size boundary this costs one extra empty fetch,
            // which then lands in this branch and corrects it.
            None => returned as u32 >= PAGE_SIZE,
        };
        self.page = ticket.page;
        self.loading = false;

        LoadOutcome::Applied { added }
    }

    /// Record a failed load so a retry is possible. Stale failures are
    /// ignored entirely.
    pub fn fail_load(&mut self, ticket: &LoadTicket) {
        if ticket.generation == self.generation {
            self.loading = false;
        }
    }

    /// Merge a live message delivered over the realtime connection.
    ///
    /// Returns false when the message was ignored: it belongs to another
    /// conversation (a stale event after a switch) or its id is already
    /// present (reconnection replay).
    pub fn append_live(&mut self, message: Message) -> bool {
        match self.conversation_id.as_deref() {
            Some(active) if active == message.conversation_id => {}
            _ => {
                tracing::debug!(
                    "Ignoring live message for inactive conversation {}",
                    message.conversation_id
                );
                return false;
            }
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            tracing::debug!("Ignoring duplicate live message {}", message.id);
            return false;
        }
        // Live messages arrive in creation order; plain append keeps the
        // order invariant without a re-sort.
        self.messages.push(message);
        true
    }

    /// Send a message through the realtime connection.
    ///
    /// No optimistic insert: the message appears in the list only when the
    /// server echoes it back, so the list never contains anything absent
    /// from the server's record.
    pub fn send(&self, conn: &ConnectionManager, content: &str) -> Result<()> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("Message is empty".into()).into());
        }
        let conversation_id = self
            .conversation_id
            .as_deref()
            .ok_or_else(|| ApiError::Validation("No active conversation".into()))?;

        conn.emit(
            events::SEND_MESSAGE,
            events::send_message(conversation_id, content),
        );
        Ok(())
    }

    /// Fetch and merge page 1, replacing the list.
    pub async fn load_initial(&mut self, fetcher: &impl MessageFetcher) -> Result<LoadOutcome> {
        let ticket = match self.begin_initial() {
            Some(t) => t,
            None => return Ok(LoadOutcome::NoOp),
        };
        match fetcher
            .fetch_page(&ticket.conversation_id, ticket.page, PAGE_SIZE)
            .await
        {
            Ok(page) => Ok(self.apply_page(&ticket, page)),
            Err(e) => {
                self.fail_load(&ticket);
                Err(e)
            }
        }
    }

    /// Fetch and prepend the next older page.
    pub async fn load_older(&mut self, fetcher: &impl MessageFetcher) -> Result<LoadOutcome> {
        let ticket = match self.begin_older() {
            Some(t) => t,
            None => return Ok(LoadOutcome::NoOp),
        };
        match fetcher
            .fetch_page(&ticket.conversation_id, ticket.page, PAGE_SIZE)
            .await
        {
            Ok(page) => Ok(self.apply_page(&ticket, page)),
            Err(e) => {
                self.fail_load(&ticket);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pagination;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(id: &str, conversation: &str, minute: i64) -> Message {
        Message {
            id: id.into(),
            conversation_id: conversation.into(),
            sender_id: "peer".into(),
            content: format!("message {}", id),
            is_read: false,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minute),
        }
    }

    /// Serves pages of `per_page` messages, newest page first, like the
    /// backend does. Page 1 holds the newest `per_page` messages.
    struct FakeFetcher {
        conversation: String,
        total: usize,
        per_page: usize,
        with_meta: bool,
    }

    impl FakeFetcher {
        fn new(conversation: &str, total: usize) -> Self {
            Self {
                conversation: conversation.into(),
                total,
                per_page: PAGE_SIZE as usize,
                with_meta: true,
            }
        }

        fn page_messages(&self, page: u32) -> Vec<Message> {
            let pages = self.total.div_ceil(self.per_page).max(1);
            let idx = page as usize - 1;
            if idx >= pages {
                return Vec::new();
            }
            // Oldest message has minute 0; page 1 serves the newest block.
            let newest_excl = self.total - idx * self.per_page;
            let oldest_incl = newest_excl.saturating_sub(self.per_page);
            (oldest_incl..newest_excl)
                .map(|i| msg(&format!("m{}", i), &self.conversation, i as i64))
                .collect()
        }
    }

    impl MessageFetcher for FakeFetcher {
        async fn fetch_page(
            &self,
            _conversation_id: &str,
            page: u32,
            limit: u32,
        ) -> Result<MessagePage> {
            let pagination = self.with_meta.then(|| Pagination {
                page,
                limit,
                total: self.total as u64,
                pages: self.total.div_ceil(self.per_page).max(1) as u32,
            });
            Ok(MessagePage {
                messages: self.page_messages(page),
                pagination,
            })
        }
    }

    fn assert_invariants(sync: &MessageSync) {
        let msgs = sync.messages();
        let ids: HashSet<&str> = msgs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), msgs.len(), "duplicate ids in list");
        assert!(
            msgs.windows(2).all(|w| w[0].created_at <= w[1].created_at),
            "list not sorted ascending by created_at"
        );
    }

    #[test]
    fn test_initial_load_replaces_and_sorts() {
        let fetcher = FakeFetcher::new("c1", 120);
        let mut sync = MessageSync::new();
        sync.reset("c1");

        let outcome = tokio_test::block_on(sync.load_initial(&fetcher)).unwrap();
        assert_eq!(outcome, LoadOutcome::Applied { added: 50 });
        assert_eq!(sync.messages().len(), 50);
        assert!(sync.has_more());
        assert_invariants(&sync);
    }

    #[test]
    fn test_three_page_history_loads_without_duplicates() {
        // 150 messages over pages = 3; the scenario from the contract.
        let fetcher = FakeFetcher::new("c1", 150);
        let mut sync = MessageSync::new();
        sync.reset("c1");

        tokio_test::block_on(sync.load_initial(&fetcher)).unwrap();
        assert!(sync.has_more());

        tokio_test::block_on(sync.load_older(&fetcher)).unwrap();
        tokio_test::block_on(sync.load_older(&fetcher)).unwrap();
        assert_eq!(sync.messages().len(), 150);
        assert!(!sync.has_more());
        assert_invariants(&sync);

        // Pages exhausted: a further call is a no-op.
        let outcome = tokio_test::block_on(sync.load_older(&fetcher)).unwrap();
        assert_eq!(outcome, LoadOutcome::NoOp);
        assert_eq!(sync.messages().len(), 150);
    }

    #[test]
    fn test_overlapping_page_deduplicates_without_reordering() {
        let fetcher = FakeFetcher::new("c1", 100);
        let mut sync = MessageSync::new();
        sync.reset("c1");
        tokio_test::block_on(sync.load_initial(&fetcher)).unwrap();
        let before: Vec<String> = sync.messages().iter().map(|m| m.id.clone()).collect();

        // Serve page 2 with some ids that already exist on page 1.
        let ticket = sync.begin_older().unwrap();
        let mut messages = fetcher.page_messages(2);
        messages.push(msg("m60", "c1", 60)); // already loaded
        let outcome = sync.apply_page(
            &ticket,
            MessagePage {
                messages,
                pagination: None,
            },
        );

        assert_eq!(outcome, LoadOutcome::Applied { added: 50 });
        assert_invariants(&sync);
        let after: Vec<String> = sync.messages().iter().map(|m| m.id.clone()).collect();
        // Previously loaded suffix is untouched.
        assert_eq!(&after[after.len() - before.len()..], &before[..]);
    }

    #[test]
    fn test_older_load_in_flight_guard() {
        let mut sync = MessageSync::new();
        sync.reset("c1");
        let first = sync.begin_older();
        assert!(first.is_some());
        // Second call while the first is pending is a no-op.
        assert!(sync.begin_older().is_none());

        // Failure releases the guard.
        sync.fail_load(&first.unwrap());
        assert!(sync.begin_older().is_some());
    }

    #[test]
    fn test_stale_switch_discards_previous_load() {
        let mut sync = MessageSync::new();

        // switch_to(A), load in flight...
        sync.reset("conv-a");
        let ticket_a = sync.begin_initial().unwrap();

        // ...user immediately switches to B; B's load completes first.
        sync.reset("conv-b");
        let ticket_b = sync.begin_initial().unwrap();
        sync.apply_page(
            &ticket_b,
            MessagePage {
                messages: vec![msg("b1", "conv-b", 0)],
                pagination: None,
            },
        );

        // A's result arrives afterwards and must be discarded.
        let outcome = sync.apply_page(
            &ticket_a,
            MessagePage {
                messages: vec![msg("a1", "conv-a", 0), msg("a2", "conv-a", 1)],
                pagination: None,
            },
        );
        assert_eq!(outcome, LoadOutcome::Stale);
        assert_eq!(sync.conversation_id(), Some("conv-b"));
        assert_eq!(sync.messages().len(), 1);
        assert_eq!(sync.messages()[0].id, "b1");
    }

    #[test]
    fn test_has_more_fallback_without_metadata() {
        let mut sync = MessageSync::new();
        sync.reset("c1");

        // Full page, no metadata: assume more.
        let ticket = sync.begin_initial().unwrap();
        let full: Vec<Message> = (0..PAGE_SIZE as i64)
            .map(|i| msg(&format!("m{}", i), "c1", i))
            .collect();
        sync.apply_page(
            &ticket,
            MessagePage {
                messages: full,
                pagination: None,
            },
        );
        assert!(sync.has_more());

        // Short page: done.
        let ticket = sync.begin_older().unwrap();
        sync.apply_page(
            &ticket,
            MessagePage {
                messages: vec![msg("old", "c1", -1)],
                pagination: None,
            },
        );
        assert!(!sync.has_more());
        assert_invariants(&sync);
    }

    #[test]
    fn test_append_live_filters_foreign_and_duplicate() {
        let mut sync = MessageSync::new();
        sync.reset("c1");
        assert!(sync.append_live(msg("m1", "c1", 0)));

        // Stale event for a previously active conversation.
        assert!(!sync.append_live(msg("x1", "other", 1)));
        // Reconnection replay of an id already present.
        assert!(!sync.append_live(msg("m1", "c1", 0)));

        assert_eq!(sync.messages().len(), 1);
        assert_invariants(&sync);
    }

    #[test]
    fn test_append_live_keeps_order() {
        let mut sync = MessageSync::new();
        sync.reset("c1");
        for i in 0..5 {
            sync.append_live(msg(&format!("m{}", i), "c1", i));
        }
        assert_invariants(&sync);
    }

    #[test]
    fn test_send_validation_and_no_optimistic_insert() {
        let conn = ConnectionManager::new("http://localhost:3000/api");
        let mut sync = MessageSync::new();

        // No active conversation.
        assert!(sync.send(&conn, "hello").is_err());

        sync.reset("c1");
        // Whitespace-only content is rejected before any network activity.
        assert!(sync.send(&conn, "   ").is_err());

        // A valid send leaves the local list untouched; the message only
        // appears once the server echoes it back.
        sync.send(&conn, "hello").unwrap();
        assert!(sync.messages().is_empty());

        let echo = msg("m1", "c1", 0);
        assert!(sync.append_live(echo));
        assert_eq!(sync.messages().len(), 1);
    }

    #[test]
    fn test_reset_discards_previous_list() {
        let mut sync = MessageSync::new();
        sync.reset("c1");
        sync.append_live(msg("m1", "c1", 0));
        assert!(!sync.messages().is_empty());

        sync.reset("c2");
        assert!(sync.messages().is_empty());
        assert!(sync.has_more());
        assert!(!sync.is_loading());
    }
}
