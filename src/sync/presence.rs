//! Presence roster and typing indicator tracking

use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Networks can drop the peer's `typing_stop`; an indicator older than this
/// is treated as expired.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(10);

/// Set of peer user ids currently online.
///
/// Converges from two sources: a wholesale snapshot fetched on every
/// (re)connection, and incremental online/offline events in between.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    online: HashSet<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire roster with a freshly fetched snapshot.
    pub fn snapshot(&mut self, user_ids: impl IntoIterator<Item = String>) {
        self.online = user_ids.into_iter().collect();
        tracing::debug!("Presence snapshot: {} online", self.online.len());
    }

    /// Idempotent add.
    pub fn mark_online(&mut self, user_id: &str) {
        self.online.insert(user_id.to_string());
    }

    /// Removes regardless of prior state.
    pub fn mark_offline(&mut self, user_id: &str) {
        self.online.remove(user_id);
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Empty the roster (connection torn down; events no longer arrive).
    pub fn clear(&mut self) {
        self.online.clear();
    }
}

/// Transient typing state for the active conversation.
#[derive(Debug, Default)]
pub struct TypingIndicator {
    /// (conversation id, author id, last typing_start time).
    state: Option<(String, String, Instant)>,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `typing_start`. Events for other conversations and echoes
    /// of the local user's own typing never surface.
    pub fn set_typing(
        &mut self,
        conversation_id: &str,
        author_id: &str,
        active_conversation: Option<&str>,
        own_user_id: &str,
    ) {
        if author_id == own_user_id {
            return;
        }
        if active_conversation != Some(conversation_id) {
            tracing::debug!(
                "Ignoring typing_start for inactive conversation {}",
                conversation_id
            );
            return;
        }
        self.state = Some((
            conversation_id.to_string(),
            author_id.to_string(),
            Instant::now(),
        ));
    }

    /// Record a `typing_stop`. Only clears state for the matching
    /// conversation and author.
    pub fn clear_typing(&mut self, conversation_id: &str, author_id: &str) {
        if let Some((conv, author, _)) = &self.state {
            if conv == conversation_id && author == author_id {
                self.state = None;
            }
        }
    }

    /// Drop any indicator, whatever it refers to. Called on conversation
    /// switch so a stale indicator never outlives its conversation.
    pub fn clear(&mut self) {
        self.state = None;
    }

    /// Whether a typing indicator should be visible for the active
    /// conversation as of `now`.
    pub fn is_typing_at(&self, active_conversation: Option<&str>, now: Instant) -> bool {
        match &self.state {
            Some((conv, _, since)) => {
                active_conversation == Some(conv.as_str())
                    && now.duration_since(*since) < TYPING_EXPIRY
            }
            None => false,
        }
    }

    /// Convenience wrapper over [`is_typing_at`] using the current time.
    pub fn is_typing(&self, active_conversation: Option<&str>) -> bool {
        self.is_typing_at(active_conversation, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_then_incremental_events() {
        let mut tracker = PresenceTracker::new();
        tracker.snapshot(vec!["u1".to_string(), "u2".to_string()]);
        assert!(tracker.is_online("u1"));
        assert!(tracker.is_online("u2"));

        tracker.mark_offline("u1");
        assert!(!tracker.is_online("u1"));
        assert_eq!(tracker.online_count(), 1);

        // Duplicate online event leaves the roster unchanged.
        tracker.mark_online("u2");
        assert_eq!(tracker.online_count(), 1);
    }

    #[test]
    fn test_offline_for_unknown_user_is_noop() {
        let mut tracker = PresenceTracker::new();
        tracker.mark_offline("ghost");
        assert_eq!(tracker.online_count(), 0);
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut tracker = PresenceTracker::new();
        tracker.snapshot(vec!["u1".to_string()]);
        tracker.snapshot(vec!["u2".to_string()]);
        assert!(!tracker.is_online("u1"));
        assert!(tracker.is_online("u2"));
    }

    #[test]
    fn test_typing_filters_foreign_conversation() {
        let mut typing = TypingIndicator::new();
        typing.set_typing("other-conv", "peer", Some("active-conv"), "me");
        assert!(!typing.is_typing(Some("active-conv")));
    }

    #[test]
    fn test_typing_filters_own_echo() {
        let mut typing = TypingIndicator::new();
        typing.set_typing("c1", "me", Some("c1"), "me");
        assert!(!typing.is_typing(Some("c1")));
    }

    #[test]
    fn test_typing_start_stop() {
        let mut typing = TypingIndicator::new();
        typing.set_typing("c1", "peer", Some("c1"), "me");
        assert!(typing.is_typing(Some("c1")));

        // Stop for a different author does not clear.
        typing.clear_typing("c1", "someone-else");
        assert!(typing.is_typing(Some("c1")));

        typing.clear_typing("c1", "peer");
        assert!(!typing.is_typing(Some("c1")));
    }

    #[test]
    fn test_typing_cleared_on_switch() {
        let mut typing = TypingIndicator::new();
        typing.set_typing("c1", "peer", Some("c1"), "me");
        typing.clear();
        assert!(!typing.is_typing(Some("c1")));
    }

    #[test]
    fn test_typing_expires_without_stop() {
        let mut typing = TypingIndicator::new();
        typing.set_typing("c1", "peer", Some("c1"), "me");

        let now = Instant::now();
        assert!(typing.is_typing_at(Some("c1"), now));
        assert!(!typing.is_typing_at(Some("c1"), now + TYPING_EXPIRY));
    }
}
