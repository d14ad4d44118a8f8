//! Realtime connection manager
//!
//! Owns the single WebSocket connection shared by every consumer. Connects
//! with a bearer token, reconnects with bounded backoff when the link drops,
//! and dispatches inbound named events through a handler registry holding at
//! most one handler per event name (re-subscribing replaces, never stacks,
//! so a restarted consumer cannot cause duplicate delivery).

pub mod events;
pub mod socket;

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time;

use crate::api::ApiClient;
use socket::ChatSocket;

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Reconnect attempts before giving up. After exhaustion the status is
/// `Failed` until a fresh `connect` call restarts the machine.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retries exhausted; requires a fresh `connect`.
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Failed => "offline",
        }
    }
}

type Handler = Box<dyn FnMut(serde_json::Value) + Send>;

enum Command {
    Emit { event: String, data: serde_json::Value },
    Disconnect,
}

/// Why a connected session ended.
enum SessionEnd {
    /// `disconnect()` was called or the handle was dropped.
    Requested,
    /// Server closed or the link errored; reconnect.
    Lost,
}

struct Inner {
    base_url: String,
    status_tx: watch::Sender<ConnectionStatus>,
    handlers: Mutex<HashMap<String, Handler>>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    /// Invoke the registered handler for a named event, if any.
    fn dispatch(&self, event: &str, data: serde_json::Value) {
        let mut handlers = self.handlers.lock().unwrap();
        match handlers.get_mut(event) {
            Some(handler) => handler(data),
            None => tracing::debug!("No handler for event '{}'", event),
        }
    }
}

/// Handle to the shared realtime connection. Cheap to clone; all clones
/// observe the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(base_url: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.into(),
                status_tx,
                handlers: Mutex::new(HashMap::new()),
                command_tx: Mutex::new(None),
            }),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Watch status transitions (reconnecting indicator, etc.).
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Establish the connection in the background.
    ///
    /// Never returns an error to the caller: auth rejection and network
    /// failures surface as `Disconnected`/`Failed` through the status
    /// channel after the bounded retry schedule runs out. Calling while a
    /// previous connection exists restarts the machine.
    pub fn connect(&self, token: impl Into<String>) {
        let token = token.into();

        // Replace any previous run loop; its command channel closing makes
        // it wind down as a requested disconnect.
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.command_tx.lock().unwrap() = Some(tx);
        self.inner.set_status(ConnectionStatus::Connecting);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_loop(inner, token, rx));
    }

    /// Tear down the connection, clear all registered handlers. Idempotent.
    ///
    /// Consumers get one final `disconnected` dispatch so they invalidate
    /// connection-derived state (the presence roster) on a requested
    /// teardown the same way as on a lost link.
    pub fn disconnect(&self) {
        let tx = self.inner.command_tx.lock().unwrap().take();
        if let Some(tx) = tx {
            let _ = tx.send(Command::Disconnect);
            self.inner
                .dispatch(events::DISCONNECTED, serde_json::Value::Null);
        }
        self.inner.handlers.lock().unwrap().clear();
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Fire-and-forget send. No-op (logged) when not connected.
    pub fn emit(&self, event: &str, data: serde_json::Value) {
        if !self.is_connected() {
            tracing::debug!("emit '{}' skipped: not connected", event);
            return;
        }
        if let Some(tx) = self.inner.command_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Command::Emit {
                event: event.to_string(),
                data,
            });
        }
    }

    /// Request to join a conversation's channel. No-op, logged, when not
    /// connected; the caller retries once connected.
    pub fn join_channel(&self, conversation_id: &str) {
        if !self.is_connected() {
            tracing::info!(
                "join_room for {} skipped: not connected",
                conversation_id
            );
            return;
        }
        self.emit(events::JOIN_ROOM, events::join_room(conversation_id));
    }

    /// Register a handler for a named event, replacing any previous one.
    pub fn subscribe(&self, event: &str, handler: impl FnMut(serde_json::Value) + Send + 'static) {
        let previous = self
            .inner
            .handlers
            .lock()
            .unwrap()
            .insert(event.to_string(), Box::new(handler));
        if previous.is_some() {
            tracing::debug!("Handler for '{}' replaced", event);
        }
    }

    /// Remove the handler for a named event. Idempotent.
    pub fn unsubscribe(&self, event: &str) {
        self.inner.handlers.lock().unwrap().remove(event);
    }
}

/// Delay before reconnect attempt `attempt` (1-based): 1, 2, 4, 8, 16 s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt.saturating_sub(1)).min(4))
}

/// Connection run loop: dial with timeout, pump one session, reconnect with
/// backoff on loss, stop on request or after the retry budget.
async fn run_loop(inner: Arc<Inner>, token: String, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut attempt: u32 = 0;

    loop {
        let dial = time::timeout(CONNECT_TIMEOUT, ChatSocket::connect(&inner.base_url, &token));
        match dial.await {
            Ok(Ok(mut ws)) => {
                attempt = 0;
                inner.set_status(ConnectionStatus::Connected);
                // Consumers re-snapshot presence on this; incremental
                // events cannot reconstruct the roster after a gap.
                inner.dispatch(events::CONNECTED, serde_json::Value::Null);

                match run_session(&inner, &mut ws, &mut rx).await {
                    SessionEnd::Requested => {
                        ws.close().await;
                        // disconnect() already published the final status.
                        return;
                    }
                    SessionEnd::Lost => {
                        inner.dispatch(events::DISCONNECTED, serde_json::Value::Null);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Connection attempt failed: {:#}", e);
            }
            Err(_) => {
                tracing::warn!("Connection attempt timed out after {:?}", CONNECT_TIMEOUT);
            }
        }

        attempt += 1;
        if attempt > MAX_RECONNECT_ATTEMPTS {
            tracing::warn!(
                "Giving up after {} reconnect attempts",
                MAX_RECONNECT_ATTEMPTS
            );
            inner.set_status(ConnectionStatus::Failed);
            return;
        }

        let delay = backoff_delay(attempt);
        tracing::info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        inner.set_status(ConnectionStatus::Reconnecting);

        tokio::select! {
            _ = time::sleep(delay) => {}
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Disconnect) | None => return,
                    Some(Command::Emit { event, .. }) => {
                        tracing::debug!("emit '{}' dropped while reconnecting", event);
                    }
                }
            }
        }
    }
}

/// Pump one connected session until it ends.
async fn run_session(
    inner: &Inner,
    ws: &mut ChatSocket,
    rx: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    loop {
        tokio::select! {
            frame = ws.recv_event() => {
                match frame {
                    Ok(Some(frame)) => inner.dispatch(&frame.event, frame.data),
                    Ok(None) => {
                        tracing::warn!("WebSocket closed by server");
                        return SessionEnd::Lost;
                    }
                    Err(e) => {
                        tracing::warn!("WebSocket receive failed: {:#}", e);
                        return SessionEnd::Lost;
                    }
                }
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Emit { event, data }) => {
                        if let Err(e) = ws.send_event(&event, data).await {
                            tracing::warn!("Send failed: {:#}", e);
                            return SessionEnd::Lost;
                        }
                    }
                    Some(Command::Disconnect) | None => return SessionEnd::Requested,
                }
            }
        }
    }
}

/// `listen` subcommand: connect and print inbound events until Ctrl-C.
pub async fn listen() -> Result<()> {
    use crate::api::ApiError;

    let client = ApiClient::new()?;
    let token = client.access_token().ok_or(ApiError::NotLoggedIn)?;

    let conn = ConnectionManager::new(client.base_url().to_string());
    for name in [
        events::MESSAGE_RECEIVED,
        events::USER_ONLINE,
        events::USER_OFFLINE,
        events::USER_TYPING,
        events::USER_STOPPED_TYPING,
        events::JOINED_ROOM,
    ] {
        conn.subscribe(name, move |data| {
            println!("[{}] {}", name, data);
        });
    }
    conn.subscribe(events::CONNECTED, |_| {
        println!("Connected. Listening for events... (Ctrl-C to stop)");
    });
    conn.subscribe(events::DISCONNECTED, |_| {
        println!("Disconnected.");
    });

    conn.connect(token);

    let mut status = conn.watch_status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                conn.disconnect();
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if *status.borrow() == ConnectionStatus::Failed {
                    anyhow::bail!("Connection failed after retries. Check the server and try again.");
                }
            }
        }
    }
}

/// `send` subcommand: connect, deliver one message, wait for the server
/// echo, disconnect. The message only counts as sent once it is echoed
/// back as a `message_received` event.
pub async fn send_once(conversation_id: &str, content: &str) -> Result<()> {
    use crate::api::ApiError;

    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("Message is empty".into()).into());
    }

    let client = ApiClient::new()?;
    let token = client.access_token().ok_or(ApiError::NotLoggedIn)?;

    let conn = ConnectionManager::new(client.base_url().to_string());

    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel();
    let want_conversation = conversation_id.to_string();
    conn.subscribe(events::MESSAGE_RECEIVED, move |data| {
        if let Some(events::ServerEvent::Message(ev)) =
            events::ServerEvent::parse(events::MESSAGE_RECEIVED, data)
        {
            if ev.message.conversation_id == want_conversation {
                let _ = echo_tx.send(ev.message);
            }
        }
    });

    conn.connect(token);

    // Wait for the connection before joining and emitting.
    let mut status = conn.watch_status();
    let connected = time::timeout(CONNECT_TIMEOUT, async {
        loop {
            match *status.borrow() {
                ConnectionStatus::Connected => return true,
                ConnectionStatus::Failed => return false,
                _ => {}
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap_or(false);
    if !connected {
        conn.disconnect();
        anyhow::bail!("Could not connect to the realtime server");
    }

    conn.join_channel(conversation_id);
    conn.emit(
        events::SEND_MESSAGE,
        events::send_message(conversation_id, content),
    );

    // No optimistic accounting: wait for the server to echo the message.
    let echoed = time::timeout(Duration::from_secs(5), echo_rx.recv()).await;
    conn.disconnect();

    match echoed {
        Ok(Some(msg)) => {
            println!("Message sent (id: {}).", msg.id);
            Ok(())
        }
        _ => anyhow::bail!("No delivery confirmation from server"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let secs: Vec<u64> = (1..=MAX_RECONNECT_ATTEMPTS)
            .map(|a| backoff_delay(a).as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
        // Ceiling beyond the budget.
        assert_eq!(backoff_delay(10).as_secs(), 16);
    }

    #[test]
    fn test_subscribe_replaces_handler() {
        let conn = ConnectionManager::new("http://localhost:3000/api");
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c1 = Arc::clone(&calls);
        conn.subscribe("user_online", move |_| c1.lock().unwrap().push("first"));
        let c2 = Arc::clone(&calls);
        conn.subscribe("user_online", move |_| c2.lock().unwrap().push("second"));

        conn.inner.dispatch("user_online", serde_json::Value::Null);

        // One delivery through the latest handler, never both.
        assert_eq!(*calls.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let conn = ConnectionManager::new("http://localhost:3000/api");
        conn.subscribe("user_online", |_| {});
        conn.unsubscribe("user_online");
        conn.unsubscribe("user_online");
        // Dispatch after removal is a no-op.
        conn.inner.dispatch("user_online", serde_json::Value::Null);
    }

    #[test]
    fn test_disconnect_clears_handlers_and_is_idempotent() {
        let conn = ConnectionManager::new("http://localhost:3000/api");
        conn.subscribe("user_online", |_| panic!("should have been cleared"));

        conn.disconnect();
        conn.disconnect();

        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        conn.inner.dispatch("user_online", serde_json::Value::Null);
    }

    #[test]
    fn test_requested_disconnect_signals_consumers_once() {
        tokio_test::block_on(async {
            let conn = ConnectionManager::new("http://localhost:3000/api");
            let signals = Arc::new(Mutex::new(0));

            let s = Arc::clone(&signals);
            conn.subscribe(events::DISCONNECTED, move |_| *s.lock().unwrap() += 1);

            conn.connect("token");
            conn.disconnect();
            assert_eq!(*signals.lock().unwrap(), 1);
            assert_eq!(conn.status(), ConnectionStatus::Disconnected);

            // A second disconnect has no live connection and no handlers.
            conn.disconnect();
            assert_eq!(*signals.lock().unwrap(), 1);
        });
    }

    #[test]
    fn test_emit_when_disconnected_is_noop() {
        let conn = ConnectionManager::new("http://localhost:3000/api");
        conn.emit("send_message", serde_json::json!({}));
        conn.join_channel("c1");
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
    }
}
