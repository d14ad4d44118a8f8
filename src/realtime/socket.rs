//! WebSocket connection and event frame handling

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::events::EventFrame;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct ChatSocket {
    stream: WsStream,
}

impl ChatSocket {
    /// Connect to the realtime endpoint.
    ///
    /// Auth is carried by the token query parameter; no headers or auth
    /// messages are needed on the WebSocket itself.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self> {
        let ws_url = socket_url(base_url, token);
        tracing::info!("Connecting WebSocket to {}", redact_token(&ws_url));

        let (stream, response) = connect_async(&ws_url)
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a named event frame.
    pub async fn send_event(&mut self, event: &str, data: serde_json::Value) -> Result<()> {
        let frame = EventFrame {
            event: event.to_string(),
            data,
        };
        let text = serde_json::to_string(&frame).context("Failed to encode event frame")?;
        tracing::debug!("WS send: {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next event frame, answering pings and skipping frames
    /// that do not parse as events. Returns `None` when the server closes.
    pub async fn recv_event(&mut self) -> Result<Option<EventFrame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    match serde_json::from_str::<EventFrame>(&text) {
                        Ok(frame) => return Ok(Some(frame)),
                        Err(e) => {
                            tracing::warn!("Unparseable frame (skipped): {:#}", e);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Close the stream. Errors are ignored; the peer may already be gone.
    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Derive the WebSocket URL from the REST base URL.
///
/// `http://host:port/api` becomes `ws://host:port/socket?token=...`.
pub fn socket_url(base_url: &str, token: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let root = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    let root = root
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
    format!("{}/socket?token={}", root, encoded)
}

/// Strip the token value for logging.
fn redact_token(url: &str) -> String {
    match url.find("token=") {
        Some(pos) => format!("{}token=<redacted>", &url[..pos]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_from_rest_base() {
        assert_eq!(
            socket_url("http://localhost:3000/api", "abc"),
            "ws://localhost:3000/socket?token=abc"
        );
        assert_eq!(
            socket_url("https://chat.example.com/api/", "abc"),
            "wss://chat.example.com/socket?token=abc"
        );
    }

    #[test]
    fn test_socket_url_encodes_token() {
        let url = socket_url("http://localhost:3000/api", "a+b/c=");
        assert_eq!(url, "ws://localhost:3000/socket?token=a%2Bb%2Fc%3D");
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact_token("ws://h/socket?token=secret"),
            "ws://h/socket?token=<redacted>"
        );
    }
}
