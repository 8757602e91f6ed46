//! Push channel: a WebSocket client that fans server events out to listeners.

use crate::error::{ChatError, Result};
use crate::protocol::{ClientFrame, PushEvent};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Buffered events per listener before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Upper bound on the reconnect delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A source of push events.
///
/// Each call to [`subscribe`](PushSource::subscribe) opens an independent
/// receiver. Delivery is best-effort: receivers that fall behind observe
/// [`broadcast::error::RecvError::Lagged`].
pub trait PushSource: Send + Sync {
    /// Open a receiver for events published from now on.
    fn subscribe(&self) -> broadcast::Receiver<PushEvent>;
}

/// Connection status for display in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected to server.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection failed, will retry.
    Reconnecting { attempt: u32 },
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting..."),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting ({})", attempt),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket channel
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket push channel with automatic reconnect.
///
/// The connection runs on a background task until the channel is closed or
/// dropped. Events parsed from text frames are broadcast to every
/// subscriber; malformed frames are logged and dropped.
pub struct PushChannel {
    /// WebSocket URL.
    ws_url: String,
    /// Fan-out of parsed events.
    events: broadcast::Sender<PushEvent>,
    /// Latest connection status.
    status: watch::Receiver<ConnectionStatus>,
    /// Task handle for the connection loop.
    task: tokio::task::JoinHandle<()>,
}

impl PushChannel {
    /// Connect to the push endpoint of an HTTP server URL.
    ///
    /// `http://host:port` maps to `ws://host:port/ws`.
    pub fn connect(server_url: &str, token: Option<String>) -> Result<Self> {
        let ws_url = http_to_ws_url(server_url)?;
        Ok(Self::spawn(ws_url, token))
    }

    /// Connect to an explicit WebSocket URL, used as given.
    pub fn connect_to(ws_url: &str, token: Option<String>) -> Result<Self> {
        let url = Url::parse(ws_url).map_err(|e| ChatError::InvalidPushUrl(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self::spawn(url.to_string(), token)),
            other => Err(ChatError::InvalidPushUrl(format!(
                "unsupported scheme: {}",
                other
            ))),
        }
    }

    fn spawn(ws_url: String, token: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let task = tokio::spawn(connection_loop(
            ws_url.clone(),
            token,
            events.clone(),
            status_tx,
        ));

        Self {
            ws_url,
            events,
            status,
            task,
        }
    }

    /// The WebSocket URL being connected to.
    pub fn url(&self) -> &str {
        &self.ws_url
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch connection status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Stop the connection loop.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl PushSource for PushChannel {
    fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.events.subscribe()
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Connection loop that handles reconnection with exponential backoff.
async fn connection_loop(
    ws_url: String,
    token: Option<String>,
    events: broadcast::Sender<PushEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
) {
    let mut attempt = 0u32;

    loop {
        status_tx.send_replace(if attempt == 0 {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Reconnecting { attempt }
        });

        tracing::info!(url = %ws_url, attempt, "Connecting to push channel");
        match connect_async(&ws_url).await {
            Ok((ws_stream, _)) => {
                attempt = 0;
                status_tx.send_replace(ConnectionStatus::Connected);
                tracing::info!(url = %ws_url, "Push channel connected");

                handle_connection(ws_stream, token.as_deref(), &events).await;
                tracing::warn!("Push channel lost, will reconnect");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push channel connection failed");
            }
        }

        attempt += 1;
        let backoff = std::cmp::min(
            Duration::from_millis(100 * 2u64.pow(attempt.min(10))),
            MAX_BACKOFF,
        );
        tracing::debug!(?backoff, "Reconnecting push channel");
        tokio::time::sleep(backoff).await;
    }
}

/// Pump one connection until it closes or errors.
async fn handle_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    token: Option<&str>,
    events: &broadcast::Sender<PushEvent>,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    if let Some(token) = token {
        let frame = ClientFrame::Auth {
            token: token.to_string(),
        };
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    tracing::error!(error = %e, "Failed to authenticate push channel");
                    return;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize auth frame"),
        }
    }

    while let Some(msg) = ws_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<PushEvent>(&text) {
                Ok(event) => {
                    tracing::debug!(event = event.name(), conversation = ?event.conversation_id(), "Push event");
                    // No subscribers is fine; events are hints, not data.
                    let _ = events.send(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, frame = %text.as_str(), "Dropping malformed push frame");
                }
            },
            Ok(Message::Ping(data)) => {
                let _ = ws_sink.send(Message::Pong(data)).await;
            }
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!("Server closed push channel");
                return;
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Unexpected binary push frame");
            }
            Err(e) => {
                tracing::error!(error = %e, "Push channel error");
                return;
            }
        }
    }
}

/// Convert a server URL to its WebSocket URL, appending `/ws` to any base path.
fn http_to_ws_url(http_url: &str) -> Result<String> {
    let mut url = Url::parse(http_url).map_err(|e| ChatError::InvalidPushUrl(e.to_string()))?;

    let new_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChatError::InvalidPushUrl(format!(
                "unsupported scheme: {}",
                other
            )));
        }
    };

    url.set_scheme(new_scheme)
        .map_err(|_| ChatError::InvalidPushUrl("failed to set scheme".to_string()))?;
    // The socket lives under the same base path as the REST API.
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Local source
// ─────────────────────────────────────────────────────────────────────────────

/// In-process push source.
///
/// Useful for embedding the chat core next to a server that already has the
/// events in hand, and for driving sessions in tests.
#[derive(Debug, Clone)]
pub struct LocalPushSource {
    events: broadcast::Sender<PushEvent>,
}

impl LocalPushSource {
    /// Create a source with the default buffer size.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { events }
    }

    /// Publish an event. Returns how many listeners received it.
    pub fn publish(&self, event: PushEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for LocalPushSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PushSource for LocalPushSource {
    fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    #[test]
    fn test_http_to_ws_url() {
        assert_eq!(
            http_to_ws_url("http://localhost:5000").unwrap(),
            "ws://localhost:5000/ws"
        );
        assert_eq!(
            http_to_ws_url("https://souk.example").unwrap(),
            "wss://souk.example/ws"
        );
        assert_eq!(
            http_to_ws_url("http://localhost:5000/").unwrap(),
            "ws://localhost:5000/ws"
        );
        assert_eq!(
            http_to_ws_url("https://shop.example.com/backend").unwrap(),
            "wss://shop.example.com/backend/ws"
        );
        assert_eq!(
            http_to_ws_url("https://shop.example.com/backend/").unwrap(),
            "wss://shop.example.com/backend/ws"
        );
        assert!(matches!(
            http_to_ws_url("ftp://localhost"),
            Err(ChatError::InvalidPushUrl(_))
        ));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionStatus::Reconnecting { attempt: 3 }.to_string(),
            "reconnecting (3)"
        );
    }

    #[tokio::test]
    async fn test_connect_to_rejects_http_scheme() {
        assert!(PushChannel::connect_to("http://localhost:5000/ws", None).is_err());
    }

    #[tokio::test]
    async fn test_local_source_fan_out() {
        let source = LocalPushSource::new();
        assert_eq!(source.publish(PushEvent::ConversationUpdated { conversation_id: None }), 0);

        let mut a = source.subscribe();
        let mut b = source.subscribe();
        assert_eq!(source.listener_count(), 2);

        let event = PushEvent::MessageRead {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(source.publish(event.clone()), 2);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_channel_authenticates_and_skips_malformed_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (auth_tx, auth_rx) = oneshot::channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let auth = ws.next().await.unwrap().unwrap();
            let _ = auth_tx.send(auth.to_text().unwrap().to_string());

            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"event":"message:read","conversationId":"c1"}"#.into(),
            ))
            .await
            .unwrap();

            // Hold the connection open until the client goes away
            let _ = ws.next().await;
        });

        let channel =
            PushChannel::connect(&format!("http://{}", addr), Some("jwt".to_string())).unwrap();
        let mut events = channel.subscribe();

        let auth = tokio::time::timeout(Duration::from_secs(5), auth_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth, r#"{"event":"auth","token":"jwt"}"#);

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            PushEvent::MessageRead {
                conversation_id: "c1".to_string()
            }
        );
        assert_eq!(channel.status(), ConnectionStatus::Connected);
        channel.close();
    }

    #[tokio::test]
    async fn test_channel_forwards_new_message_with_foreign_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            ws.send(Message::Text(
                r#"{"event":"message:new","conversationId":"c1","message":{"_id":"m1","sender":"u2","content":"hi"}}"#
                    .into(),
            ))
            .await
            .unwrap();

            let _ = ws.next().await;
        });

        let channel = PushChannel::connect_to(&format!("ws://{}/ws", addr), None).unwrap();
        let mut events = channel.subscribe();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            PushEvent::NewMessage {
                conversation_id: "c1".to_string(),
                message: None
            }
        );
        channel.close();
    }
}
