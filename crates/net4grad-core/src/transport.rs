//! WebSocket transport.
//!
//! A [`Connector`] opens the socket for a session and returns a
//! [`Connection`] handle plus a stream of [`TransportEvent`]s. Frames are
//! decoded into [`InboundEvent`]s here, once; malformed frames are logged and
//! dropped. The handle is the only way to write to the socket.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::logging::{Direction, FrameLog};
use crate::models::UserId;
use crate::protocol::{InboundEvent, OutboundFrame};
use crate::session::Session;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Inbound(InboundEvent),
    /// The socket is gone. Always the last event on the stream.
    Closed { reason: Option<String> },
}

/// Instructions from a [`Connection`] to the socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Frame(OutboundFrame),
    Close,
}

/// What a successful connect yields.
pub type Opened = (Connection, mpsc::UnboundedReceiver<TransportEvent>);

/// Write handle for one open socket.
///
/// Dropping the handle closes the socket.
#[derive(Debug)]
pub struct Connection {
    viewer_id: UserId,
    id: String,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Connection {
    /// Create a handle and the receiving end its socket task drains.
    pub fn channel(viewer_id: UserId) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            viewer_id,
            id: uuid::Uuid::new_v4().to_string(),
            outgoing: tx,
        };
        (connection, rx)
    }

    pub fn viewer_id(&self) -> &UserId {
        &self.viewer_id
    }

    /// Unique id of this connection, used to name its frame log.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        !self.outgoing.is_closed()
    }

    /// Queue a frame for the socket.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), ChatError> {
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| ChatError::SocketUnavailable)
    }

    /// Close the socket. Same as dropping the handle.
    pub fn close(self) {}
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

/// Opens sockets for a session.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, Result<Opened, ChatError>>;
}

/// [`Connector`] over `tokio-tungstenite`.
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn open(&self, session: &Session) -> Result<Opened, ChatError> {
        let url = self.config.ws_url(&session.user_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::Connect(e.to_string()))?;

        if let Some(cookie) = session.cookie_header() {
            let value =
                HeaderValue::from_str(&cookie).map_err(|e| ChatError::Connect(e.to_string()))?;
            request.headers_mut().insert(COOKIE, value);
        }

        log::info!("Connecting to {}", url);
        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| ChatError::Connect(e.to_string()))?;

        let (connection, outgoing) = Connection::channel(session.user_id.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let frames = FrameLog::open(self.config.log_dir.as_deref(), connection.id());
        frames.record(Direction::Event, &format!("connected {}", url));

        tokio::spawn(socket_loop(ws, outgoing, events_tx, frames));
        Ok((connection, events_rx))
    }
}

impl Connector for WsConnector {
    fn connect<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, Result<Opened, ChatError>> {
        Box::pin(self.open(session))
    }
}

async fn socket_loop(
    ws: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: FrameLog,
) {
    let (mut sink, mut stream) = ws.split();
    let mut reason = None;

    loop {
        tokio::select! {
            out = outgoing.recv() => {
                let Some(Outgoing::Frame(frame)) = out else {
                    // Close requested or handle dropped.
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = sink.close().await;
                    reason = Some("closed by client".to_string());
                    break;
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("Failed to encode outbound frame: {}", e);
                        continue;
                    }
                };
                frames.record(Direction::Out, &text);
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    reason = Some(e.to_string());
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        frames.record(Direction::In, &text);
                        match InboundEvent::decode(&text) {
                            Ok(event) => {
                                if events.send(TransportEvent::Inbound(event)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Ignoring frame: {}", e),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        reason = frame.map(|f| f.reason.as_str().to_string());
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        reason = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    frames.record(
        Direction::Event,
        &format!("closed: {}", reason.as_deref().unwrap_or("remote")),
    );
    let _ = events.send(TransportEvent::Closed { reason });
}

// ============================================================================
// TESTS
// ============================================================================
