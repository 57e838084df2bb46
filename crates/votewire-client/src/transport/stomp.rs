//! STOMP over WebSocket, a thin client over `tokio-tungstenite`.
//!
//! Only the frames the live update channel needs are implemented. One
//! handler task per session owns the socket: it writes queued outbound
//! frames and forwards inbound `MESSAGE` frames to the event channel.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;
use votewire_core::{TransportError, socket_candidates};

use super::frame::{Frame, StompCommand};
use super::{OpenedSession, Transport, TransportEvent, TransportSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending write waiting for the handler to flush it.
type WriteAck = oneshot::Sender<Result<(), TransportError>>;

/// Opens STOMP sessions over WebSocket.
#[derive(Clone, Debug, Default)]
pub struct StompTransport {
    _private: (),
}

impl StompTransport {
    /// Create a transport.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for StompTransport {
    async fn open(&self, endpoint: &Url) -> Result<OpenedSession, TransportError> {
        let host = endpoint.host_str().unwrap_or("localhost").to_owned();
        let mut last_error = TransportError::new("upgrade", "no socket candidates");

        for candidate in socket_candidates(endpoint) {
            match connect_async(candidate.as_str()).await {
                Ok((ws, _response)) => {
                    debug!(url = %candidate, "websocket upgraded");
                    return handshake(ws, &host).await;
                }
                Err(e) => {
                    debug!(url = %candidate, error = %e, "websocket upgrade failed");
                    last_error = TransportError::new("upgrade", format!("{candidate}: {e}"));
                }
            }
        }

        Err(last_error)
    }
}

/// Exchange CONNECT/CONNECTED, then hand the socket to the handler loop.
async fn handshake(mut ws: WsStream, host: &str) -> Result<OpenedSession, TransportError> {
    let connect = Frame::new(StompCommand::Connect)
        .header("accept-version", "1.2")
        .header("host", host)
        .header("heart-beat", "0,0");
    ws.send(to_ws_message(&connect))
        .await
        .map_err(|e| TransportError::new("handshake", e.to_string()))?;

    loop {
        let Some(msg) = ws.next().await else {
            return Err(TransportError::new("handshake", "socket closed before CONNECTED"));
        };
        let msg = msg.map_err(|e| TransportError::new("handshake", e.to_string()))?;
        let Some(bytes) = message_bytes(&msg) else {
            if matches!(msg, Message::Close(_)) {
                return Err(TransportError::new("handshake", "socket closed before CONNECTED"));
            }
            continue;
        };
        let frame = Frame::decode(bytes).map_err(|e| TransportError::new("handshake", e.to_string()))?;
        match frame {
            None => continue,
            Some(f) if f.command == StompCommand::Connected => {
                debug!(version = f.get_header("version").unwrap_or("?"), "STOMP session established");
                break;
            }
            Some(f) if f.command == StompCommand::Error => {
                return Err(TransportError::new("handshake", error_detail(&f)));
            }
            Some(f) => {
                return Err(TransportError::new(
                    "handshake",
                    format!("unexpected {} frame", f.command),
                ));
            }
        }
    }

    let (cmd_tx, cmd_rx) = mpsc::channel::<Outbound>(64);
    let (event_tx, events) = mpsc::unbounded_channel();
    let handler = tokio::spawn(session_loop(ws, cmd_rx, event_tx));

    Ok(OpenedSession {
        session: Box::new(StompSession {
            cmd_tx,
            next_receipt: AtomicU64::new(1),
            handler,
        }),
        events,
    })
}

/// Outbound request for the handler loop.
enum Outbound {
    Frame { frame: Frame, ack: WriteAck },
    Disconnect { receipt: String, ack: WriteAck },
}

/// One established STOMP session.
struct StompSession {
    cmd_tx: mpsc::Sender<Outbound>,
    next_receipt: AtomicU64,
    handler: JoinHandle<()>,
}

impl StompSession {
    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        let command = frame.command;
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(Outbound::Frame { frame, ack })
            .await
            .map_err(|_| TransportError::new(command.as_str(), "session closed"))?;
        rx.await
            .map_err(|_| TransportError::new(command.as_str(), "session closed"))?
    }
}

#[async_trait]
impl TransportSession for StompSession {
    async fn subscribe(&self, subscription_id: &str, topic: &str) -> Result<(), TransportError> {
        self.write(
            Frame::new(StompCommand::Subscribe)
                .header("id", subscription_id)
                .header("destination", topic)
                .header("ack", "auto"),
        )
        .await
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
        self.write(Frame::new(StompCommand::Unsubscribe).header("id", subscription_id))
            .await
    }

    async fn send(&self, destination: &str, body: Vec<u8>) -> Result<(), TransportError> {
        self.write(
            Frame::new(StompCommand::Send)
                .header("destination", destination)
                .header("content-type", "application/json")
                .body(body),
        )
        .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let receipt = format!("close-{}", self.next_receipt.fetch_add(1, Ordering::Relaxed));
        let (ack, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Outbound::Disconnect { receipt, ack })
            .await
            .is_err()
        {
            // Handler already gone: nothing left to close.
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Session handler loop.
///
/// Writes outbound frames, routes inbound MESSAGE frames to `event_tx`, and
/// reports the end of the session exactly once unless it was closed locally.
async fn session_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<Outbound>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut closing: Option<(String, WriteAck)> = None;

    let ended = loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if closing.is_none() => {
                let Some(cmd) = cmd else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return;
                };
                match cmd {
                    Outbound::Frame { frame, ack } => {
                        let result = ws_tx
                            .send(to_ws_message(&frame))
                            .await
                            .map_err(|e| TransportError::new(frame.command.as_str(), e.to_string()));
                        let failed = result.is_err();
                        let _ = ack.send(result);
                        if failed {
                            break TransportError::new("write", "socket write failed");
                        }
                    }
                    Outbound::Disconnect { receipt, ack } => {
                        let frame = Frame::new(StompCommand::Disconnect).header("receipt", receipt.as_str());
                        if let Err(e) = ws_tx.send(to_ws_message(&frame)).await {
                            let _ = ack.send(Err(TransportError::new("DISCONNECT", e.to_string())));
                            return;
                        }
                        closing = Some((receipt, ack));
                    }
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break TransportError::new("read", e.to_string()),
                    None => break TransportError::new("read", "socket closed"),
                };
                if let Message::Close(close) = &msg {
                    let reason = close
                        .as_ref()
                        .map_or_else(|| "socket closed".to_owned(), |c| format!("socket closed: {}", c.reason.as_str()));
                    break TransportError::new("read", reason);
                }
                let Some(bytes) = message_bytes(&msg) else { continue };
                let frame = match Frame::decode(bytes) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed STOMP frame");
                        continue;
                    }
                };
                match frame.command {
                    StompCommand::Message => {
                        let event = TransportEvent::Message {
                            subscription: frame.get_header("subscription").unwrap_or_default().to_owned(),
                            destination: frame.get_header("destination").unwrap_or_default().to_owned(),
                            body: frame.body,
                        };
                        if event_tx.send(event).is_err() {
                            debug!("event receiver dropped, ending session");
                            return;
                        }
                    }
                    StompCommand::Receipt => {
                        let id = frame.get_header("receipt-id");
                        if closing.as_ref().is_some_and(|(r, _)| Some(r.as_str()) == id) {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            if let Some((_, ack)) = closing.take() {
                                let _ = ack.send(Ok(()));
                            }
                            return;
                        }
                    }
                    StompCommand::Error => break TransportError::new("broker", error_detail(&frame)),
                    other => debug!(command = %other, "ignoring unexpected frame"),
                }
            }
        }
    };

    if let Some((_, ack)) = closing.take() {
        // Socket went away while waiting for the receipt: the close is complete.
        let _ = ack.send(Ok(()));
        return;
    }
    let _ = event_tx.send(TransportEvent::Closed(ended));
}

fn to_ws_message(frame: &Frame) -> Message {
    match String::from_utf8(frame.encode()) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

fn message_bytes(msg: &Message) -> Option<&[u8]> {
    match msg {
        Message::Text(text) => Some(text.as_str().as_bytes()),
        Message::Binary(bytes) => Some(&bytes[..]),
        _ => None,
    }
}

fn error_detail(frame: &Frame) -> String {
    let message = frame.get_header("message").unwrap_or("broker error");
    if frame.body.is_empty() {
        message.to_owned()
    } else {
        format!("{message}: {}", String::from_utf8_lossy(&frame.body))
    }
}
