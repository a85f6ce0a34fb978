//! WebSocket connection to the relay server.
//!
//! No reconnect: once the socket closes the handle stays closed and the
//! orchestrator sees a single [`SignalingEvent::Closed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::messages::{IncomingMessage, OutgoingMessage};
use super::{SignalingEvent, Signaler};
use crate::error::{HostError, Result};

enum Outbound {
    Message(OutgoingMessage),
    Close,
}

/// Live relay connection. Cheap to share behind an `Arc`.
pub struct SignalingHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Signaler for SignalingHandle {
    fn send(&self, message: OutgoingMessage) {
        if !self.open.load(Ordering::SeqCst) {
            debug!(kind = message.kind(), "Signaling closed, dropping message");
            return;
        }
        let _ = self.outbound.send(Outbound::Message(message));
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

impl Drop for SignalingHandle {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Open the relay socket and register as host for `session_id`.
pub async fn connect(
    url: &str,
    session_id: &str,
    connect_timeout: Duration,
) -> Result<(SignalingHandle, mpsc::UnboundedReceiver<SignalingEvent>)> {
    info!(url = %url.split('?').next().unwrap_or(""), session_id, "Connecting to relay");

    let (ws_stream, _) =
        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to relay");
                return Err(HostError::Signaling(e));
            }
            Err(_elapsed) => {
                error!("Relay connection timed out after {}s", connect_timeout.as_secs());
                return Err(HostError::ConnectTimeout(connect_timeout.as_secs()));
            }
        };

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let open = Arc::new(AtomicBool::new(true));

    let register = serde_json::to_string(&OutgoingMessage::register(session_id))?;
    ws_write.send(WsMessage::Text(register.into())).await?;
    let _ = event_tx.send(SignalingEvent::Opened);

    // Writer: serialize outgoing messages in send order.
    let writer_open = Arc::clone(&open);
    tokio::spawn(async move {
        while let Some(out) = outbound_rx.recv().await {
            match out {
                Outbound::Message(message) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode signaling message");
                            continue;
                        }
                    };
                    if let Err(e) = ws_write.send(WsMessage::Text(json.into())).await {
                        warn!(error = %e, kind = message.kind(), "Signaling send failed");
                        writer_open.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_write.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: decode incoming frames, skip anything unrecognized.
    let reader_open = Arc::clone(&open);
    let reader = tokio::spawn(async move {
        while let Some(msg_result) = ws_read.next().await {
            match msg_result {
                Ok(WsMessage::Text(text)) => match IncomingMessage::parse(&text) {
                    Some(message) => {
                        if event_tx.send(SignalingEvent::Message(message)).is_err() {
                            break;
                        }
                    }
                    None => debug!(text = %text.as_str(), "Unrecognized message from relay"),
                },
                Ok(WsMessage::Close(_)) => {
                    info!("Relay closed connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        reader_open.store(false, Ordering::SeqCst);
        let _ = event_tx.send(SignalingEvent::Closed);
    });

    Ok((
        SignalingHandle {
            outbound: outbound_tx,
            open,
            reader,
        },
        event_rx,
    ))
}
