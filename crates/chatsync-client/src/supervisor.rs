//! Live connection supervisor.
//!
//! Drives [`ConnectionTracker`] against a real WebSocket: fetch a fresh
//! ticket, connect, pump frames until the connection drops, wait a constant
//! delay, repeat. Runs until its cancellation token fires. Ticket fetches,
//! handshakes and retry sleeps are all raced against cancellation, so a
//! stopped supervisor abandons whatever it was waiting on.

use std::sync::Arc;
use std::time::Duration;

use chatsync_core::frame::OutboundFrame;
use chatsync_core::reconnect::{Attempt, ConnectionTracker, ReconnectPolicy};
use chatsync_core::types::{ConnectionState, ConversationId, Ticket};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backend::ChatBackend;
use crate::error::BackendError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// After this many consecutive failures, retries log at debug instead of warn.
const DEBUG_LOG_THRESHOLD: u32 = 10;

/// Reported by the supervisor to the task that owns the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    StateChanged {
        state: ConnectionState,
        attempt: Attempt,
        /// Why the previous connection ended, on `ClosedPendingRetry`.
        reason: Option<String>,
    },
    /// Raw text frame received while open.
    Frame { attempt: Attempt, text: String },
}

/// Why one connection attempt ended.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("ticket fetch failed: {0}")]
    Ticket(#[source] BackendError),
    #[error("handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("transport error: {0}")]
    Transport(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("closed by server{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
    #[error("stream ended")]
    StreamEnded,
}

/// Build the live connection address for one attempt.
///
/// Consumes the ticket: each address is good for exactly one handshake.
pub fn connection_url(ws_base: &Url, ticket: Ticket, conversation: &ConversationId) -> Url {
    let mut url = ws_base.clone();
    url.query_pairs_mut()
        .append_pair("ticket", &ticket.into_inner())
        .append_pair("matchId", conversation.as_str());
    url
}

pub struct Supervisor<B> {
    conversation: ConversationId,
    backend: Arc<B>,
    ws_base: Url,
    tracker: ConnectionTracker,
    events: mpsc::Sender<LinkEvent>,
    outbound: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
}

impl<B: ChatBackend> Supervisor<B> {
    pub fn new(
        conversation: ConversationId,
        backend: Arc<B>,
        ws_base: Url,
        policy: ReconnectPolicy,
        events: mpsc::Sender<LinkEvent>,
        outbound: mpsc::Receiver<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conversation,
            backend,
            ws_base,
            tracker: ConnectionTracker::new(policy),
            events,
            outbound,
            cancel,
        }
    }

    /// Run the connection lifecycle until cancelled.
    pub async fn run(mut self) {
        let Some(mut attempt) = self.tracker.start() else {
            return;
        };
        self.emit_state(attempt, None).await;

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };

            let ended = match connected {
                Ok(ws) => {
                    self.discard_stale_outbound();
                    if self.tracker.on_open(attempt) {
                        tracing::info!(conversation = %self.conversation, attempt, "live connection open");
                        self.emit_state(attempt, None).await;
                    }
                    self.pump(ws, attempt).await
                }
                Err(e) => Err(e),
            };

            if self.cancel.is_cancelled() {
                break;
            }
            let reason = match ended {
                Ok(()) => break,
                Err(e) => e.to_string(),
            };

            let Some(decision) = self.tracker.on_failure(attempt) else {
                break;
            };
            let failures = self.tracker.consecutive_failures();
            if failures >= DEBUG_LOG_THRESHOLD {
                tracing::debug!(conversation = %self.conversation, attempt, failures, "live connection lost: {reason}");
            } else {
                tracing::warn!(conversation = %self.conversation, attempt, failures, "live connection lost: {reason}");
            }
            self.emit_state(attempt, Some(reason)).await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(decision.after_ms)) => {}
            }

            match self.tracker.retry_due(decision.attempt) {
                Some(next) => {
                    attempt = next;
                    tracing::info!(
                        conversation = %self.conversation,
                        attempt,
                        delay_ms = decision.after_ms,
                        "reconnecting"
                    );
                    self.emit_state(attempt, None).await;
                }
                None => break,
            }
        }

        self.tracker.stop();
        tracing::debug!(conversation = %self.conversation, "supervisor stopped");
    }

    /// One attempt: fresh ticket, then handshake.
    async fn connect(&self) -> Result<WsStream, LinkError> {
        let ticket = self.backend.fetch_ticket().await.map_err(LinkError::Ticket)?;
        let url = connection_url(&self.ws_base, ticket, &self.conversation);
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(LinkError::Handshake)?;
        Ok(ws)
    }

    /// Move frames both ways until the connection ends.
    ///
    /// Returns `Ok(())` only when cancelled.
    async fn pump(&mut self, ws: WsStream, attempt: Attempt) -> Result<(), LinkError> {
        let (mut tx, mut rx) = ws.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = tx.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        // Owner is gone; nothing left to supervise for.
                        self.cancel.cancel();
                        return Ok(());
                    };
                    tx.send(WsMessage::Text(frame.encode()))
                        .await
                        .map_err(LinkError::Transport)?;
                }
                msg = rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let event = LinkEvent::Frame { attempt, text };
                            if self.events.send(event).await.is_err() {
                                self.cancel.cancel();
                                return Ok(());
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            tx.send(WsMessage::Pong(data))
                                .await
                                .map_err(LinkError::Transport)?;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty());
                            return Err(LinkError::Closed(reason));
                        }
                        Some(Ok(WsMessage::Binary(data))) => {
                            tracing::debug!(conversation = %self.conversation, len = data.len(), "ignoring binary frame");
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(LinkError::Transport(e)),
                        None => return Err(LinkError::StreamEnded),
                    }
                }
            }
        }
    }

    /// Frames queued while disconnected were meant for a connection that
    /// no longer exists.
    fn discard_stale_outbound(&mut self) {
        while let Ok(frame) = self.outbound.try_recv() {
            tracing::debug!(conversation = %self.conversation, ?frame, "dropping frame queued while disconnected");
        }
    }

    async fn emit_state(&self, attempt: Attempt, reason: Option<String>) {
        let event = LinkEvent::StateChanged {
            state: self.tracker.state(),
            attempt,
            reason,
        };
        if self.events.send(event).await.is_err() {
            tracing::debug!(conversation = %self.conversation, "link event receiver dropped");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
