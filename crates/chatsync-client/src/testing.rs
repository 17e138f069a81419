//! In-process fakes for supervisor and session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatsync_core::types::{ConversationId, Message, MessageId, Ticket, UserId};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::backend::ChatBackend;
use crate::error::BackendError;

const WAIT: Duration = Duration::from_secs(5);

// ─── Fake backend ────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    ticket_calls: usize,
    fail_tickets: usize,
    hang_tickets: bool,
    history: Vec<Message>,
    history_error: Option<String>,
    history_calls: usize,
    send_error: Option<String>,
    sent: Vec<(ConversationId, String)>,
}

/// Scriptable [`ChatBackend`]: numbered tickets, canned history, and a
/// send endpoint that assigns ids `sent-1`, `sent-2`, ...
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<Message>) -> Self {
        let backend = Self::new();
        backend.lock().history = history;
        backend
    }

    pub fn fail_next_tickets(&self, n: usize) {
        self.lock().fail_tickets = n;
    }

    /// Every later ticket fetch never completes.
    pub fn hang_tickets(&self) {
        self.lock().hang_tickets = true;
    }

    pub fn fail_history(&self, reason: &str) {
        self.lock().history_error = Some(reason.to_owned());
    }

    pub fn fail_sends(&self, reason: &str) {
        self.lock().send_error = Some(reason.to_owned());
    }

    pub fn ticket_calls(&self) -> usize {
        self.lock().ticket_calls
    }

    pub fn history_calls(&self) -> usize {
        self.lock().history_calls
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl ChatBackend for FakeBackend {
    async fn fetch_ticket(&self) -> Result<Ticket, BackendError> {
        let outcome = {
            let mut state = self.lock();
            state.ticket_calls += 1;
            if state.hang_tickets {
                None
            } else if state.fail_tickets > 0 {
                state.fail_tickets -= 1;
                Some(Err(BackendError::Unavailable("ticket refused".into())))
            } else {
                Some(Ok(Ticket::new(format!("t-{}", state.ticket_calls))))
            }
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn fetch_history(
        &self,
        _conversation: &ConversationId,
    ) -> Result<Vec<Message>, BackendError> {
        let mut state = self.lock();
        state.history_calls += 1;
        match &state.history_error {
            Some(reason) => Err(BackendError::Unavailable(reason.clone())),
            None => Ok(state.history.clone()),
        }
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<Message, BackendError> {
        let mut state = self.lock();
        if let Some(reason) = &state.send_error {
            return Err(BackendError::Unavailable(reason.clone()));
        }
        state.sent.push((conversation.clone(), content.to_owned()));
        Ok(message(
            &format!("sent-{}", state.sent.len()),
            conversation.as_str(),
            "me",
            content,
        ))
    }
}

pub fn message(id: &str, conversation: &str, sender: &str, content: &str) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation),
        sender_id: UserId::from(sender),
        receiver_id: None,
        content: content.to_owned(),
        created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
    }
}

// ─── WebSocket server ────────────────────────────────────────────

/// Loopback WebSocket server handing each accepted connection to the test.
pub struct TestWsServer {
    addr: std::net::SocketAddr,
    conns: mpsc::UnboundedReceiver<ServerConn>,
    accepted: Arc<AtomicUsize>,
}

impl TestWsServer {
    pub async fn start() -> Self {
        Self::start_rejecting(0).await
    }

    /// Refuse the first `n` handshakes with HTTP 401.
    pub async fn start_rejecting(n: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let reject = Arc::new(AtomicUsize::new(n));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let counter = counter.clone();
                let reject = reject.clone();
                tokio::spawn(async move {
                    if let Some(conn) = handshake(stream, reject).await {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(conn);
                    }
                });
            }
        });

        Self {
            addr,
            conns,
            accepted,
        }
    }

    pub fn ws_base(&self) -> Url {
        Url::parse(&format!("ws://{}/ws", self.addr)).unwrap()
    }

    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("server stopped")
    }

    /// Completed handshakes so far.
    pub fn connection_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

async fn handshake(stream: TcpStream, reject: Arc<AtomicUsize>) -> Option<ServerConn> {
    let query = Arc::new(Mutex::new(String::new()));
    let captured = query.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *captured.lock().unwrap() = req.uri().query().unwrap_or_default().to_owned();
        let refuse = reject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            let denied = http::Response::builder()
                .status(http::StatusCode::UNAUTHORIZED)
                .body(Some("invalid ticket".to_owned()))
                .unwrap();
            return Err(denied);
        }
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.ok()?;
    let query = query.lock().unwrap().clone();
    Some(ServerConn { ws, query })
}

/// Server side of one accepted connection.
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
    query: String,
}

impl ServerConn {
    pub fn query_param(&self, key: &str) -> Option<String> {
        let url = Url::parse(&format!("http://localhost/?{}", self.query)).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(WsMessage::Text(text.to_owned())).await.unwrap();
    }

    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next text frame from the client.
    pub async fn recv_text(&mut self) -> String {
        tokio::time::timeout(WAIT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(WsMessage::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended while waiting for text: {other:?}"),
                }
            }
        })
        .await
        .expect("timed out waiting for a client frame")
    }

    /// Server-initiated close.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        // Let the close handshake finish before dropping the socket.
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }
}

// ─── Waiting helpers ─────────────────────────────────────────────

pub async fn recv_event<T>(rx: &mut mpsc::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Wait until the watched value satisfies `pred`, returning a copy of it.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("sender dropped");
        }
    })
    .await
    .expect("timed out waiting for state")
}
