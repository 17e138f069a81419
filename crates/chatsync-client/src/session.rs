//! One open conversation view.
//!
//! A single owning task holds the message set, the presence flag and the
//! connection state, and applies every mutation in arrival order: user
//! commands, supervisor link events, the one-shot history result and the
//! presence deadline. Observers read [`ConversationSnapshot`]s from a watch
//! channel and never touch the state directly.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatsync_core::frame::{InboundFrame, OutboundFrame, classify};
use chatsync_core::presence::PresenceTracker;
use chatsync_core::reconcile::{MessageSet, Participants, partner_id, scope_to};
use chatsync_core::reconnect::Attempt;
use chatsync_core::types::{ConnectionState, ConversationId, Message, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::backend::ChatBackend;
use crate::config::ChatConfig;
use crate::error::{BackendError, ChatError};
use crate::supervisor::{LinkEvent, Supervisor};

const COMMAND_CAPACITY: usize = 32;
const LINK_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 32;

/// Observable state of one conversation view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub connection: ConnectionState,
    /// Unique by id, in first-seen order.
    pub messages: Vec<Message>,
    pub partner_typing: bool,
    pub typing_user: Option<UserId>,
    pub history_loaded: bool,
    /// Most recent history or connection failure.
    pub last_error: Option<String>,
}

impl ConversationSnapshot {
    fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            connection: ConnectionState::Idle,
            messages: Vec::new(),
            partner_typing: false,
            typing_user: None,
            history_loaded: false,
            last_error: None,
        }
    }
}

#[derive(Debug)]
enum Command {
    /// A message persisted through the backend; acked once merged.
    Merge {
        message: Message,
        done: oneshot::Sender<()>,
    },
    NotifyTyping {
        to: UserId,
    },
    NotifyTypingPartner,
    SendLive {
        content: String,
    },
}

// ─── Handle ──────────────────────────────────────────────────────

/// Cloneable handle to a running conversation view.
///
/// The view stops on [`SessionHandle::stop`] or when the last clone drops.
pub struct SessionHandle<B> {
    conversation: ConversationId,
    backend: Arc<B>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ConversationSnapshot>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    _guard: Arc<DropGuard>,
}

impl<B> Clone for SessionHandle<B> {
    fn clone(&self) -> Self {
        Self {
            conversation: self.conversation.clone(),
            backend: self.backend.clone(),
            commands: self.commands.clone(),
            snapshot: self.snapshot.clone(),
            cancel: self.cancel.clone(),
            task: self.task.clone(),
            _guard: self._guard.clone(),
        }
    }
}

impl<B: ChatBackend> SessionHandle<B> {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation
    }

    /// Persist `content` and merge the stored message into the view.
    ///
    /// The content is trimmed first; blank input is rejected without a
    /// backend call. Backend failures are returned as-is and leave the
    /// message set untouched.
    pub async fn send_message(&self, content: &str) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.cancel.is_cancelled() {
            return Err(ChatError::SessionClosed);
        }

        let message = self
            .backend
            .send_message(&self.conversation, content)
            .await
            .inspect_err(|e| {
                tracing::warn!(conversation = %self.conversation, error = %e, "send failed");
            })?;

        let (done, merged) = oneshot::channel();
        let command = Command::Merge {
            message: message.clone(),
            done,
        };
        if self.commands.send(command).await.is_err() || merged.await.is_err() {
            tracing::debug!(
                conversation = %self.conversation,
                id = %message.id,
                "session closed before the sent message was merged"
            );
        }
        Ok(message)
    }

    /// Tell `to` the local user is typing. Dropped unless the live
    /// connection is open.
    pub fn notify_typing(&self, to: impl Into<UserId>) {
        self.submit(Command::NotifyTyping { to: to.into() });
    }

    /// Like [`Self::notify_typing`], addressed to the configured partner or
    /// the other sender seen in the conversation.
    pub fn notify_typing_partner(&self) {
        self.submit(Command::NotifyTypingPartner);
    }

    /// Push a chat frame over the live connection without persisting it.
    pub fn send_live(&self, content: impl Into<String>) {
        self.submit(Command::SendLive {
            content: content.into(),
        });
    }

    /// Stop the view: the supervisor, any pending retry, the presence
    /// timer and the history fetch. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(conversation = %self.conversation, "stopping session");
        }
        self.cancel.cancel();
    }

    /// Stop and wait for the owning task to finish.
    pub async fn shutdown(self) {
        self.stop();
        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(conversation = %self.conversation, error = %e, "session task failed");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshot.borrow().clone()
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.commands.try_send(command) {
            tracing::debug!(conversation = %self.conversation, "command dropped: {e}");
        }
    }
}

// ─── Owning task ─────────────────────────────────────────────────

/// State owned by the view's task.
pub struct ConversationSession {
    conversation: ConversationId,
    messages: MessageSet,
    presence: PresenceTracker,
    connection: ConnectionState,
    attempt: Attempt,
    history_loaded: bool,
    last_error: Option<String>,
    me: Option<UserId>,
    partner: Option<UserId>,
    outbound: mpsc::Sender<OutboundFrame>,
    state: watch::Sender<ConversationSnapshot>,
    origin: Instant,
}

impl ConversationSession {
    /// Open a view of `conversation`: start the live connection and, when
    /// configured, the history fetch. Must be called inside a tokio runtime.
    pub fn spawn<B: ChatBackend>(
        conversation: ConversationId,
        backend: Arc<B>,
        config: &ChatConfig,
    ) -> Result<SessionHandle<B>, ChatError> {
        config.validate()?;
        let ws_base = config.ws_url()?;

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (link_tx, link_rx) = mpsc::channel(LINK_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConversationSnapshot::empty(conversation.clone()));

        let supervisor = Supervisor::new(
            conversation.clone(),
            backend.clone(),
            ws_base,
            config.reconnect_policy(),
            link_tx,
            outbound_rx,
            cancel.child_token(),
        );
        let supervisor = tokio::spawn(supervisor.run());

        let history = config.history_on_start.then(|| {
            let backend = backend.clone();
            let conversation = conversation.clone();
            async move { backend.fetch_history(&conversation).await }
        });

        let session = Self {
            conversation: conversation.clone(),
            messages: MessageSet::new(),
            presence: PresenceTracker::new(config.typing_quiet_ms),
            connection: ConnectionState::Idle,
            attempt: 0,
            history_loaded: false,
            last_error: None,
            me: config.me.clone(),
            partner: config.partner.clone(),
            outbound: outbound_tx,
            state: state_tx,
            origin: Instant::now(),
        };
        tracing::info!(conversation = %conversation, "opening conversation");
        let task = tokio::spawn(session.run(history, command_rx, link_rx, supervisor, cancel.clone()));

        Ok(SessionHandle {
            conversation,
            backend,
            commands: command_tx,
            snapshot: state_rx,
            task: Arc::new(Mutex::new(Some(task))),
            _guard: Arc::new(cancel.clone().drop_guard()),
            cancel,
        })
    }

    async fn run<H>(
        mut self,
        history: Option<H>,
        mut commands: mpsc::Receiver<Command>,
        mut link: mpsc::Receiver<LinkEvent>,
        supervisor: JoinHandle<()>,
        cancel: CancellationToken,
    ) where
        H: Future<Output = Result<Vec<Message>, BackendError>>,
    {
        let mut history_pending = history.is_some();
        let history = async move {
            match history {
                Some(fetch) => fetch.await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(history);

        loop {
            let deadline = self.presence_deadline();
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = &mut history, if history_pending => {
                    history_pending = false;
                    self.on_history(result);
                }
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                event = link.recv() => match event {
                    Some(event) => self.on_link_event(event),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or(self.origin)), if deadline.is_some() => {
                    let now = self.now_ms();
                    if self.presence.poll(now).flipped() {
                        tracing::debug!(conversation = %self.conversation, "partner stopped typing");
                        self.publish();
                    }
                }
            }
        }

        cancel.cancel();
        drop(link);
        if let Err(e) = supervisor.await {
            tracing::warn!(conversation = %self.conversation, error = %e, "supervisor task failed");
        }
        self.connection = ConnectionState::Idle;
        self.presence.on_connection_closed();
        self.publish();
        tracing::info!(conversation = %self.conversation, "conversation closed");
    }

    fn on_history(&mut self, result: Result<Vec<Message>, BackendError>) {
        match result {
            Ok(history) => {
                let fetched = history.len();
                // History is fetched per conversation, so only stamping applies.
                let conversation = &self.conversation;
                let anyone = Participants::default();
                let added = self.messages.merge_all(
                    history
                        .into_iter()
                        .filter_map(|m| scope_to(conversation, &anyone, m)),
                );
                self.history_loaded = true;
                tracing::info!(conversation = %self.conversation, fetched, added, "history loaded");
            }
            Err(e) => {
                tracing::warn!(conversation = %self.conversation, error = %e, "history fetch failed");
                self.last_error = Some(format!("history: {e}"));
            }
        }
        self.publish();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Merge { message, done } => {
                self.absorb(message);
                let _ = done.send(());
            }
            Command::NotifyTyping { to } => self.send_frame(OutboundFrame::typing(to)),
            Command::NotifyTypingPartner => {
                match self.partner() {
                    Some(to) => self.send_frame(OutboundFrame::typing(to)),
                    None => {
                        tracing::debug!(conversation = %self.conversation, "no typing recipient known yet");
                    }
                }
            }
            Command::SendLive { content } => self.send_frame(OutboundFrame::chat(content)),
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::StateChanged {
                state,
                attempt,
                reason,
            } => {
                self.attempt = attempt;
                self.connection = state;
                if !state.is_open() {
                    self.presence.on_connection_closed();
                }
                if let Some(reason) = reason {
                    self.last_error = Some(reason);
                }
                self.publish();
            }
            LinkEvent::Frame { attempt, text } => {
                if attempt != self.attempt || !self.connection.is_open() {
                    tracing::debug!(conversation = %self.conversation, attempt, "ignoring frame from a stale connection");
                    return;
                }
                self.on_frame(&text);
            }
        }
    }

    fn on_frame(&mut self, text: &str) {
        match classify(text) {
            InboundFrame::Message(message) => self.absorb(message),
            InboundFrame::Typing(signal) => {
                let now = self.now_ms();
                if self.presence.on_signal(signal.from_user_id, now).flipped() {
                    tracing::debug!(conversation = %self.conversation, "partner typing");
                }
                self.publish();
            }
            InboundFrame::Unrecognized(reason) => {
                tracing::warn!(conversation = %self.conversation, "ignoring unrecognized frame: {reason}");
            }
        }
    }

    /// The configured partner, or the first other sender seen so far.
    fn partner(&self) -> Option<UserId> {
        self.partner.clone().or_else(|| {
            self.me
                .as_ref()
                .and_then(|me| partner_id(&self.messages, me))
        })
    }

    /// Reconcile one message into the set.
    fn absorb(&mut self, message: Message) {
        let id = message.id.clone();
        let participants = Participants::new(self.me.clone(), self.partner());
        match scope_to(&self.conversation, &participants, message) {
            Some(message) => {
                if self.messages.merge(message) {
                    self.publish();
                } else {
                    tracing::debug!(conversation = %self.conversation, %id, "duplicate message");
                }
            }
            None => {
                tracing::debug!(conversation = %self.conversation, %id, "dropping message for another conversation or pair");
            }
        }
    }

    fn send_frame(&self, frame: OutboundFrame) {
        if !self.connection.is_open() {
            tracing::debug!(conversation = %self.conversation, ?frame, "connection not open, frame dropped");
            return;
        }
        if let Err(e) = self.outbound.try_send(frame) {
            tracing::debug!(conversation = %self.conversation, "outbound frame dropped: {e}");
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn presence_deadline(&self) -> Option<Instant> {
        self.presence
            .deadline_ms()
            .map(|ms| self.origin + Duration::from_millis(ms))
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            conversation_id: self.conversation.clone(),
            connection: self.connection,
            messages: self.messages.as_slice().to_vec(),
            partner_typing: self.presence.is_typing(),
            typing_user: self.presence.typing_user().cloned(),
            history_loaded: self.history_loaded,
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

// ─── Tests ───────────────────────────────────────────────────────
