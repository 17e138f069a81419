//! Request/response boundary consumed by the chat layer.

use std::future::Future;

use chatsync_core::types::{ConversationId, Message, Ticket};

use crate::error::BackendError;

/// The three request/response calls the realtime layer depends on.
///
/// Implementations carry their own credentials (see
/// [`crate::http_backend::ApiContext`]); nothing is read from process-wide
/// state.
pub trait ChatBackend: Send + Sync + 'static {
    /// Obtain a fresh single-use ticket for one connection attempt.
    fn fetch_ticket(&self) -> impl Future<Output = Result<Ticket, BackendError>> + Send;

    /// Full history of `conversation`, oldest first.
    fn fetch_history(
        &self,
        conversation: &ConversationId,
    ) -> impl Future<Output = Result<Vec<Message>, BackendError>> + Send;

    /// Persist a message. The response carries the authoritative id and
    /// timestamp.
    fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> impl Future<Output = Result<Message, BackendError>> + Send;
}
