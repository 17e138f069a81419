//! chatsync-client: async runtime of the realtime chat layer.
//!
//! One [`session::ConversationSession`] per open conversation view owns the
//! message set, the typing flag and the connection state, and serializes
//! every mutation through a single task. The [`supervisor::Supervisor`]
//! keeps the live WebSocket up; [`backend::ChatBackend`] is the
//! request/response boundary (tickets, history, send).

pub mod backend;
pub mod config;
pub mod error;
pub mod http_backend;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::ChatBackend;
pub use http_backend::{ApiContext, HttpBackend};
pub use chatsync_core::types;
pub use config::ChatConfig;
pub use error::{BackendError, ChatError};
pub use session::{ConversationSession, ConversationSnapshot, SessionHandle};
