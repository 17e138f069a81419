use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Identifiers ──────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Key of one two-party conversation (the server calls it a match).
    ///
    /// Scopes a live connection, a message set and a presence flag.
    ConversationId
);

string_id!(
    /// Server-assigned user identifier.
    UserId
);

string_id!(
    /// Server-assigned message identifier. Message identity is this value alone.
    MessageId
);

// ─── Message ──────────────────────────────────────────────────────

/// A chat message as delivered by history, the send endpoint or the live
/// connection.
///
/// `matchId` is optional on the wire: the server's broadcast envelope
/// carries the stored row, which has no conversation column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(
        rename = "matchId",
        default,
        skip_serializing_if = "ConversationId::is_empty"
    )]
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Present on stored rows relayed by the server's broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this message belongs to `conversation`.
    ///
    /// Messages without a conversation id are accepted by every view.
    pub fn belongs_to(&self, conversation: &ConversationId) -> bool {
        self.conversation_id.is_empty() || &self.conversation_id == conversation
    }
}

// ─── Ticket ───────────────────────────────────────────────────────

/// Single-use credential authorizing exactly one live-connection attempt.
///
/// Consumed by value when the connection address is built, so a ticket
/// cannot be reused across reconnects.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Ticket(String);

impl Ticket {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ticket(<redacted>)")
    }
}

// ─── Connection state ─────────────────────────────────────────────

/// Lifecycle state of the live connection for one conversation view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    ClosedPendingRetry,
}

impl ConnectionState {
    pub const ALL: [Self; 4] = [
        Self::Idle,
        Self::Connecting,
        Self::Open,
        Self::ClosedPendingRetry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ClosedPendingRetry => "closed_pending_retry",
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::InvalidValue(format!("unknown connection state: {s}")))
    }
}

// ─── Presence ─────────────────────────────────────────────────────

/// A discrete "user is composing" event. There is no matching stop event.
///
/// The server relays the sender's frame verbatim, so only the recipient is
/// guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

// ─── Tests ────────────────────────────────────────────────────────
