//! Inbound frame classification and outbound frame encoding.
//!
//! The live connection carries two frame shapes without a common envelope:
//! chat messages (structural, no discriminant) and typing signals
//! (`{"type":"typing", ...}`). All probing for the discriminant happens in
//! [`classify`]; nothing else in the workspace inspects raw frames.

use serde_json::Value;

use crate::types::{Message, TypingSignal, UserId};

/// Discriminant value carried by presence frames.
pub const TYPING_DISCRIMINANT: &str = "typing";

/// Discriminant value of the server's broadcast envelope around a message.
pub const CHAT_DISCRIMINANT: &str = "chat";

/// Result of classifying one raw inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Message(Message),
    Typing(TypingSignal),
    /// Neither shape matched. Carries a human-readable reason for the log.
    Unrecognized(String),
}

impl InboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Classify a raw text payload from the live connection.
///
/// Probing order:
/// 1. not JSON → `Unrecognized`
/// 2. `type == "typing"` → `Typing`
/// 3. `type == "chat"` with a nested `message` object → `Message`
/// 4. otherwise a structural `Message` decode of the whole payload
pub fn classify(raw: &str) -> InboundFrame {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return InboundFrame::Unrecognized(format!("invalid json: {e}")),
    };

    match value.get("type").and_then(Value::as_str) {
        Some(TYPING_DISCRIMINANT) => InboundFrame::Typing(typing_from(&value)),
        Some(CHAT_DISCRIMINANT) if value.get("message").is_some_and(Value::is_object) => {
            decode_message(value.get("message").cloned().unwrap_or(Value::Null))
        }
        _ => decode_message(value),
    }
}

fn typing_from(value: &Value) -> TypingSignal {
    let user = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(UserId::from)
    };
    TypingSignal {
        to_user_id: user("toUserId"),
        from_user_id: user("fromUserId"),
    }
}

fn decode_message(value: Value) -> InboundFrame {
    match serde_json::from_value::<Message>(value) {
        Ok(msg) => InboundFrame::Message(msg),
        Err(e) => InboundFrame::Unrecognized(format!("not a message: {e}")),
    }
}

// ─── Outbound ─────────────────────────────────────────────────────

/// Frames this client writes to the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Plain send. Encodes as `{"content": ...}` unless a recipient is
    /// given, in which case the server's routed form is used.
    Chat {
        content: String,
        to_user_id: Option<UserId>,
    },
    Typing { to_user_id: UserId },
}

impl OutboundFrame {
    pub fn chat(content: impl Into<String>) -> Self {
        Self::Chat {
            content: content.into(),
            to_user_id: None,
        }
    }

    pub fn typing(to_user_id: impl Into<UserId>) -> Self {
        Self::Typing {
            to_user_id: to_user_id.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Chat {
                content,
                to_user_id: None,
            } => serde_json::json!({ "content": content }),
            Self::Chat {
                content,
                to_user_id: Some(to),
            } => serde_json::json!({
                "type": CHAT_DISCRIMINANT,
                "toUserId": to,
                "content": content,
            }),
            Self::Typing { to_user_id } => serde_json::json!({
                "type": TYPING_DISCRIMINANT,
                "toUserId": to_user_id,
            }),
        }
    }

    /// Encode as the JSON text sent in a single text frame.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────
