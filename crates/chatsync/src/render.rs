//! Turns successive snapshots into terminal lines.

use chatsync_client::ConversationSnapshot;
use chatsync_core::types::{ConnectionState, Message, UserId};

/// `[12:00:05] u2: hello`, with the local user shown as `you`.
pub fn format_message(msg: &Message, me: Option<&UserId>) -> String {
    let who = if me == Some(&msg.sender_id) {
        "you"
    } else {
        msg.sender_id.as_str()
    };
    format!("[{}] {who}: {}", msg.created_at.format("%H:%M:%S"), msg.content)
}

/// Remembers what was already printed so each snapshot yields only the
/// lines that changed.
pub struct SnapshotPrinter {
    me: Option<UserId>,
    printed: usize,
    connection: Option<ConnectionState>,
    typing: bool,
    last_error: Option<String>,
}

impl SnapshotPrinter {
    pub fn new(me: Option<UserId>) -> Self {
        Self {
            me,
            printed: 0,
            connection: None,
            typing: false,
            last_error: None,
        }
    }

    pub fn diff(&mut self, snap: &ConversationSnapshot) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connection != Some(snap.connection) {
            self.connection = Some(snap.connection);
            lines.push(format!("-- {} --", connection_label(snap.connection)));
        }

        if snap.last_error != self.last_error {
            if let Some(err) = &snap.last_error {
                lines.push(format!("!! {err}"));
            }
            self.last_error = snap.last_error.clone();
        }

        // The message set only grows.
        for msg in snap.messages.iter().skip(self.printed) {
            lines.push(format_message(msg, self.me.as_ref()));
        }
        self.printed = self.printed.max(snap.messages.len());

        if snap.partner_typing != self.typing {
            self.typing = snap.partner_typing;
            if snap.partner_typing {
                let who = snap.typing_user.as_ref().map_or("partner", UserId::as_str);
                lines.push(format!("({who} is typing...)"));
            }
        }

        lines
    }
}

fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "offline",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Open => "connected",
        ConnectionState::ClosedPendingRetry => "disconnected, retrying",
    }
}
