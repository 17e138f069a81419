//! Message reconciliation.
//!
//! History fetches, live deliveries and send responses all funnel through
//! [`MessageSet::merge`]. Identity is the message id alone; display order is
//! the order of first observation, never `created_at`.

use std::collections::HashSet;

use crate::types::{ConversationId, Message, MessageId, UserId};

/// Ordered, unique-by-id sequence of messages for one conversation view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSet {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `incoming` unless a message with the same id is already present.
    ///
    /// Returns `true` when the message was appended.
    pub fn merge(&mut self, incoming: Message) -> bool {
        if self.ids.contains(&incoming.id) {
            return false;
        }
        self.ids.insert(incoming.id.clone());
        self.messages.push(incoming);
        true
    }

    /// Merge every message in order. Returns how many were appended.
    pub fn merge_all(&mut self, incoming: impl IntoIterator<Item = Message>) -> usize {
        incoming
            .into_iter()
            .map(|msg| self.merge(msg))
            .filter(|&added| added)
            .count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.messages.iter().map(|m| &m.id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl FromIterator<Message> for MessageSet {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        let mut set = Self::new();
        set.merge_all(iter);
        set
    }
}

impl<'a> IntoIterator for &'a MessageSet {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Functional form of [`MessageSet::merge`]: returns the set unchanged when
/// `incoming.id` is already present, otherwise the set with `incoming`
/// appended.
pub fn merge(mut set: MessageSet, incoming: Message) -> MessageSet {
    set.merge(incoming);
    set
}

/// The two users a conversation is between, as far as they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participants {
    pub me: Option<UserId>,
    pub partner: Option<UserId>,
}

impl Participants {
    pub fn new(me: Option<UserId>, partner: Option<UserId>) -> Self {
        Self { me, partner }
    }

    fn includes(&self, user: &UserId) -> bool {
        self.me.as_ref() == Some(user) || self.partner.as_ref() == Some(user)
    }

    /// Whether a message without a conversation tag can belong to this pair.
    ///
    /// With both users known, sender and receiver (when present) must both
    /// be one of them. With only the partner known, the partner must be on
    /// one end. Otherwise nothing can be ruled out.
    pub fn admits(&self, msg: &Message) -> bool {
        match (&self.me, &self.partner) {
            (Some(_), Some(_)) => {
                self.includes(&msg.sender_id)
                    && msg.receiver_id.as_ref().is_none_or(|r| self.includes(r))
            }
            (None, Some(partner)) => {
                &msg.sender_id == partner || msg.receiver_id.as_ref() == Some(partner)
            }
            _ => true,
        }
    }
}

/// Prepare a live-delivered message for merging into `conversation`'s set.
///
/// The server fans every message for a user out to all of that user's
/// sockets. A message tagged with another conversation is rejected
/// (`None`). An untagged one is accepted only if `participants` admits it,
/// and is then stamped with `conversation`.
pub fn scope_to(
    conversation: &ConversationId,
    participants: &Participants,
    mut msg: Message,
) -> Option<Message> {
    if !msg.belongs_to(conversation) {
        return None;
    }
    if msg.conversation_id.is_empty() {
        if !participants.admits(&msg) {
            return None;
        }
        msg.conversation_id = conversation.clone();
    }
    Some(msg)
}

/// The other participant: sender of the first message not sent by `me`.
pub fn partner_id(set: &MessageSet, me: &UserId) -> Option<UserId> {
    set.iter()
        .find(|m| &m.sender_id != me)
        .map(|m| m.sender_id.clone())
}

// ─── Tests ────────────────────────────────────────────────────────
