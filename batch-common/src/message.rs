use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str;
use std::time;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("message identifier cannot be empty")]
pub struct EmptyMessageIdError;

/// The identifier a broker assigned to a message. Opaque to us, but never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyMessageIdError> {
        let id = id.into();

        if id.is_empty() {
            Err(EmptyMessageIdError)
        } else {
            Ok(MessageId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MessageId {
    type Error = EmptyMessageIdError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        MessageId::new(id)
    }
}

impl TryFrom<&str> for MessageId {
    type Error = EmptyMessageIdError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        MessageId::new(id)
    }
}

/// Delivery metadata the broker attaches to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryAttributes {
    /// How many times the broker has handed this message out, this delivery included.
    pub receive_count: Option<u32>,
    /// When the message was originally sent to the queue.
    pub sent_at: Option<DateTime<Utc>>,
    /// Every attribute as received, including the ones parsed above.
    pub raw: HashMap<String, String>,
}

/// A single unit of work: an identifier plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    body: Bytes,
    attributes: DeliveryAttributes,
}

impl Message {
    pub fn new(id: MessageId, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            body: body.into(),
            attributes: DeliveryAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: DeliveryAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.body)
    }

    pub fn attributes(&self) -> &DeliveryAttributes {
        &self.attributes
    }

    /// Time spent in the queue before `now`, if the broker told us when the message was sent.
    /// Returns `None` for a `sent_at` in the future.
    pub fn queue_time(&self, now: DateTime<Utc>) -> Option<time::Duration> {
        self.attributes
            .sent_at
            .and_then(|sent_at| (now - sent_at).to_std().ok())
    }
}

/// An ordered sequence of messages delivered together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    messages: Vec<Message>,
}

impl Batch {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl FromIterator<Message> for Batch {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Batch::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Batch {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// The identifiers of every message that failed, in the order the failures were recorded.
///
/// Successful messages are never listed: the broker treats absence as acknowledgement.
/// An identifier is listed at most once, even if it is recorded repeatedly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    failures: Vec<MessageId>,
    seen: HashSet<MessageId>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed message. Returns `false` if the identifier was already recorded.
    pub fn record_failure(&mut self, id: MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }

        self.failures.push(id);
        true
    }

    pub fn failures(&self) -> &[MessageId] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_failures(self) -> Vec<MessageId> {
        self.failures
    }
}
