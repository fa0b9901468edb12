use std::fmt;

/// Numeric identity of a chat user, unique per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one inbound message, used to address threaded replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message.
#[derive(Debug, Clone)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
}

/// One inbound chat message. Immutable once enqueued.
///
/// The author and text are always present; the text may be empty.
#[derive(Debug, Clone)]
pub struct Message {
    pub author: Author,
    pub text: String,
    pub id: MessageId,
}
