use chrono::{DateTime, FixedOffset};

/// A channel message as the summarization core consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub text: String,
    pub timestamp: DateTime<FixedOffset>,
    pub sender_id: Option<i64>,
}

/// Orders newest first, the direction checkpoints advance in.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.id.cmp(&a.id));
}
