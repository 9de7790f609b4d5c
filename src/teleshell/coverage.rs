use crate::teleshell::message::{Message, sort_newest_first};
use chrono::{DateTime, FixedOffset, Local};

/// The part of a fetch result that this run will summarize.
#[derive(Debug, Clone)]
pub struct Coverage {
    /// Covered messages, newest first. Never empty.
    pub messages: Vec<Message>,
    pub retrieved: usize,
    pub truncated: bool,
}

impl Coverage {
    /// Returns `None` when nothing was retrieved. When more than
    /// `nominal_limit` messages came back, the oldest excess is dropped so
    /// the newest message always stays covered.
    pub fn from_retrieved(mut messages: Vec<Message>, nominal_limit: usize) -> Option<Coverage> {
        if messages.is_empty() {
            return None;
        }

        let retrieved = messages.len();
        sort_newest_first(&mut messages);
        let truncated = retrieved > nominal_limit;
        if truncated {
            messages.truncate(nominal_limit.max(1));
        }

        Some(Coverage {
            messages,
            retrieved,
            truncated,
        })
    }

    pub fn covered_count(&self) -> usize {
        self.messages.len()
    }

    pub fn dropped_count(&self) -> usize {
        self.retrieved - self.messages.len()
    }

    pub fn newest(&self) -> &Message {
        &self.messages[0]
    }

    pub fn oldest(&self) -> &Message {
        &self.messages[self.messages.len() - 1]
    }

    pub fn newest_timestamp(&self) -> DateTime<FixedOffset> {
        self.newest().timestamp
    }

    pub fn oldest_timestamp(&self) -> DateTime<FixedOffset> {
        self.oldest().timestamp
    }

    /// `"<oldest> to <newest>"` in the operator's local time.
    pub fn period_label(&self) -> String {
        format!(
            "{} to {}",
            local_minutes(self.oldest_timestamp()),
            local_minutes(self.newest_timestamp())
        )
    }
}

fn local_minutes(at: DateTime<FixedOffset>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
