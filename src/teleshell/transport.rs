use crate::teleshell::message::Message;
use crate::teleshell::window::FetchWindow;
use anyhow::Result;
use std::collections::BTreeMap;

/// A dialog (channel or group) visible to the logged-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub id: i64,
    pub title: String,
    pub handle: Option<String>,
    pub folder_id: i64,
}

impl Dialog {
    /// The identifier written to the tracked channel list: `@handle` when the
    /// dialog has one, otherwise the numeric id.
    pub fn channel_ref(&self) -> String {
        match self.handle.as_deref().map(str::trim) {
            Some(handle) if !handle.is_empty() => {
                format!("@{}", handle.trim_start_matches('@'))
            }
            _ => self.id.to_string(),
        }
    }
}

/// How a channel identifier is handed to the messaging backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRef {
    Id(i64),
    Reference(String),
}

impl PeerRef {
    pub fn parse(channel: &str) -> PeerRef {
        let trimmed = channel.trim();
        match trimmed.parse::<i64>() {
            Ok(id) => PeerRef::Id(id),
            Err(_) => PeerRef::Reference(trimmed.to_string()),
        }
    }
}

/// The messaging backend, as seen by the summarization core.
pub trait Transport {
    /// Messages above `window`'s floor, at most `window.cap` of them. Order is
    /// unspecified; callers sort.
    fn fetch(&self, channel: &str, window: &FetchWindow) -> Result<Vec<Message>>;
    fn list_channels(&self) -> Result<Vec<Dialog>>;
    /// Folder id to name. Folder `0` is always present.
    fn list_folders(&self) -> Result<BTreeMap<i64, String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_channels_become_integer_peers() {
        assert_eq!(PeerRef::parse("-1001234567890"), PeerRef::Id(-1001234567890));
        assert_eq!(PeerRef::parse(" 42 "), PeerRef::Id(42));
        assert_eq!(
            PeerRef::parse("@news"),
            PeerRef::Reference("@news".to_string())
        );
        assert_eq!(
            PeerRef::parse("t.me/news"),
            PeerRef::Reference("t.me/news".to_string())
        );
    }

    #[test]
    fn channel_ref_prefers_handle() {
        let mut dialog = Dialog {
            id: 456,
            title: "NoHandle".to_string(),
            handle: None,
            folder_id: 0,
        };
        assert_eq!(dialog.channel_ref(), "456");
        dialog.handle = Some("username".to_string());
        assert_eq!(dialog.channel_ref(), "@username");
        dialog.handle = Some("@already".to_string());
        assert_eq!(dialog.channel_ref(), "@already");
    }
}
