use crate::teleshell::config::{Checkpoint, ConfigStore};
use crate::teleshell::coverage::Coverage;
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointAdvance {
    Advanced {
        previous: Option<i64>,
        current: Checkpoint,
    },
    /// The stored position is already at or past the newest covered message.
    Unchanged(Checkpoint),
}

/// Records the newest covered message as the channel's checkpoint. Callers
/// invoke this only after the summary for `coverage` succeeded.
pub fn advance(store: &ConfigStore, channel: &str, coverage: &Coverage) -> Result<CheckpointAdvance> {
    let newest = coverage.newest();
    let existing = store.get_checkpoint(channel)?;

    if let Some(existing) = existing.as_ref()
        && existing.last_message_id >= newest.id
    {
        tracing::debug!(
            channel,
            stored = existing.last_message_id,
            newest = newest.id,
            "checkpoint already at or past newest covered message"
        );
        return Ok(CheckpointAdvance::Unchanged(existing.clone()));
    }

    let current = store.update_checkpoint(channel, newest.id, &newest.timestamp.to_rfc3339())?;
    tracing::info!(channel, last_message_id = current.last_message_id, "checkpoint advanced");
    Ok(CheckpointAdvance::Advanced {
        previous: existing.map(|c| c.last_message_id),
        current,
    })
}
