use crate::teleshell::transport::Dialog;
use anyhow::{Result, bail};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceRow {
    Separator(String),
    Channel {
        name: String,
        value: String,
        title: String,
        enabled: bool,
    },
}

fn folder_name(folders: &BTreeMap<i64, String>, id: i64) -> String {
    folders
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("Folder {id}"))
}

/// Rows for the channel picker: one separator per folder, channels sorted by
/// title inside it. A dialog is pre-selected when its `@handle` or numeric id
/// is already tracked.
pub fn prepare_channel_choices(
    dialogs: &[Dialog],
    folders: &BTreeMap<i64, String>,
    tracked: &[String],
) -> Vec<ChoiceRow> {
    let mut grouped: BTreeMap<i64, Vec<&Dialog>> = BTreeMap::new();
    for dialog in dialogs {
        grouped.entry(dialog.folder_id).or_default().push(dialog);
    }

    let mut rows = Vec::with_capacity(dialogs.len() + grouped.len());
    for (folder_id, mut members) in grouped {
        members.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        rows.push(ChoiceRow::Separator(folder_name(folders, folder_id)));
        for dialog in members {
            let value = dialog.channel_ref();
            let id = dialog.id.to_string();
            let enabled = tracked.iter().any(|t| t == &value || t == &id);
            let name = match dialog.handle.as_deref() {
                Some(handle) => format!("{} (@{})", dialog.title, handle.trim_start_matches('@')),
                None => dialog.title.clone(),
            };
            rows.push(ChoiceRow::Channel {
                name,
                value,
                title: dialog.title.clone(),
                enabled,
            });
        }
    }
    rows
}

/// Channel rows in display order, as `(value, title, enabled)`.
pub fn channel_rows(rows: &[ChoiceRow]) -> Vec<(&str, &str, bool)> {
    rows.iter()
        .filter_map(|row| match row {
            ChoiceRow::Channel {
                value,
                title,
                enabled,
                ..
            } => Some((value.as_str(), title.as_str(), *enabled)),
            ChoiceRow::Separator(_) => None,
        })
        .collect()
}

/// Parses a comma-separated list of 1-based channel row numbers. Blank input
/// returns `None` (keep the current selection); `none` selects nothing.
pub fn parse_selection(input: &str, channel_count: usize) -> Result<Option<Vec<usize>>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(Some(Vec::new()));
    }

    let mut picked = Vec::new();
    for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Ok(n) = part.parse::<usize>() else {
            bail!("invalid selection `{part}`: expected row numbers like 1,3");
        };
        if n == 0 || n > channel_count {
            bail!("selection {n} is out of range 1..={channel_count}");
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    picked.sort_unstable();
    Ok(Some(picked))
}
