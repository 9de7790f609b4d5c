use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, BufRead, Write};

use crate::commands::CommandReport;
use crate::telegram::bridge::BridgeTransport;
use crate::telegram::resolve_credentials;
use crate::teleshell::config::{ConfigStore, Settings};
use crate::teleshell::paths::resolve_paths;
use crate::teleshell::picker::{ChoiceRow, channel_rows, parse_selection, prepare_channel_choices};
use crate::teleshell::transport::Transport;

#[derive(Debug, Clone, Serialize)]
struct ChannelRow<'a> {
    channel: &'a str,
    title: Option<&'a str>,
    last_message_id: Option<i64>,
    last_message_date: Option<&'a str>,
}

fn open_store() -> Result<ConfigStore> {
    let paths = resolve_paths()?;
    Ok(ConfigStore::new(paths.config_file))
}

pub fn list() -> Result<CommandReport> {
    let store = open_store()?;
    let settings = store.load()?;
    let mut report = CommandReport::new("channels-list");
    report.detail(format!("config={}", store.path().display()));

    if settings.default_channels.is_empty() {
        report.detail("no tracked channels; add one with `teleshell channels add @handle`");
        return Ok(report);
    }

    for channel in &settings.default_channels {
        let title = settings.channel_titles.get(channel).map(String::as_str);
        let checkpoint = settings.checkpoint(channel);
        let position = match checkpoint {
            Some(c) => format!("last_message_id={} ({})", c.last_message_id, c.last_message_date),
            None => "no checkpoint".to_string(),
        };
        match title {
            Some(title) => report.detail(format!("{channel} \"{title}\" {position}")),
            None => report.detail(format!("{channel} {position}")),
        }
        report.record(ChannelRow {
            channel,
            title,
            last_message_id: checkpoint.map(|c| c.last_message_id),
            last_message_date: checkpoint.map(|c| c.last_message_date.as_str()),
        });
    }
    Ok(report)
}

fn add_to(settings: &mut Settings, channel: &str, title: Option<&str>) -> bool {
    let added = if settings.default_channels.iter().any(|c| c == channel) {
        false
    } else {
        settings.default_channels.push(channel.to_string());
        true
    };
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        settings
            .channel_titles
            .insert(channel.to_string(), title.to_string());
    }
    added
}

pub fn add(channel: &str, title: Option<&str>) -> Result<CommandReport> {
    let channel = channel.trim();
    let mut report = CommandReport::new("channels-add");
    if channel.is_empty() {
        report.issue("channel must not be empty");
        return Ok(report);
    }

    let store = open_store()?;
    let mut settings = store.load()?;
    if add_to(&mut settings, channel, title) {
        report.detail(format!("added {channel}"));
    } else {
        report.detail(format!("{channel} is already tracked"));
    }
    store.save(&settings)?;
    Ok(report)
}

fn remove_from(settings: &mut Settings, channel: &str) -> bool {
    let before = settings.default_channels.len();
    settings.default_channels.retain(|c| c != channel);
    let tracked = settings.default_channels.len() != before;
    let titled = settings.channel_titles.remove(channel).is_some();
    tracked || titled
}

pub fn remove(channel: &str) -> Result<CommandReport> {
    let channel = channel.trim();
    let store = open_store()?;
    let mut settings = store.load()?;
    let mut report = CommandReport::new("channels-remove");

    let listed = remove_from(&mut settings, channel);
    if listed {
        store.save(&settings)?;
    }
    let checkpoint = store.remove_checkpoint(channel)?;
    if !listed && checkpoint.is_none() {
        report.issue(format!("{channel} is not tracked"));
        return Ok(report);
    }

    report.detail(format!("removed {channel}"));
    if let Some(checkpoint) = checkpoint {
        report.detail(format!(
            "forgot checkpoint at message {}",
            checkpoint.last_message_id
        ));
    }
    Ok(report)
}

fn apply_selection(settings: &mut Settings, rows: &[ChoiceRow], picked: &[usize]) {
    let channels = channel_rows(rows);
    settings.default_channels = picked
        .iter()
        .filter_map(|i| channels.get(*i))
        .map(|(value, _, _)| value.to_string())
        .collect();
    for i in picked {
        if let Some((value, title, _)) = channels.get(*i)
            && !title.trim().is_empty()
        {
            settings
                .channel_titles
                .insert(value.to_string(), title.to_string());
        }
    }
}

fn print_rows(rows: &[ChoiceRow]) {
    let mut n = 0;
    for row in rows {
        match row {
            ChoiceRow::Separator(name) => println!("--- {name} ---"),
            ChoiceRow::Channel { name, enabled, .. } => {
                n += 1;
                let mark = if *enabled { "x" } else { " " };
                println!("{n:>3}. [{mark}] {name}");
            }
        }
    }
}

pub fn manage() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let store = ConfigStore::new(&paths.config_file);
    let mut settings = store.load()?;
    let credentials = resolve_credentials()?;
    let transport = BridgeTransport::resolve(credentials, paths.session_file.clone())?;

    let dialogs = transport.list_channels()?;
    let folders = transport.list_folders()?;
    let rows = prepare_channel_choices(&dialogs, &folders, &settings.default_channels);
    let mut report = CommandReport::new("channels-manage");
    if rows.is_empty() {
        report.detail("no channels or groups visible to this account");
        return Ok(report);
    }

    print_rows(&rows);
    eprint!("Select channels to track (comma-separated numbers, blank keeps current, `none` clears): ");
    io::stderr().flush().ok();
    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .context("failed to read selection from stdin")?;

    let count = channel_rows(&rows).len();
    let Some(picked) = parse_selection(&input, count)? else {
        report.detail("selection unchanged");
        return Ok(report);
    };

    apply_selection(&mut settings, &rows, &picked);
    store.save(&settings)?;
    report.detail(format!(
        "Success: tracking {} channel(s): {}",
        settings.default_channels.len(),
        settings.default_channels.join(", ")
    ));
    Ok(report)
}
