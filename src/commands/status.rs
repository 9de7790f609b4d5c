use anyhow::Result;
use serde::Serialize;

use crate::commands::CommandReport;
use crate::env_loader::{active_overrides, build_id};
use crate::teleshell::audit::audit_log_path;
use crate::teleshell::config::{ConfigStore, run_options};
use crate::teleshell::paths::resolve_paths;

#[derive(Debug, Serialize)]
struct CheckpointRow<'a> {
    channel: &'a str,
    last_message_id: i64,
    last_message_date: &'a str,
}

fn is_secret(key: &str) -> bool {
    key.ends_with("_KEY") || key.ends_with("_HASH") || key.contains("TOKEN")
}

fn display_override(key: &str, value: &str) -> String {
    if is_secret(key) {
        format!("{key}=<set>")
    } else {
        format!("{key}={value}")
    }
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", build_id()));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("audit_log={}", audit_log_path(&paths).display()));
    report.detail(format!("session_file={}", paths.session_file.display()));

    let store = ConfigStore::new(&paths.config_file);
    let settings = store.load()?;
    let opts = run_options(&settings)?;
    report.detail(format!(
        "summarizer={} model={} fetch_limit={}",
        opts.summarizer.provider,
        opts.summarizer.model_name(),
        opts.fetch_limit
    ));
    report.detail(format!(
        "tracked_channels={}",
        settings.default_channels.len()
    ));

    for (key, value) in active_overrides() {
        report.detail(format!("override {}", display_override(&key, &value)));
    }

    if !paths.session_file.exists() {
        report.detail("no Telegram session yet; the bridge creates one on first login");
    }

    if settings.checkpoints.is_empty() {
        report.detail("no checkpoints recorded");
    }
    for (channel, checkpoint) in &settings.checkpoints {
        report.detail(format!(
            "checkpoint {channel} last_message_id={} last_message_date={}",
            checkpoint.last_message_id, checkpoint.last_message_date
        ));
        report.record(CheckpointRow {
            channel,
            last_message_id: checkpoint.last_message_id,
            last_message_date: &checkpoint.last_message_date,
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_overrides_are_masked() {
        assert_eq!(
            display_override("TELESHELL_LLM_API_KEY", "sk-123"),
            "TELESHELL_LLM_API_KEY=<set>"
        );
        assert_eq!(
            display_override("TELESHELL_FETCH_LIMIT", "50"),
            "TELESHELL_FETCH_LIMIT=50"
        );
    }
}
