use crate::teleshell::paths::TeleshellPaths;
use crate::teleshell::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub command: String,
    pub channel: Option<String>,
    pub status: String,
    pub message: String,
}

pub fn audit_log_path(paths: &TeleshellPaths) -> PathBuf {
    paths.logs_dir.join("audit.log")
}

pub fn append_event(
    paths: &TeleshellPaths,
    command: &str,
    channel: Option<&str>,
    status: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        command: command.to_string(),
        channel: channel.map(ToOwned::to_owned),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(paths);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teleshell::paths::test_paths;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());

        append_event(&paths, "summarize", Some("@news"), "summarized", "3 messages").expect("one");
        append_event(&paths, "summarize", None, "done", "1 channel").expect("two");

        let raw = fs::read_to_string(audit_log_path(&paths)).expect("read");
        let lines: Vec<Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["channel"], "@news");
        assert_eq!(lines[0]["status"], "summarized");
        assert!(lines[1]["channel"].is_null());
    }
}
