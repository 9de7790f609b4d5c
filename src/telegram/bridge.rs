use crate::teleshell::message::Message;
use crate::teleshell::transport::{Dialog, PeerRef, Transport};
use crate::teleshell::util::run_command_with_optional_timeout;
use crate::teleshell::window::{FetchFloor, FetchWindow};
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BRIDGE_BIN_NAME: &str = "teleshell-bridge";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const MAIN_FOLDER_ID: i64 = 0;
const MAIN_FOLDER_NAME: &str = "Main";

#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub api_id: String,
    pub api_hash: String,
}

/// Talks to Telegram through an external bridge executable that prints JSON
/// on stdout. Login and session persistence are the bridge's business.
#[derive(Debug, Clone)]
pub struct BridgeTransport {
    bin: PathBuf,
    credentials: TelegramCredentials,
    session_file: PathBuf,
    timeout_secs: u64,
}

fn ensure_executable_path(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)
        .with_context(|| format!("bridge binary path does not exist: {}", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("bridge binary path is not a file: {}", path.display());
    }
    Ok(())
}

pub fn resolve_bridge_bin() -> Result<PathBuf> {
    if let Ok(custom) = env::var("TELESHELL_BRIDGE_BIN") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            ensure_executable_path(&path)?;
            return Ok(path);
        }
    }
    which::which(BRIDGE_BIN_NAME)
        .with_context(|| format!("{BRIDGE_BIN_NAME} not found in TELESHELL_BRIDGE_BIN or PATH"))
}

fn bridge_timeout_secs() -> u64 {
    match env::var("TELESHELL_BRIDGE_TIMEOUT_SECS") {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        Err(_) => DEFAULT_TIMEOUT_SECS,
    }
}

impl BridgeTransport {
    pub fn new(bin: PathBuf, credentials: TelegramCredentials, session_file: PathBuf) -> Self {
        Self {
            bin,
            credentials,
            session_file,
            timeout_secs: bridge_timeout_secs(),
        }
    }

    pub fn resolve(credentials: TelegramCredentials, session_file: PathBuf) -> Result<Self> {
        Ok(Self::new(resolve_bridge_bin()?, credentials, session_file))
    }

    fn run(&self, args: &[String]) -> Result<Output> {
        if let Some(parent) = self.session_file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .env("TELEGRAM_API_ID", &self.credentials.api_id)
            .env("TELEGRAM_API_HASH", &self.credentials.api_hash)
            .env("TELESHELL_SESSION_PATH", &self.session_file);
        run_command_with_optional_timeout(&mut cmd, Some(self.timeout_secs))
            .with_context(|| format!("failed to run `{} {}`", self.bin.display(), args.join(" ")))
    }

    fn run_ok(&self, args: &[String]) -> Result<String> {
        let out = self.run(args)?;
        self.stdout_or_failure(args, out)
    }

    fn stdout_or_failure(&self, args: &[String], out: Output) -> Result<String> {
        if out.status.success() {
            return Ok(String::from_utf8_lossy(&out.stdout).to_string());
        }
        anyhow::bail!(
            "bridge command failed: {} {}\nstderr: {}",
            self.bin.display(),
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        )
    }

    /// Fetches by numeric id. When the bridge runs but rejects the integer
    /// form, retries once with the id as a generic reference. Spawn failures
    /// and timeouts are returned as-is.
    fn fetch_numeric(&self, channel: &str, id: i64, window: &FetchWindow) -> Result<String> {
        let by_id = fetch_args("--peer-id", &id.to_string(), window);
        let out = self.run(&by_id)?;
        let rejection = match self.stdout_or_failure(&by_id, out) {
            Ok(raw) => return Ok(raw),
            Err(err) => err,
        };
        tracing::warn!(
            channel,
            error = %format!("{rejection:#}"),
            "bridge rejected numeric peer id; retrying as a generic reference"
        );
        self.run_ok(&fetch_args("--peer", channel.trim(), window))
            .with_context(|| format!("numeric peer id was rejected first ({rejection:#})"))
    }
}

fn floor_args(window: &FetchWindow) -> Vec<String> {
    let mut args = vec!["--limit".to_string(), window.cap.to_string()];
    match window.floor {
        FetchFloor::AfterId(id) => {
            args.push("--min-id".to_string());
            args.push(id.to_string());
        }
        FetchFloor::Since(at) => {
            args.push("--offset-date".to_string());
            args.push(at.to_rfc3339());
            args.push("--reverse".to_string());
        }
    }
    args
}

fn fetch_args(peer_flag: &str, peer: &str, window: &FetchWindow) -> Vec<String> {
    let mut args = vec!["fetch".to_string(), peer_flag.to_string(), peer.to_string()];
    args.extend(floor_args(window));
    args
}

fn items<'a>(root: &'a Value, key: &str) -> Vec<&'a Value> {
    root.as_array()
        .or_else(|| root.get(key).and_then(Value::as_array))
        .map(|arr| arr.iter().collect())
        .unwrap_or_default()
}

fn parse_int(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<FixedOffset>> {
    match value? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim()).ok(),
        Value::Number(n) => Utc
            .timestamp_opt(n.as_i64()?, 0)
            .single()
            .map(|dt| dt.fixed_offset()),
        _ => None,
    }
}

pub fn parse_messages(raw: &str) -> Result<Vec<Message>> {
    let root: Value = serde_json::from_str(raw).context("bridge returned invalid JSON for fetch")?;
    let mut out = Vec::new();
    for item in items(&root, "messages") {
        let Some(id) = parse_int(item.get("id")) else {
            tracing::warn!("bridge message without id skipped");
            continue;
        };
        let Some(timestamp) = parse_timestamp(item.get("date").or_else(|| item.get("timestamp")))
        else {
            tracing::warn!(id, "bridge message without a usable date skipped");
            continue;
        };
        out.push(Message {
            id,
            text: item
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp,
            sender_id: parse_int(item.get("sender_id")),
        });
    }
    Ok(out)
}

pub fn parse_dialogs(raw: &str) -> Result<Vec<Dialog>> {
    let root: Value =
        serde_json::from_str(raw).context("bridge returned invalid JSON for dialogs")?;
    let mut out = Vec::new();
    for item in items(&root, "dialogs") {
        let Some(id) = parse_int(item.get("id")) else {
            continue;
        };
        let handle = item
            .get("handle")
            .or_else(|| item.get("username"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(ToOwned::to_owned);
        out.push(Dialog {
            id,
            title: item
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            handle,
            folder_id: parse_int(item.get("folder_id")).unwrap_or(MAIN_FOLDER_ID),
        });
    }
    Ok(out)
}

pub fn parse_folders(raw: &str) -> Result<BTreeMap<i64, String>> {
    let root: Value =
        serde_json::from_str(raw).context("bridge returned invalid JSON for folders")?;
    let mut out = BTreeMap::new();
    match &root {
        Value::Object(map) => {
            for (key, value) in map {
                if let (Ok(id), Some(name)) = (key.trim().parse::<i64>(), value.as_str()) {
                    out.insert(id, name.to_string());
                }
            }
        }
        Value::Array(_) => {
            for item in items(&root, "folders") {
                let id = parse_int(item.get("id"));
                let name = item
                    .get("name")
                    .or_else(|| item.get("title"))
                    .and_then(Value::as_str);
                if let (Some(id), Some(name)) = (id, name) {
                    out.insert(id, name.to_string());
                }
            }
        }
        _ => {}
    }
    out.entry(MAIN_FOLDER_ID)
        .or_insert_with(|| MAIN_FOLDER_NAME.to_string());
    Ok(out)
}

impl Transport for BridgeTransport {
    fn fetch(&self, channel: &str, window: &FetchWindow) -> Result<Vec<Message>> {
        let raw = match PeerRef::parse(channel) {
            PeerRef::Id(id) => self.fetch_numeric(channel, id, window)?,
            PeerRef::Reference(reference) => {
                self.run_ok(&fetch_args("--peer", &reference, window))?
            }
        };
        parse_messages(&raw)
    }

    fn list_channels(&self) -> Result<Vec<Dialog>> {
        let raw = self.run_ok(&["dialogs".to_string()])?;
        parse_dialogs(&raw)
    }

    fn list_folders(&self) -> Result<BTreeMap<i64, String>> {
        let raw = self.run_ok(&["folders".to_string()])?;
        parse_folders(&raw)
    }
}
