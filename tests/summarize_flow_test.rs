use predicates::prelude::*;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;
use tempfile::tempdir;

fn write_executable(path: &Path, script: &str) {
    fs::write(path, script).expect("write fake bridge");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }
}

const MESSAGES_JSON: &str = r#"[{"id":103,"text":"third","date":"2026-10-18T09:03:00+00:00","sender_id":1},{"id":101,"text":"first","date":"2026-10-18T09:01:00+00:00","sender_id":1},{"id":102,"text":"second","date":"2026-10-18T09:02:00+00:00","sender_id":2}]"#;

fn write_fake_bridge(path: &Path) {
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
if [[ -n "${{TELESHELL_TEST_BRIDGE_LOG:-}}" ]]; then
  printf "%s\n" "$*" >> "${{TELESHELL_TEST_BRIDGE_LOG}}"
fi
if [[ "${{1:-}}" == "fetch" ]]; then
  echo '{MESSAGES_JSON}'
  exit 0
fi
echo "unsupported: $*" >&2
exit 2
"#
    );
    write_executable(path, &script);
}

fn write_peer_id_rejecting_bridge(path: &Path) {
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail
printf "%s\n" "$*" >> "${{TELESHELL_TEST_BRIDGE_LOG}}"
if [[ "${{2:-}}" == "--peer-id" ]]; then
  echo "Could not find the input entity for PeerChannel" >&2
  exit 1
fi
echo '{MESSAGES_JSON}'
"#
    );
    write_executable(path, &script);
}

fn write_config(home: &Path, body: &str) {
    fs::create_dir_all(home).expect("mkdir home");
    fs::write(home.join("config.toml"), body).expect("write config");
}

fn checkpoint_id(home: &Path, channel: &str) -> Option<i64> {
    let raw = fs::read_to_string(home.join("config.toml")).expect("read config");
    let doc: toml::Value = toml::from_str(&raw).expect("toml");
    doc.get("checkpoints")?
        .get(channel)?
        .get("last_message_id")?
        .as_integer()
}

fn teleshell(tmp: &Path, home: &Path, bridge: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("teleshell");
    cmd.current_dir(tmp)
        .env("TELESHELL_HOME", home)
        .env("TELESHELL_BRIDGE_BIN", bridge)
        .env("TELESHELL_SUMMARY_PROVIDER", "local")
        .env("TELEGRAM_API_ID", "12345")
        .env("TELEGRAM_API_HASH", "hash")
        .env("TELESHELL_TEST_BRIDGE_LOG", tmp.join("bridge.log"))
        .env_remove("TELESHELL_CONFIG_PATH")
        .env_remove("TELESHELL_FETCH_LIMIT")
        .env_remove("TELESHELL_LOGS_DIR")
        .env_remove("TELESHELL_LOG")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy");
    cmd
}

#[test]
fn summarize_since_last_run_advances_checkpoint() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(
        &home,
        "default_channels = [\"@news\"]\n\n[checkpoints.\"@news\"]\nlast_message_id = 100\nlast_message_date = \"2026-10-18T09:00:00+00:00\"\n",
    );
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .arg("summarize")
        .assert()
        .success()
        .stdout(predicate::str::contains("=== TeleShell Summary: @news ==="))
        .stdout(predicate::str::contains("- third"))
        .stdout(predicate::str::contains("checkpoint 100 -> 103"));

    assert_eq!(checkpoint_id(&home, "@news"), Some(103));
    let log = fs::read_to_string(tmp.path().join("bridge.log")).expect("bridge log");
    assert!(log.contains("fetch --peer @news --limit 1001 --min-id 100"));

    let audit = fs::read_to_string(home.join("logs/audit.log")).expect("audit log");
    assert!(audit.contains("\"status\":\"summarized\""));
}

#[test]
fn truncated_run_records_newest_message() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(
        &home,
        "fetch_limit = 2\n\n[checkpoints.\"@news\"]\nlast_message_id = 100\nlast_message_date = \"2026-10-18T09:00:00+00:00\"\n",
    );
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .args(["summarize", "-c", "@news"])
        .assert()
        .success()
        .stdout(predicate::str::contains("limit reached"))
        .stdout(predicate::str::contains("- first").not());

    assert_eq!(checkpoint_id(&home, "@news"), Some(103));
}

#[test]
fn first_run_needs_explicit_window() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(&home, "default_channels = [\"@news\"]\n");
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .arg("summarize")
        .assert()
        .success()
        .stdout(predicate::str::contains("no checkpoint yet"));
    assert!(!tmp.path().join("bridge.log").exists());
    assert_eq!(checkpoint_id(&home, "@news"), None);

    teleshell(tmp.path(), &home, &bridge)
        .args(["summarize", "-t", "24h"])
        .assert()
        .success();
    assert_eq!(checkpoint_id(&home, "@news"), Some(103));
    let log = fs::read_to_string(tmp.path().join("bridge.log")).expect("bridge log");
    assert!(log.contains("--offset-date"));
    assert!(log.contains("--reverse"));
}

#[test]
fn missing_credentials_abort_before_any_channel() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(&home, "default_channels = [\"@news\"]\n");
    let before = fs::read(home.join("config.toml")).expect("read");
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .env_remove("TELEGRAM_API_ID")
        .env_remove("TELEGRAM_API_HASH")
        .args(["summarize", "-t", "24h"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TELEGRAM_API_ID"))
        .stderr(predicate::str::contains("TELEGRAM_API_HASH"));

    assert!(!tmp.path().join("bridge.log").exists());
    assert_eq!(fs::read(home.join("config.toml")).expect("read"), before);
}

#[test]
fn invalid_time_window_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(&home, "default_channels = [\"@news\"]\n");
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .args(["summarize", "-t", "3weeks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid time window `3weeks`"));
    assert!(!tmp.path().join("bridge.log").exists());
}

#[test]
fn oversized_window_fails_the_channel_without_fetching() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(&home, "default_channels = [\"@news\"]\n");
    let before = fs::read(home.join("config.toml")).expect("read");
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .args(["summarize", "-t", "100000000d"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("@news: plan failed"))
        .stderr(predicate::str::contains("panicked").not());

    assert!(!tmp.path().join("bridge.log").exists());
    assert_eq!(fs::read(home.join("config.toml")).expect("read"), before);
}

#[test]
fn numeric_channel_falls_back_to_generic_reference() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(&home, "");
    let bridge = tmp.path().join("bridge");
    write_peer_id_rejecting_bridge(&bridge);

    teleshell(tmp.path(), &home, &bridge)
        .args(["summarize", "-c", "-1001234567890", "-t", "1d"])
        .assert()
        .success();

    let log = fs::read_to_string(tmp.path().join("bridge.log")).expect("bridge log");
    let calls: Vec<&str> = log.lines().collect();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("fetch --peer-id -1001234567890"));
    assert!(calls[1].starts_with("fetch --peer -1001234567890"));
    assert_eq!(checkpoint_id(&home, "-1001234567890"), Some(103));
}

fn serve_one_response(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
    });
    (format!("http://{addr}"), handle)
}

#[test]
fn summarizer_failure_leaves_config_untouched() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(
        &home,
        "[checkpoints.\"@news\"]\nlast_message_id = 100\nlast_message_date = \"2026-10-18T09:00:00+00:00\"\n",
    );
    let before = fs::read(home.join("config.toml")).expect("read");
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);
    let (base_url, server) =
        serve_one_response("HTTP/1.1 400 Bad Request", r#"{"error":{"message":"bad model"}}"#);

    teleshell(tmp.path(), &home, &bridge)
        .env("TELESHELL_SUMMARY_PROVIDER", "openai-compatible")
        .env("TELESHELL_LLM_BASE_URL", &base_url)
        .env("TELESHELL_LLM_API_KEY", "test-key")
        .env("TELESHELL_LLM_MAX_RETRIES", "0")
        .args(["summarize", "-c", "@news"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("@news: summarize failed"));

    server.join().expect("server thread");
    assert_eq!(fs::read(home.join("config.toml")).expect("read"), before);
}

#[test]
fn openai_compatible_provider_reports_usage() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write_config(
        &home,
        "[checkpoints.\"@news\"]\nlast_message_id = 100\nlast_message_date = \"2026-10-18T09:00:00+00:00\"\n",
    );
    let bridge = tmp.path().join("bridge");
    write_fake_bridge(&bridge);
    let (base_url, server) = serve_one_response(
        "HTTP/1.1 200 OK",
        r#"{"model":"test-model","choices":[{"message":{"content":"Three updates."}}],"usage":{"prompt_tokens":42,"completion_tokens":7}}"#,
    );

    teleshell(tmp.path(), &home, &bridge)
        .env("TELESHELL_SUMMARY_PROVIDER", "openai-compatible")
        .env("TELESHELL_LLM_BASE_URL", &base_url)
        .env("TELESHELL_LLM_API_KEY", "test-key")
        .args(["summarize", "-c", "@news", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"text\": \"Three updates.\""))
        .stdout(predicate::str::contains("\"input_tokens\": 42"));

    server.join().expect("server thread");
    assert_eq!(checkpoint_id(&home, "@news"), Some(103));
}
