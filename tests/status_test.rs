use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn status_reports_paths_overrides_and_checkpoints() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    fs::create_dir_all(&home).expect("mkdir");
    fs::write(
        home.join("config.toml"),
        "[checkpoints.\"@news\"]\nlast_message_id = 42\nlast_message_date = \"2026-10-18T09:00:00+00:00\"\n",
    )
    .expect("write config");

    assert_cmd::cargo::cargo_bin_cmd!("teleshell")
        .current_dir(tmp.path())
        .env("TELESHELL_HOME", &home)
        .env("TELESHELL_FETCH_LIMIT", "25")
        .env("TELESHELL_SUMMARY_PROVIDER", "local")
        .env("TELESHELL_LLM_API_KEY", "secret-value")
        .env_remove("TELESHELL_CONFIG_PATH")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file="))
        .stdout(predicate::str::contains("summarizer=local model=local fetch_limit=25"))
        .stdout(predicate::str::contains("override TELESHELL_FETCH_LIMIT=25"))
        .stdout(predicate::str::contains("TELESHELL_LLM_API_KEY=<set>"))
        .stdout(predicate::str::contains("secret-value").not())
        .stdout(predicate::str::contains("checkpoint @news last_message_id=42"));

    // Overrides stay in the runtime copy only.
    let raw = fs::read_to_string(home.join("config.toml")).expect("read");
    assert!(!raw.contains("fetch_limit = 25"));
}

#[test]
fn first_status_writes_default_config() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");

    assert_cmd::cargo::cargo_bin_cmd!("teleshell")
        .current_dir(tmp.path())
        .env("TELESHELL_HOME", &home)
        .env_remove("TELESHELL_CONFIG_PATH")
        .env_remove("TELESHELL_SUMMARY_PROVIDER")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no checkpoints recorded"));

    let raw = fs::read_to_string(home.join("config.toml")).expect("default config");
    assert!(raw.contains("fetch_limit = 1000"));
    assert!(raw.contains("default_summary"));
}
