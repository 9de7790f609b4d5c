use std::env;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/teleshell_env_allowlist.rs"));

fn fallback_dotenv_path(
    teleshell_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(base) = teleshell_home {
        return Some(base.join(".env"));
    }
    Some(home_dir?.join(".teleshell/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("TELESHELL_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

/// `TELESHELL_*` variables referenced by the source that are currently set.
pub fn active_overrides() -> Vec<(String, String)> {
    GENERATED_TELESHELL_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| match env::var(key) {
            Ok(v) if !v.trim().is_empty() => Some((key.to_string(), v)),
            _ => None,
        })
        .collect()
}

pub fn build_id() -> &'static str {
    env!("BUILD_UUID")
}
