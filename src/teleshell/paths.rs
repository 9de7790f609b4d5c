use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TeleshellPaths {
    pub home: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub session_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<TeleshellPaths> {
    let home = match env::var("TELESHELL_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".teleshell"),
    };

    let config_file = env_or_default_path("TELESHELL_CONFIG_PATH", home.join("config.toml"));
    let logs_dir = env_or_default_path("TELESHELL_LOGS_DIR", home.join("logs"));
    let session_file = env_or_default_path("TELESHELL_SESSION_PATH", home.join("telegram.session"));

    Ok(TeleshellPaths {
        home,
        config_file,
        logs_dir,
        session_file,
    })
}

#[cfg(test)]
pub fn test_paths(root: &std::path::Path) -> TeleshellPaths {
    TeleshellPaths {
        home: root.to_path_buf(),
        config_file: root.join("config.toml"),
        logs_dir: root.join("logs"),
        session_file: root.join("telegram.session"),
    }
}
