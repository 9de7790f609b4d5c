use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "TELESHELL_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "teleshell=debug,warn" } else { "warn" }
}

/// Structured diagnostics go to stderr so summaries on stdout stay clean.
/// `TELESHELL_LOG` takes precedence over the verbosity flag.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_crate_level() {
        assert_eq!(default_directive(false), "warn");
        assert!(default_directive(true).starts_with("teleshell=debug"));
    }
}
