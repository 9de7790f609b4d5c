use anyhow::Result;
use chrono::Local;

use crate::commands::CommandReport;
use crate::error::TeleshellError;
use crate::telegram::bridge::{BridgeTransport, TelegramCredentials};
use crate::telegram::resolve_credentials;
use crate::teleshell::audit;
use crate::teleshell::config::{ConfigStore, RunOptions, run_options};
use crate::teleshell::paths::{TeleshellPaths, resolve_paths};
use crate::teleshell::pipeline::{ChannelOutcome, ChannelSummary, Pipeline};
use crate::teleshell::summarizer::{api_key_hint, build_summarizer, resolve_api_key};
use crate::teleshell::window::TimeWindow;

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub channels: Vec<String>,
    pub window: String,
    pub json: bool,
}

fn split_channels(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Telegram credentials plus the LLM key the configured provider needs. Every
/// missing variable is reported at once.
fn require_credentials(opts: &RunOptions) -> Result<(TelegramCredentials, Option<String>)> {
    let lookup = |var: &str| std::env::var(var).ok();
    let api_key = resolve_api_key(opts.summarizer.provider, &lookup);

    let mut missing = Vec::new();
    let telegram = match resolve_credentials() {
        Ok(creds) => Some(creds),
        Err(TeleshellError::MissingCredentials(vars)) => {
            missing.extend(vars);
            None
        }
        Err(other) => return Err(other.into()),
    };
    if api_key.is_none()
        && let Some(hint) = api_key_hint(opts.summarizer.provider)
    {
        missing.push(hint.to_string());
    }

    match telegram {
        Some(creds) if missing.is_empty() => Ok((creds, api_key)),
        _ => Err(TeleshellError::MissingCredentials(missing).into()),
    }
}

pub fn render_summary_block(summary: &ChannelSummary) -> String {
    let meta = &summary.summary;
    let mut out = format!("=== TeleShell Summary: {} ===\n", summary.label);
    out.push_str(meta.text.trim_end());
    out.push('\n');
    out.push_str(&format!(
        "--- Analyzed: {} msgs | Range: {} | Model: {} | Tokens: {}in/{}out | Time: {}s\n",
        summary.covered,
        summary.period,
        meta.model,
        meta.input_tokens,
        meta.output_tokens,
        meta.latency_secs
    ));
    out
}

fn audit_outcome(paths: &TeleshellPaths, channel: &str, status: &str, message: &str) {
    if let Err(err) = audit::append_event(paths, "summarize", Some(channel), status, message) {
        tracing::warn!(channel, error = %format!("{err:#}"), "failed to append audit event");
    }
}

fn record_outcome(
    report: &mut CommandReport,
    paths: &TeleshellPaths,
    channel: &str,
    outcome: &ChannelOutcome,
    json: bool,
) {
    match outcome {
        ChannelOutcome::Summarized(summary) => {
            if summary.truncated {
                report.detail(format!(
                    "{channel}: limit reached; summarized the newest {} of {} messages ({} oldest left out)",
                    summary.covered,
                    summary.retrieved,
                    summary.retrieved - summary.covered
                ));
            }
            let checkpoint = if summary.checkpoint_advanced {
                match summary.previous_checkpoint {
                    Some(prev) => format!("checkpoint {prev} -> {}", summary.newest_id),
                    None => format!("checkpoint set to {}", summary.newest_id),
                }
            } else {
                "checkpoint unchanged".to_string()
            };
            let line = format!(
                "{channel}: summarized {} messages since {} ({}); {checkpoint}",
                summary.covered, summary.window, summary.period
            );
            audit_outcome(paths, channel, outcome.status(), &line);
            report.detail(line);
            if json {
                report.record(summary.as_ref());
            } else {
                println!("{}", render_summary_block(summary));
            }
        }
        ChannelOutcome::NothingNew { window } => {
            let line = format!("{channel}: no new messages since {window}");
            audit_outcome(paths, channel, outcome.status(), &line);
            report.detail(line);
        }
        ChannelOutcome::SkippedNoCheckpoint => {
            let line = format!(
                "{channel}: no checkpoint yet; pass a time window (e.g. -t 24h) for the first run"
            );
            audit_outcome(paths, channel, outcome.status(), &line);
            report.detail(line);
        }
        ChannelOutcome::Failed { stage, reason } => {
            let line = format!(
                "{channel}: {} failed: {reason}; checkpoint untouched",
                stage.label()
            );
            audit_outcome(paths, channel, outcome.status(), &line);
            report.issue(line);
        }
    }
}

pub fn run(opts: &SummarizeOptions) -> Result<CommandReport> {
    let directive: TimeWindow = opts.window.parse()?;

    let paths = resolve_paths()?;
    let store = ConfigStore::new(&paths.config_file);
    let settings = store.load()?;
    let run_opts = run_options(&settings)?;

    let mut channels = split_channels(&opts.channels);
    if channels.is_empty() {
        channels = settings.default_channels.clone();
    }
    if channels.is_empty() {
        return Err(TeleshellError::NoChannels(paths.config_file.display().to_string()).into());
    }

    let (credentials, api_key) = require_credentials(&run_opts)?;
    let transport = BridgeTransport::resolve(credentials, paths.session_file.clone())?;
    let summarizer = build_summarizer(&run_opts.summarizer, api_key)?;

    let mut report = CommandReport::new("summarize");
    report.detail(format!(
        "window={directive} fetch_limit={} model={}",
        run_opts.fetch_limit,
        summarizer.model()
    ));

    let pipeline = Pipeline {
        store: &store,
        options: &run_opts,
        transport: &transport,
        summarizer: summarizer.as_ref(),
    };
    let now = Local::now();
    for channel in &channels {
        tracing::info!(channel = %channel, window = %directive, "processing channel");
        let outcome = pipeline.process_channel(channel, directive, &now)?;
        record_outcome(&mut report, &paths, channel, &outcome, opts.json);
    }

    Ok(report)
}
