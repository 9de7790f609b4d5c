use crate::teleshell::checkpoint::{self, CheckpointAdvance};
use crate::teleshell::config::{ConfigStore, RunOptions};
use crate::teleshell::coverage::Coverage;
use crate::teleshell::summarizer::{Summarizer, SummaryRequest, SummaryResult};
use crate::teleshell::transport::Transport;
use crate::teleshell::window::{self, PlanError, TimeWindow};
use anyhow::Result;
use chrono::{DateTime, TimeZone};
use serde::Serialize;

/// A channel that was fetched, summarized and checkpointed.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub label: String,
    pub window: String,
    pub period: String,
    pub covered: usize,
    pub retrieved: usize,
    pub truncated: bool,
    pub newest_id: i64,
    pub previous_checkpoint: Option<i64>,
    pub checkpoint_advanced: bool,
    pub summary: SummaryResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Plan,
    Fetch,
    Summarize,
}

impl FailureStage {
    pub fn label(self) -> &'static str {
        match self {
            FailureStage::Plan => "plan",
            FailureStage::Fetch => "fetch",
            FailureStage::Summarize => "summarize",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChannelOutcome {
    Summarized(Box<ChannelSummary>),
    NothingNew { window: String },
    SkippedNoCheckpoint,
    Failed { stage: FailureStage, reason: String },
}

impl ChannelOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ChannelOutcome::Summarized(_) => "summarized",
            ChannelOutcome::NothingNew { .. } => "nothing_new",
            ChannelOutcome::SkippedNoCheckpoint => "skipped",
            ChannelOutcome::Failed { .. } => "failed",
        }
    }
}

/// Collaborators shared by every channel of one run.
pub struct Pipeline<'a> {
    pub store: &'a ConfigStore,
    pub options: &'a RunOptions,
    pub transport: &'a dyn Transport,
    pub summarizer: &'a dyn Summarizer,
}

impl Pipeline<'_> {
    /// Plan, fetch, summarize, then advance the checkpoint for one channel.
    ///
    /// Transport and summarization failures come back as
    /// [`ChannelOutcome::Failed`] with the checkpoint untouched. An `Err` means
    /// the config document could not be read or written and the run must stop.
    pub fn process_channel<Tz: TimeZone>(
        &self,
        channel: &str,
        directive: TimeWindow,
        now: &DateTime<Tz>,
    ) -> Result<ChannelOutcome> {
        let settings = self.store.load()?;

        let fetch_window =
            match window::plan(channel, directive, &settings, self.options.fetch_limit, now) {
                Ok(w) => w,
                Err(PlanError::MissingCheckpoint { .. }) => {
                    tracing::info!(channel, "no checkpoint; skipping since_last_run");
                    return Ok(ChannelOutcome::SkippedNoCheckpoint);
                }
                Err(err) => {
                    return Ok(ChannelOutcome::Failed {
                        stage: FailureStage::Plan,
                        reason: err.to_string(),
                    });
                }
            };
        let window_label = fetch_window.describe();
        tracing::debug!(channel, window = %window_label, cap = fetch_window.cap, "fetching");

        let mut messages = match self.transport.fetch(channel, &fetch_window) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(channel, error = %format!("{err:#}"), "fetch failed");
                return Ok(ChannelOutcome::Failed {
                    stage: FailureStage::Fetch,
                    reason: format!("{err:#}"),
                });
            }
        };
        if let Some(floor) = fetch_window.id_floor() {
            let before = messages.len();
            messages.retain(|m| m.id > floor);
            if messages.len() != before {
                tracing::warn!(
                    channel,
                    floor,
                    dropped = before - messages.len(),
                    "transport returned messages at or below the checkpoint"
                );
            }
        }

        let Some(coverage) = Coverage::from_retrieved(messages, fetch_window.nominal_limit())
        else {
            tracing::info!(channel, window = %window_label, "no new messages");
            return Ok(ChannelOutcome::NothingNew {
                window: window_label,
            });
        };
        if coverage.truncated {
            tracing::warn!(
                channel,
                covered = coverage.covered_count(),
                dropped = coverage.dropped_count(),
                "fetch hit the limit; oldest messages left out of this summary"
            );
        }

        let label = settings.channel_label(channel).to_string();
        let period = coverage.period_label();
        let request = SummaryRequest {
            messages: &coverage.messages,
            channel_label: &label,
            time_period: period.clone(),
            length: &settings.summary_config.length,
            template: settings.summary_template(),
        };
        let summary = match self.summarizer.summarize(&request) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(channel, kind = err.kind(), error = %err, "summarization failed");
                return Ok(ChannelOutcome::Failed {
                    stage: FailureStage::Summarize,
                    reason: err.to_string(),
                });
            }
        };

        // A failed write must not lose the generated text.
        let advance = checkpoint::advance(self.store, channel, &coverage).map_err(|err| {
            err.context(format!(
                "summary of {label} was generated but its checkpoint was not saved:\n{}",
                summary.text
            ))
        })?;
        let (previous_checkpoint, checkpoint_advanced) = match advance {
            CheckpointAdvance::Advanced { previous, .. } => (previous, true),
            CheckpointAdvance::Unchanged(existing) => (Some(existing.last_message_id), false),
        };

        Ok(ChannelOutcome::Summarized(Box::new(ChannelSummary {
            channel: channel.to_string(),
            label,
            window: window_label,
            period,
            covered: coverage.covered_count(),
            retrieved: coverage.retrieved,
            truncated: coverage.truncated,
            newest_id: coverage.newest().id,
            previous_checkpoint,
            checkpoint_advanced,
            summary,
        })))
    }
}
