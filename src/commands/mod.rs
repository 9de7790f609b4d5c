pub mod channels;
pub mod status;
pub mod summarize;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Structured rows for `--json` output (summaries, channels, checkpoints).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn record(&mut self, row: impl Serialize) {
        match serde_json::to_value(row) {
            Ok(value) => self.records.push(value),
            Err(err) => tracing::warn!(error = %err, "failed to serialize report record"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.ok { 0 } else { 1 }
    }
}
