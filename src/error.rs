use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TeleshellError {
    #[error("missing credentials: set {} (in the environment or .env)", .0.join(", "))]
    MissingCredentials(Vec<String>),
    #[error("invalid time window `{0}`; use since_last_run, today, yesterday, <N>h or <N>d")]
    InvalidTimeWindow(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("no channels given and no default_channels in {0}")]
    NoChannels(String),
}
