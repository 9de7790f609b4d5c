use crate::error::TeleshellError;
use crate::teleshell::config::Settings;
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SINCE_LAST_RUN: &str = "since_last_run";

/// A user-supplied time-window directive, parsed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    SinceLastRun,
    Hours(u32),
    Days(u32),
    Today,
    Yesterday,
}

impl FromStr for TimeWindow {
    type Err = TeleshellError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        let invalid = || TeleshellError::InvalidTimeWindow(raw.to_string());
        match s {
            SINCE_LAST_RUN => Ok(TimeWindow::SinceLastRun),
            "today" => Ok(TimeWindow::Today),
            "yesterday" => Ok(TimeWindow::Yesterday),
            _ => {
                if let Some(n) = s.strip_suffix('h') {
                    return parse_count(n).map(TimeWindow::Hours).ok_or_else(invalid);
                }
                if let Some(n) = s.strip_suffix('d') {
                    return parse_count(n).map(TimeWindow::Days).ok_or_else(invalid);
                }
                Err(invalid())
            }
        }
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::SinceLastRun => f.write_str(SINCE_LAST_RUN),
            TimeWindow::Hours(n) => write!(f, "{n}h"),
            TimeWindow::Days(n) => write!(f, "{n}d"),
            TimeWindow::Today => f.write_str("today"),
            TimeWindow::Yesterday => f.write_str("yesterday"),
        }
    }
}

/// Lower bound of a fetch. One or the other, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFloor {
    /// Strictly newer than this message id.
    AfterId(i64),
    /// At or after this instant, scanned oldest-first.
    Since(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub floor: FetchFloor,
    pub cap: usize,
}

impl FetchWindow {
    /// The limit the caller asked for; `cap` carries one extra slot so a full
    /// page reveals truncation without a second request.
    pub fn nominal_limit(&self) -> usize {
        self.cap.saturating_sub(1)
    }

    pub fn id_floor(&self) -> Option<i64> {
        match self.floor {
            FetchFloor::AfterId(id) => Some(id),
            FetchFloor::Since(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self.floor {
            FetchFloor::AfterId(id) => format!("last run (ID: {id})"),
            FetchFloor::Since(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("no checkpoint for {channel}; pass an explicit window such as `-t 24h`")]
    MissingCheckpoint { channel: String },
    #[error("local midnight of {date} does not exist in this time zone")]
    UnrepresentableMidnight { date: NaiveDate },
    #[error("time window `{window}` reaches back past the earliest representable date")]
    OutOfRange { window: TimeWindow },
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<FixedOffset>, PlanError> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or(PlanError::UnrepresentableMidnight { date })
}

fn reach_back<Tz: TimeZone>(
    now: &DateTime<Tz>,
    span: Option<Duration>,
    window: TimeWindow,
) -> Result<DateTime<FixedOffset>, PlanError> {
    span.and_then(|span| now.clone().checked_sub_signed(span))
        .map(|dt| dt.fixed_offset())
        .ok_or(PlanError::OutOfRange { window })
}

/// Computes the fetch window for one channel. `now` carries the operator's
/// time zone; calendar directives resolve against it.
pub fn plan<Tz: TimeZone>(
    channel: &str,
    window: TimeWindow,
    settings: &Settings,
    fetch_limit: usize,
    now: &DateTime<Tz>,
) -> Result<FetchWindow, PlanError> {
    let floor = match window {
        TimeWindow::SinceLastRun => match settings.checkpoint(channel) {
            Some(checkpoint) => FetchFloor::AfterId(checkpoint.last_message_id),
            None => {
                return Err(PlanError::MissingCheckpoint {
                    channel: channel.to_string(),
                });
            }
        },
        TimeWindow::Hours(n) => {
            FetchFloor::Since(reach_back(now, Duration::try_hours(i64::from(n)), window)?)
        }
        TimeWindow::Days(n) => {
            FetchFloor::Since(reach_back(now, Duration::try_days(i64::from(n)), window)?)
        }
        TimeWindow::Today => FetchFloor::Since(start_of_day(&now.timezone(), now.date_naive())?),
        TimeWindow::Yesterday => {
            let date = now
                .date_naive()
                .checked_sub_days(Days::new(1))
                .unwrap_or(NaiveDate::MIN);
            FetchFloor::Since(start_of_day(&now.timezone(), date)?)
        }
    };

    Ok(FetchWindow {
        floor,
        cap: fetch_limit.saturating_add(1),
    })
}
