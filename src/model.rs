//! Data models for Sitepulse.
//!
//! Raw rows come out of [`crate::storage`] as text records ([`PollRecord`],
//! [`BusinessHoursRecord`]) and are parsed into typed values here. Parsing
//! failures are [`DataError`]s: they cost one row, never the whole report.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Text format of poll timestamps in the data source.
pub const POLL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f UTC";

/// A poll row exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRecord {
    pub site_id: String,
    pub status: String,
    pub timestamp_utc: String,
}

/// A business-hours row exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHoursRecord {
    pub site_id: String,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: i64,
    pub start_time_local: String,
    pub end_time_local: String,
}

/// A single timestamped observation of a site's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub site_id: String,
    pub active: bool,
    pub timestamp_utc: DateTime<Utc>,
}

impl Poll {
    pub fn new(site_id: impl Into<String>, active: bool, timestamp_utc: DateTime<Utc>) -> Self {
        Self {
            site_id: site_id.into(),
            active,
            timestamp_utc,
        }
    }

    /// Parse a stored row into a typed poll.
    pub fn from_record(record: &PollRecord) -> Result<Self, DataError> {
        let active = parse_status(&record.status).ok_or_else(|| DataError::UnknownStatus {
            site_id: record.site_id.clone(),
            value: record.status.clone(),
        })?;

        let timestamp_utc = parse_utc_timestamp(&record.timestamp_utc).ok_or_else(|| {
            DataError::MalformedTimestamp {
                site_id: record.site_id.clone(),
                value: record.timestamp_utc.clone(),
            }
        })?;

        Ok(Self {
            site_id: record.site_id.clone(),
            active,
            timestamp_utc,
        })
    }

    /// Render this poll in the stored text form.
    pub fn to_record(&self) -> PollRecord {
        PollRecord {
            site_id: self.site_id.clone(),
            status: if self.active { "active" } else { "inactive" }.to_string(),
            timestamp_utc: self.timestamp_utc.format(POLL_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

fn parse_status(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "active" => Some(true),
        "inactive" => Some(false),
        _ => None,
    }
}

/// Parse a UTC timestamp as found in the data source.
///
/// Accepts `2023-01-25 18:13:22.479220 UTC` (fraction and suffix optional)
/// as well as RFC 3339.
pub fn parse_utc_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = trimmed
        .strip_suffix("UTC")
        .map(str::trim_end)
        .unwrap_or(trimmed);

    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

/// A poll projected into its site's local civil time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedObservation {
    pub site_id: String,
    pub active: bool,
    pub local_timestamp: DateTime<Tz>,
}

/// One of the three trailing measurement periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
    Week,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Hour, Window::Day, Window::Week];

    /// How far back the window reaches from "now".
    pub fn duration(self) -> TimeDelta {
        match self {
            Window::Hour => TimeDelta::hours(1),
            Window::Day => TimeDelta::days(1),
            Window::Week => TimeDelta::weeks(1),
        }
    }

    /// The unit results are reported in: minutes for the hour window,
    /// hours for day and week.
    pub fn unit(self) -> TimeDelta {
        match self {
            Window::Hour => TimeDelta::minutes(1),
            Window::Day | Window::Week => TimeDelta::hours(1),
        }
    }

    /// Window duration expressed in its own unit. Also the saturation
    /// ceiling for uptime and downtime.
    pub fn capacity(self) -> f64 {
        match self {
            Window::Hour => 60.0,
            Window::Day => 24.0,
            Window::Week => 168.0,
        }
    }
}

/// One value per window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowTotals {
    pub hour: f64,
    pub day: f64,
    pub week: f64,
}

impl WindowTotals {
    pub fn get(&self, window: Window) -> f64 {
        match window {
            Window::Hour => self.hour,
            Window::Day => self.day,
            Window::Week => self.week,
        }
    }

    pub fn add(&mut self, window: Window, amount: f64) {
        match window {
            Window::Hour => self.hour += amount,
            Window::Day => self.day += amount,
            Window::Week => self.week += amount,
        }
    }

    /// Clamp every value into `[0, capacity]` of its window.
    pub fn capped(self) -> Self {
        let cap = |w: Window, v: f64| v.clamp(0.0, w.capacity());
        Self {
            hour: cap(Window::Hour, self.hour),
            day: cap(Window::Day, self.day),
            week: cap(Window::Week, self.week),
        }
    }
}

/// The report row for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMetrics {
    pub site_id: String,
    pub uptime: WindowTotals,
    pub downtime: WindowTotals,
}

/// Externally visible state of a report job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Running,
    Complete { url: String },
    Failed { error: String },
}

/// Response for GET /trigger_report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub job_id: String,
}

/// Request body for POST /get_report.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    #[serde(alias = "report_id")]
    pub job_id: String,
}

/// Query parameters of a signed retrieval link.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: i64,
    pub signature: String,
}
