//! Business-hours schedule model.
//!
//! Each site has up to seven weekday slots (Monday first), each holding the
//! local wall-clock intervals during which uptime and downtime count. Sites
//! or weekdays without configuration are open all day.

use std::collections::HashMap;

use chrono::{NaiveTime, TimeDelta, Weekday};

use crate::error::DataError;
use crate::model::BusinessHoursRecord;

/// A wall-clock interval within one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl LocalInterval {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `[00:00:00, 23:59:59.999999]`.
    pub fn all_day() -> Self {
        // Subtraction wraps around midnight.
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN - TimeDelta::microseconds(1),
        }
    }
}

/// Business hours for every configured site.
#[derive(Debug, Clone)]
pub struct BusinessHours {
    sites: HashMap<String, [Vec<LocalInterval>; 7]>,
    all_day: [LocalInterval; 1],
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self::new()
    }
}

impl BusinessHours {
    /// An empty schedule: every site is open all day.
    pub fn new() -> Self {
        Self {
            sites: HashMap::new(),
            all_day: [LocalInterval::all_day()],
        }
    }

    /// Build a schedule from stored rows.
    ///
    /// Malformed rows are returned alongside the schedule and otherwise ignored.
    pub fn from_records(records: &[BusinessHoursRecord]) -> (Self, Vec<DataError>) {
        let mut hours = Self::new();
        let mut errors = Vec::new();

        for record in records {
            match parse_record(record) {
                Ok((weekday, interval)) => hours.insert(&record.site_id, weekday, interval),
                Err(e) => errors.push(e),
            }
        }

        (hours, errors)
    }

    /// Add an open interval for a site on a weekday.
    pub fn insert(&mut self, site_id: &str, weekday: Weekday, interval: LocalInterval) {
        let days = self
            .sites
            .entry(site_id.to_string())
            .or_insert_with(|| std::array::from_fn(|_| Vec::new()));
        days[weekday.num_days_from_monday() as usize].push(interval);
    }

    /// Open intervals for a site on a weekday, in insertion order.
    ///
    /// Falls back to a single all-day interval when nothing is configured.
    /// Overlapping intervals are returned as given.
    pub fn intervals_for(&self, site_id: &str, weekday: Weekday) -> &[LocalInterval] {
        match self.sites.get(site_id) {
            Some(days) if !days[weekday.num_days_from_monday() as usize].is_empty() => {
                &days[weekday.num_days_from_monday() as usize]
            }
            _ => &self.all_day,
        }
    }

    /// Number of sites with at least one configured interval.
    pub fn configured_sites(&self) -> usize {
        self.sites.len()
    }
}

fn parse_record(record: &BusinessHoursRecord) -> Result<(Weekday, LocalInterval), DataError> {
    let malformed = |reason: String| DataError::MalformedBusinessHours {
        site_id: record.site_id.clone(),
        reason,
    };

    let weekday = u8::try_from(record.day_of_week)
        .ok()
        .and_then(|d| Weekday::try_from(d).ok())
        .ok_or_else(|| malformed(format!("weekday {} out of range", record.day_of_week)))?;

    let start = parse_local_time(&record.start_time_local)
        .ok_or_else(|| malformed(format!("bad start time '{}'", record.start_time_local)))?;
    let end = parse_local_time(&record.end_time_local)
        .ok_or_else(|| malformed(format!("bad end time '{}'", record.end_time_local)))?;

    Ok((weekday, LocalInterval::new(start, end)))
}

fn parse_local_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}
