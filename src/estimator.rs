//! Uptime/downtime estimation.
//!
//! Polls are sparse, so the status seen at one poll is carried forward until
//! the next poll. For every consecutive pair of observations the elapsed time
//! is clipped to the trailing window and to the business hours of the later
//! observation's local day, then credited to uptime (earlier poll active) or
//! downtime (earlier poll inactive). Time before the first poll and after the
//! last poll is not attributed.
//!
//! Results are expressed in each window's unit (minutes for the last hour,
//! hours for the last day and week) and capped at the window's capacity.

use std::collections::BTreeMap;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::model::{SiteMetrics, Window, WindowTotals};
use crate::normalize::SiteObservations;
use crate::schedule::{BusinessHours, LocalInterval};

/// Estimate metrics for every site, ordered by site id.
///
/// `now` is fixed for the whole run so all sites share the same windows.
pub fn estimate(
    sites: &BTreeMap<String, SiteObservations>,
    hours: &BusinessHours,
    now: DateTime<Utc>,
) -> Vec<SiteMetrics> {
    sites
        .values()
        .map(|site| estimate_site(site, hours, now))
        .collect()
}

/// Estimate metrics for one site.
pub fn estimate_site(
    site: &SiteObservations,
    hours: &BusinessHours,
    now: DateTime<Utc>,
) -> SiteMetrics {
    let tz = site.timezone;
    let now_local = now.with_timezone(&tz);
    let window_starts: Vec<(Window, DateTime<Tz>)> = Window::ALL
        .iter()
        .map(|&w| (w, (now - w.duration()).with_timezone(&tz)))
        .collect();

    let mut uptime = WindowTotals::default();
    let mut downtime = WindowTotals::default();

    for pair in site.observations.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        let business = business_intervals_on(
            tz,
            curr.local_timestamp.date_naive(),
            hours.intervals_for(&site.site_id, curr.local_timestamp.weekday()),
        );

        for &(window, window_start) in &window_starts {
            let segment_start = prev.local_timestamp.max(window_start);
            let segment_end = curr.local_timestamp.min(now_local);
            if segment_end <= segment_start {
                continue;
            }

            let covered = overlap(segment_start, segment_end, &business);
            let increment = as_seconds(covered) / as_seconds(window.unit());

            if prev.active {
                uptime.add(window, increment);
            } else {
                downtime.add(window, increment);
            }
        }
    }

    SiteMetrics {
        site_id: site.site_id.clone(),
        uptime: uptime.capped(),
        downtime: downtime.capped(),
    }
}

/// Summed overlap of `[start, end]` with each interval.
///
/// Intervals are not merged: overlapping intervals count twice.
pub fn overlap(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    intervals: &[(DateTime<Tz>, DateTime<Tz>)],
) -> TimeDelta {
    intervals
        .iter()
        .map(|&(open, close)| {
            let covered = end.min(close) - start.max(open);
            covered.max(TimeDelta::zero())
        })
        .fold(TimeDelta::zero(), |acc, d| acc + d)
}

/// Pin wall-clock business intervals to concrete instants on a local date.
pub fn business_intervals_on(
    tz: Tz,
    date: NaiveDate,
    intervals: &[LocalInterval],
) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    intervals
        .iter()
        .map(|iv| {
            (
                resolve_local(tz, date.and_time(iv.start), Edge::Start),
                resolve_local(tz, date.and_time(iv.end), Edge::End),
            )
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Edge {
    Start,
    End,
}

/// Map a local wall-clock time to an instant.
///
/// Repeated times (fall back) resolve to the earlier instant for interval
/// starts and the later one for interval ends. Skipped times (spring
/// forward) use the offset in force before the transition.
fn resolve_local(tz: Tz, naive: NaiveDateTime, edge: Edge) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, latest) => match edge {
            Edge::Start => earliest,
            Edge::End => latest,
        },
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - TimeDelta::days(1)))
                .fix();
            let utc = naive - TimeDelta::seconds(i64::from(before.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}

fn as_seconds(d: TimeDelta) -> f64 {
    d.num_seconds() as f64 + f64::from(d.subsec_nanos()) / 1e9
}
