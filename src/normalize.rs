//! Observation normalizer.
//!
//! Groups polls by site and projects their UTC timestamps into each site's
//! local timezone, producing chronologically ordered observations.

use std::collections::{BTreeMap, HashMap};

use chrono_tz::Tz;

use crate::error::DataError;
use crate::model::{LocalizedObservation, Poll};

/// Site to IANA timezone name.
#[derive(Debug, Clone, Default)]
pub struct TimezoneMap {
    zones: HashMap<String, String>,
}

impl TimezoneMap {
    pub fn new(zones: HashMap<String, String>) -> Self {
        Self { zones }
    }

    pub fn insert(&mut self, site_id: impl Into<String>, timezone: impl Into<String>) {
        self.zones.insert(site_id.into(), timezone.into());
    }

    /// Resolve the timezone for a site.
    ///
    /// A site without an entry is UTC. A site whose entry is not a known
    /// timezone name is an error.
    pub fn resolve(&self, site_id: &str) -> Result<Tz, DataError> {
        match self.zones.get(site_id) {
            None => Ok(Tz::UTC),
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| DataError::UnknownTimezone {
                    site_id: site_id.to_string(),
                    timezone: name.clone(),
                }),
        }
    }
}

/// All observations of one site, oldest first.
#[derive(Debug, Clone)]
pub struct SiteObservations {
    pub site_id: String,
    pub timezone: Tz,
    pub observations: Vec<LocalizedObservation>,
}

/// Output of [`normalize`].
#[derive(Debug, Default)]
pub struct Normalized {
    /// Sites keyed by id, so iteration order is stable.
    pub sites: BTreeMap<String, SiteObservations>,
    /// Sites that were dropped, with the reason.
    pub errors: Vec<DataError>,
}

/// Localize and order polls per site.
///
/// Observations with equal timestamps keep their input order.
pub fn normalize(polls: &[Poll], timezones: &TimezoneMap) -> Normalized {
    let mut grouped: BTreeMap<&str, Vec<&Poll>> = BTreeMap::new();
    for poll in polls {
        grouped.entry(poll.site_id.as_str()).or_default().push(poll);
    }

    let mut normalized = Normalized::default();

    for (site_id, site_polls) in grouped {
        let timezone = match timezones.resolve(site_id) {
            Ok(tz) => tz,
            Err(e) => {
                normalized.errors.push(e);
                continue;
            }
        };

        let mut observations: Vec<LocalizedObservation> = site_polls
            .into_iter()
            .map(|poll| LocalizedObservation {
                site_id: poll.site_id.clone(),
                active: poll.active,
                local_timestamp: poll.timestamp_utc.with_timezone(&timezone),
            })
            .collect();

        // Stable sort keeps input order on ties.
        observations.sort_by_key(|obs| obs.local_timestamp);

        normalized.sites.insert(
            site_id.to_string(),
            SiteObservations {
                site_id: site_id.to_string(),
                timezone,
                observations,
            },
        );
    }

    normalized
}
