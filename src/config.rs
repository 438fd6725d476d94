//! Service configuration.
//!
//! Read once at startup from the environment and handed to each component
//! when it is built.

use std::env;

use chrono::TimeDelta;
use tracing::warn;
use uuid::Uuid;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:sitepulse.db?mode=rwc";

/// Default lifetime of a report retrieval link.
pub const DEFAULT_LINK_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Base URL placed in front of retrieval links.
    pub public_url: String,
    /// HMAC key for retrieval links.
    pub signing_secret: Vec<u8>,
    pub link_ttl: TimeDelta,
}

impl Config {
    /// Load configuration from `SITEPULSE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port: u16 = lookup("SITEPULSE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let database_url =
            lookup("SITEPULSE_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let public_url =
            lookup("SITEPULSE_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        let signing_secret = match lookup("SITEPULSE_SIGNING_SECRET") {
            Some(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => {
                warn!("SITEPULSE_SIGNING_SECRET not set; report links will not survive a restart");
                random_secret()
            }
        };

        let link_ttl_secs: i64 = lookup("SITEPULSE_LINK_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_LINK_TTL_SECS);

        Self {
            port,
            database_url,
            public_url,
            signing_secret,
            link_ttl: TimeDelta::seconds(link_ttl_secs),
        }
    }
}

fn random_secret() -> Vec<u8> {
    let mut secret = Uuid::new_v4().as_bytes().to_vec();
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret
}
