//! Error types for the report pipeline.
//!
//! Errors fall into two groups:
//!
//! - [`DataError`]: a single row or site carries bad data. The offending row or
//!   site is skipped and the rest of the report is still produced.
//! - [`ReportError`]: a stage of the pipeline could not run at all. The job
//!   ends in the `failed` state carrying the error message.

use thiserror::Error;

/// A data-quality problem confined to one row or one site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// The site's configured timezone is not a known IANA name.
    ///
    /// Only *invalid* names produce this; a site with no timezone entry at
    /// all is treated as UTC.
    #[error("site '{site_id}' has unknown timezone '{timezone}'")]
    UnknownTimezone { site_id: String, timezone: String },

    /// A poll timestamp could not be parsed.
    #[error("site '{site_id}' has malformed poll timestamp '{value}'")]
    MalformedTimestamp { site_id: String, value: String },

    /// A poll status was neither `active` nor `inactive`.
    #[error("site '{site_id}' has unknown poll status '{value}'")]
    UnknownStatus { site_id: String, value: String },

    /// A business-hours row had an out-of-range weekday or unparsable time.
    #[error("site '{site_id}' has malformed business hours: {reason}")]
    MalformedBusinessHours { site_id: String, reason: String },
}

impl DataError {
    /// The site the problem belongs to.
    pub fn site_id(&self) -> &str {
        match self {
            DataError::UnknownTimezone { site_id, .. }
            | DataError::MalformedTimestamp { site_id, .. }
            | DataError::UnknownStatus { site_id, .. }
            | DataError::MalformedBusinessHours { site_id, .. } => site_id,
        }
    }
}

/// Failures of the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no artifact stored under key '{0}'")]
    NotFound(String),

    #[error("an artifact is already stored under key '{0}'")]
    AlreadyExists(String),

    #[error("artifact backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// A failure that stops a report job.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("data source error: {0}")]
    DataSource(#[from] sqlx::Error),

    #[error("artifact store error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("report computation failed: {0}")]
    Computation(String),
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReportError::Computation(err.to_string())
    }
}
