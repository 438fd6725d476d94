//! Sitepulse - business-hours uptime and downtime reports for monitored sites.
//!
//! # Overview
//!
//! Sites are polled at irregular intervals and each poll records whether the
//! site was `active` or `inactive`. Sitepulse turns those sparse polls into
//! per-site uptime and downtime over the last hour, day and week, counting
//! only each site's local business hours.
//!
//! Reports are produced asynchronously: a client triggers a job, receives an
//! id immediately, and polls that id until a signed download link is ready.
//!
//! # Modules
//!
//! - [`model`]: Polls, observations, windows and report rows
//! - [`schedule`]: Per-site weekly business hours
//! - [`normalize`]: Timezone localization of polls
//! - [`estimator`]: Uptime/downtime estimation
//! - [`report`]: CSV rendering
//! - [`storage`]: SQLite data source
//! - [`artifacts`]: Report storage and signed retrieval links
//! - [`jobs`]: Report job lifecycle
//! - [`api`]: HTTP API handlers
//! - [`config`]: Environment configuration
//! - [`error`]: Error types

pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod estimator;
pub mod jobs;
pub mod model;
pub mod normalize;
pub mod report;
pub mod schedule;
pub mod storage;
