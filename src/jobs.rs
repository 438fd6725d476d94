//! Report job controller.
//!
//! A job moves `Running -> Complete` or `Running -> Failed`. Triggering
//! registers the job and spawns the pipeline on its own task, so the caller
//! gets the id back immediately. Each run executes its stages in order:
//!
//! 1. fetch a snapshot from [`Storage`]
//! 2. parse polls and business hours
//! 3. localize observations
//! 4. estimate uptime and downtime
//! 5. render CSV
//! 6. publish to the [`ArtifactStore`] under the job id
//!
//! Steps 2 to 5 are CPU-only and run on a blocking worker. Rows or sites with
//! bad data are skipped with a warning; any other failure marks the job failed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, LinkSigner};
use crate::error::{DataError, ReportError};
use crate::estimator::estimate;
use crate::model::{Poll, ReportStatus};
use crate::normalize::{TimezoneMap, normalize};
use crate::report::{REPORT_CONTENT_TYPE, render_csv};
use crate::schedule::BusinessHours;
use crate::storage::{Snapshot, Storage};

/// Lifecycle state of a job known to this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Complete,
    Failed { error: String },
}

/// What a finished pipeline produced.
#[derive(Debug)]
pub struct ReportOutput {
    pub csv: String,
    pub sites: usize,
    pub data_errors: Vec<DataError>,
}

/// Creates report jobs and answers status queries.
#[derive(Clone)]
pub struct ReportJobs {
    storage: Storage,
    artifacts: Arc<dyn ArtifactStore>,
    signer: LinkSigner,
    registry: Arc<RwLock<HashMap<String, JobState>>>,
}

impl ReportJobs {
    pub fn new(storage: Storage, artifacts: Arc<dyn ArtifactStore>, signer: LinkSigner) -> Self {
        Self {
            storage,
            artifacts,
            signer,
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a new report in the background and return its id.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.registry
            .write()
            .insert(job_id.clone(), JobState::Running);

        let jobs = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            jobs.run_at(&id, Utc::now()).await;
        });

        info!(job_id = %job_id, "Report job triggered");
        job_id
    }

    /// Run the pipeline for `job_id` with a fixed "now" and record the outcome.
    ///
    /// An id that already failed, or whose report is already published, is
    /// not run again; its current state is returned instead.
    #[instrument(skip(self))]
    pub async fn run_at(&self, job_id: &str, now: DateTime<Utc>) -> JobState {
        if let Some(failed @ JobState::Failed { .. }) = self.state(job_id) {
            warn!(job_id = %job_id, "Job already failed, not re-running");
            return failed;
        }

        if self.is_published(job_id).await {
            warn!(job_id = %job_id, "Report already published, not re-running");
            self.registry.write().remove(job_id);
            return JobState::Complete;
        }

        self.registry
            .write()
            .insert(job_id.to_string(), JobState::Running);

        let state = match self.generate(job_id, now).await {
            Ok(output) => {
                info!(
                    job_id = %job_id,
                    sites = output.sites,
                    skipped = output.data_errors.len(),
                    "Report published"
                );
                JobState::Complete
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Report job failed");
                JobState::Failed {
                    error: e.to_string(),
                }
            }
        };

        // The artifact store records completion; only failures stay here.
        let mut registry = self.registry.write();
        match &state {
            JobState::Failed { .. } => {
                registry.insert(job_id.to_string(), state.clone());
            }
            _ => {
                registry.remove(job_id);
            }
        }

        state
    }

    async fn generate(&self, job_id: &str, now: DateTime<Utc>) -> Result<ReportOutput, ReportError> {
        let snapshot = self.storage.fetch_snapshot().await?;
        info!(
            job_id = %job_id,
            polls = snapshot.polls.len(),
            timezones = snapshot.timezones.len(),
            business_hours = snapshot.business_hours.len(),
            "Snapshot fetched"
        );

        let output = tokio::task::spawn_blocking(move || build_report(snapshot, now)).await?;

        for e in &output.data_errors {
            warn!(site_id = %e.site_id(), error = %e, "Skipped bad data");
        }

        self.artifacts
            .put(job_id, REPORT_CONTENT_TYPE, output.csv.clone().into_bytes())
            .await?;

        Ok(output)
    }

    /// The externally visible status of a job.
    ///
    /// A published artifact always reads as complete. Ids this process has
    /// never seen read as running.
    pub async fn status(&self, job_id: &str) -> ReportStatus {
        if self.is_published(job_id).await {
            return ReportStatus::Complete {
                url: self.signer.sign(job_id, Utc::now()),
            };
        }

        match self.state(job_id) {
            Some(JobState::Failed { error }) => ReportStatus::Failed { error },
            _ => ReportStatus::Running,
        }
    }

    async fn is_published(&self, job_id: &str) -> bool {
        match self.artifacts.exists(job_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Artifact lookup failed");
                false
            }
        }
    }

    /// The registry entry for a job: running or failed jobs of this process.
    ///
    /// Completed jobs are dropped once their report is published.
    pub fn state(&self, job_id: &str) -> Option<JobState> {
        self.registry.read().get(job_id).cloned()
    }

    /// Number of jobs currently held in the registry.
    pub fn tracked_jobs(&self) -> usize {
        self.registry.read().len()
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn signer(&self) -> &LinkSigner {
        &self.signer
    }
}

/// Turn a snapshot into a CSV report.
pub fn build_report(snapshot: Snapshot, now: DateTime<Utc>) -> ReportOutput {
    let mut data_errors = Vec::new();

    let polls: Vec<Poll> = snapshot
        .polls
        .iter()
        .filter_map(|record| match Poll::from_record(record) {
            Ok(poll) => Some(poll),
            Err(e) => {
                data_errors.push(e);
                None
            }
        })
        .collect();

    let (hours, hour_errors) = BusinessHours::from_records(&snapshot.business_hours);
    data_errors.extend(hour_errors);

    let normalized = normalize(&polls, &TimezoneMap::new(snapshot.timezones));
    data_errors.extend(normalized.errors);

    let rows = estimate(&normalized.sites, &hours, now);

    ReportOutput {
        csv: render_csv(&rows),
        sites: rows.len(),
        data_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Artifact, SqliteArtifactStore};
    use crate::error::ArtifactError;
    use crate::model::{BusinessHoursRecord, PollRecord};
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone};

    /// 2023-01-23 is a Monday.
    fn mon(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 23, h, m, 0).unwrap()
    }

    fn signer() -> LinkSigner {
        LinkSigner::new("test", "http://localhost", TimeDelta::hours(1))
    }

    async fn setup() -> ReportJobs {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let artifacts = SqliteArtifactStore::new(storage.pool().clone())
            .await
            .unwrap();
        ReportJobs::new(storage, Arc::new(artifacts), signer())
    }

    struct BrokenStore;

    #[async_trait]
    impl ArtifactStore for BrokenStore {
        async fn exists(&self, _key: &str) -> Result<bool, ArtifactError> {
            Ok(false)
        }

        async fn put(&self, key: &str, _: &str, _: Vec<u8>) -> Result<(), ArtifactError> {
            Err(ArtifactError::AlreadyExists(key.to_string()))
        }

        async fn get(&self, key: &str) -> Result<Artifact, ArtifactError> {
            Err(ArtifactError::NotFound(key.to_string()))
        }
    }

    #[test]
    fn test_build_report_skips_bad_rows() {
        let snapshot = Snapshot {
            polls: vec![
                Poll::new("s", true, mon(10, 0)).to_record(),
                PollRecord {
                    site_id: "s".to_string(),
                    status: "active".to_string(),
                    timestamp_utc: "garbage".to_string(),
                },
                Poll::new("s", false, mon(11, 0)).to_record(),
                Poll::new("bad-tz", true, mon(10, 0)).to_record(),
            ],
            timezones: HashMap::from([("bad-tz".to_string(), "Nowhere/Land".to_string())]),
            business_hours: vec![BusinessHoursRecord {
                site_id: "s".to_string(),
                day_of_week: 0,
                start_time_local: "09:00:00".to_string(),
                end_time_local: "17:00:00".to_string(),
            }],
        };

        let output = build_report(snapshot, mon(11, 30));

        assert_eq!(output.sites, 1);
        assert_eq!(output.data_errors.len(), 2);
        let lines: Vec<&str> = output.csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "s,30.0000,1.0000,1.0000,0.0000,0.0000,0.0000");
    }

    #[tokio::test]
    async fn test_unknown_job_reads_running() {
        let jobs = setup().await;
        assert_eq!(jobs.status("never-created").await, ReportStatus::Running);
        assert_eq!(jobs.state("never-created"), None);
    }

    #[tokio::test]
    async fn test_run_publishes_artifact() {
        let jobs = setup().await;
        jobs.storage
            .insert_poll(&Poll::new("s", true, mon(10, 0)))
            .await
            .unwrap();
        jobs.storage
            .insert_poll(&Poll::new("s", false, mon(10, 30)))
            .await
            .unwrap();

        let state = jobs.run_at("job-1", mon(11, 0)).await;
        assert_eq!(state, JobState::Complete);

        match jobs.status("job-1").await {
            ReportStatus::Complete { url } => {
                assert!(url.starts_with("http://localhost/reports/job-1/download?"))
            }
            other => panic!("expected complete, got {other:?}"),
        }

        let artifact = jobs.artifacts().get("job-1").await.unwrap();
        let body = String::from_utf8(artifact.body).unwrap();
        assert!(body.contains("s,30.0000,0.5000,0.5000,"));
    }

    #[tokio::test]
    async fn test_publish_failure_marks_job_failed() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let jobs = ReportJobs::new(storage, Arc::new(BrokenStore), signer());

        let state = jobs.run_at("job-1", mon(11, 0)).await;
        assert!(matches!(state, JobState::Failed { .. }));

        match jobs.status("job-1").await {
            ReportStatus::Failed { error } => assert!(error.contains("artifact store")),
            other => panic!("expected failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trigger_returns_distinct_ids() {
        let jobs = setup().await;

        let first = jobs.trigger();
        let second = jobs.trigger();

        assert_ne!(first, second);
        assert!(jobs.state(&first).is_some());
        assert!(jobs.state(&second).is_some());
    }

    #[tokio::test]
    async fn test_triggered_job_completes() {
        let jobs = setup().await;
        let job_id = jobs.trigger();

        let mut status = jobs.status(&job_id).await;
        for _ in 0..100 {
            if status != ReportStatus::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            status = jobs.status(&job_id).await;
        }

        assert!(matches!(status, ReportStatus::Complete { .. }));

        for _ in 0..100 {
            if jobs.state(&job_id).is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(jobs.state(&job_id), None);
    }

    #[tokio::test]
    async fn test_rerun_of_completed_job_stays_complete() {
        let jobs = setup().await;

        assert_eq!(jobs.run_at("job-1", mon(11, 0)).await, JobState::Complete);
        assert_eq!(jobs.run_at("job-1", mon(12, 0)).await, JobState::Complete);

        assert!(matches!(
            jobs.status("job-1").await,
            ReportStatus::Complete { .. }
        ));
        assert_eq!(jobs.state("job-1"), None);
    }

    #[tokio::test]
    async fn test_published_artifact_wins_over_failed_entry() {
        let jobs = setup().await;
        jobs.registry.write().insert(
            "job-1".to_string(),
            JobState::Failed {
                error: "boom".to_string(),
            },
        );
        jobs.artifacts()
            .put("job-1", REPORT_CONTENT_TYPE, b"site_id\n".to_vec())
            .await
            .unwrap();

        assert!(matches!(
            jobs.status("job-1").await,
            ReportStatus::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn test_rerun_of_failed_job_keeps_failure() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let jobs = ReportJobs::new(storage, Arc::new(BrokenStore), signer());

        let first = jobs.run_at("job-1", mon(11, 0)).await;
        let second = jobs.run_at("job-1", mon(12, 0)).await;

        assert!(matches!(first, JobState::Failed { .. }));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_completed_jobs_leave_the_registry() {
        let jobs = setup().await;

        for i in 0..50 {
            let state = jobs.run_at(&format!("job-{i}"), mon(11, 0)).await;
            assert_eq!(state, JobState::Complete);
        }

        assert_eq!(jobs.tracked_jobs(), 0);
    }
}
