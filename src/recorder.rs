use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::db::JobStore;
use crate::models::{Job, JobUpdate, LogEntry, LogKind, NewOutcome, ResourceOutcome};

/// Writes one job's log, counters and outcomes to the store.
///
/// Calls run inline in the pipeline's sequence, so entries land in the
/// order they were emitted relative to status and counter updates.
#[derive(Clone)]
pub struct JobRecorder {
    store: Arc<JobStore>,
    job_id: String,
}

impl JobRecorder {
    pub fn new(store: Arc<JobStore>, job_id: impl Into<String>) -> Self {
        JobRecorder {
            store,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Append a log entry. A store failure is reported and otherwise ignored.
    pub fn log(&self, kind: LogKind, message: impl Into<String>) {
        let entry = LogEntry::new(kind, message);
        match kind {
            LogKind::Error => error!(job = %self.job_id, "{}", entry.message),
            LogKind::Info | LogKind::Success | LogKind::Progress => {
                info!(job = %self.job_id, "{}", entry.message)
            }
        }

        match self.store.append_log(&self.job_id, &entry) {
            Ok(true) => {}
            Ok(false) => warn!(job = %self.job_id, "log entry dropped: job not found"),
            Err(e) => warn!(job = %self.job_id, "log entry dropped: {:#}", e),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogKind::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogKind::Success, message)
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.log(LogKind::Progress, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogKind::Error, message)
    }

    pub fn record_outcome(&self, outcome: &NewOutcome) -> Result<ResourceOutcome> {
        self.store.create_outcome(outcome)
    }

    /// Merge `update` into the job record; the job must exist.
    pub fn update(&self, update: JobUpdate) -> Result<Job> {
        self.store
            .update_job(&self.job_id, &update)?
            .with_context(|| format!("Job {} disappeared from the store", self.job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, OutcomeStatus};

    #[test]
    fn logs_and_updates_land_in_order() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let job = store.create_job("https://example.com").unwrap();
        let rec = JobRecorder::new(Arc::clone(&store), job.id.clone());

        rec.info("start");
        rec.update(JobUpdate::status(JobStatus::Processing)).unwrap();
        rec.progress("1/1");
        rec.error("bad thing");

        let job = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        let kinds: Vec<_> = job.logs.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LogKind::Info, LogKind::Progress, LogKind::Error]);
        assert_eq!(job.logs[2].message, "bad thing");
    }

    #[test]
    fn log_for_unknown_job_is_swallowed() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let rec = JobRecorder::new(store, "missing");
        rec.info("nobody hears this");
        assert!(rec.update(JobUpdate::status(JobStatus::Failed)).is_err());
    }

    #[test]
    fn outcome_is_stored_against_job() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let job = store.create_job("https://example.com").unwrap();
        let rec = JobRecorder::new(Arc::clone(&store), job.id.clone());
        rec.record_outcome(&NewOutcome {
            job_id: job.id.clone(),
            original_url: "https://example.com/a.js".into(),
            local_filename: "001_a.js".into(),
            size_bytes: Some(10),
            status: OutcomeStatus::Success,
            error_message: None,
        })
        .unwrap();
        assert_eq!(store.list_outcomes_by_job(&job.id).unwrap().len(), 1);
    }
}
