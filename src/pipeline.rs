use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

use crate::db::JobStore;
use crate::discover::discover;
use crate::error::{PipelineError, ResourceError};
use crate::fetcher::{Fetch, Fetched};
use crate::models::{normalize_url, Job, JobStatus, JobUpdate, NewOutcome, OutcomeStatus};
use crate::recorder::JobRecorder;
use crate::report::{CombinedArtifact, Manifest, COMBINED_FILE, MANIFEST_FILE, PAGE_FILE};
use crate::sanitize::{artifact_name, domain_dir, failed_name};

/// Runs extraction jobs: fetch a page, download each script it references,
/// and write the artifacts under `<output_dir>/<domain>/`.
///
/// Jobs for the same domain share a directory; the later job overwrites.
pub struct Extractor {
    store: Arc<JobStore>,
    fetcher: Arc<dyn Fetch>,
    output_dir: PathBuf,
}

impl Extractor {
    pub fn new(store: Arc<JobStore>, fetcher: Arc<dyn Fetch>, output_dir: impl Into<PathBuf>) -> Self {
        Extractor {
            store,
            fetcher,
            output_dir: output_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Directory holding the artifacts of jobs for `domain`.
    pub fn output_path(&self, domain: &str) -> PathBuf {
        self.output_dir.join(domain_dir(domain))
    }

    pub fn create_job(&self, url: &str) -> Result<Job> {
        let job = self.store.create_job(url)?;
        info!(job = %job.id, "Created job for {}", job.source_url);
        Ok(job)
    }

    /// Create a job and start it in the background.
    pub fn submit(self: &Arc<Self>, url: &str) -> Result<(Job, JoinHandle<()>)> {
        let job = self.create_job(url)?;
        let handle = self.spawn(job.id.clone());
        Ok((job, handle))
    }

    /// Run `job_id` on its own task. A panic inside the run fails the job.
    pub fn spawn(self: &Arc<Self>, job_id: String) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let worker = {
                let this = Arc::clone(&this);
                let job_id = job_id.clone();
                tokio::spawn(async move { this.run(&job_id).await })
            };
            if let Err(e) = worker.await {
                let rec = JobRecorder::new(Arc::clone(&this.store), job_id);
                fail(&rec, &format!("Extraction aborted unexpectedly: {}", e));
            }
        })
    }

    /// Drive one job to `completed` or `failed`. Outcomes are observed
    /// through the store, never returned.
    pub async fn run(&self, job_id: &str) {
        let rec = JobRecorder::new(Arc::clone(&self.store), job_id);
        if let Err(e) = self.execute(&rec).await {
            fail(&rec, &e.describe());
        }
    }

    async fn execute(&self, rec: &JobRecorder) -> Result<(), PipelineError> {
        let job = self
            .store
            .get_job(rec.job_id())?
            .ok_or_else(|| PipelineError::JobNotFound(rec.job_id().to_string()))?;
        if job.status != JobStatus::Pending {
            warn!(job = %job.id, "Job is already {}; not running it again", job.status);
            return Ok(());
        }

        rec.update(JobUpdate::status(JobStatus::Processing))?;
        rec.info(format!("Starting extraction for {}", job.source_url));

        let normalized = normalize_url(&job.source_url);
        let page_url = Url::parse(&normalized).map_err(|source| PipelineError::InvalidUrl {
            url: normalized.clone(),
            source,
        })?;
        let domain = page_url
            .host_str()
            .ok_or_else(|| PipelineError::MissingHost(normalized.clone()))?;

        let out_dir = self.output_path(domain);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| PipelineError::io(format!("Failed to create {}", out_dir.display()), e))?;

        rec.info(format!("Fetching page {}", page_url));
        let page = self
            .fetcher
            .fetch(page_url.as_str())
            .await
            .map_err(PipelineError::PageFetch)?;
        write_artifact(&out_dir, PAGE_FILE, &page.body).await?;
        rec.success(format!(
            "Page fetched (HTTP {}, {} bytes), saved as {}",
            page.status,
            page.body.len(),
            PAGE_FILE
        ));

        let scripts = discover(&String::from_utf8_lossy(&page.body), &page_url);
        if scripts.is_empty() {
            rec.update(JobUpdate {
                total_files: Some(0),
                successful_files: Some(0),
                failed_files: Some(0),
                total_size_bytes: Some(0),
                ..JobUpdate::finish(JobStatus::Completed)
            })?;
            rec.success("No .js files found on the page; nothing to download");
            return Ok(());
        }

        let total = scripts.len();
        rec.update(JobUpdate {
            total_files: Some(total as i64),
            ..Default::default()
        })?;
        rec.info(format!("Found {} .js files", total));

        let mut combined = CombinedArtifact::new();
        let mut manifest = Manifest::new(page_url.as_str(), total);
        let mut successful = 0usize;
        let mut total_size = 0i64;

        for (i, script) in scripts.iter().enumerate() {
            let index = i + 1;
            rec.progress(format!("[{}/{}] Downloading {}", index, total, script));

            let filename = artifact_name(index, script);
            match self.download(&out_dir, script, &filename).await {
                Ok(fetched) => {
                    let size = fetched.body.len() as i64;
                    rec.record_outcome(&NewOutcome {
                        job_id: rec.job_id().to_string(),
                        original_url: script.to_string(),
                        local_filename: filename.clone(),
                        size_bytes: Some(size),
                        status: OutcomeStatus::Success,
                        error_message: None,
                    })?;

                    combined.push_success(
                        index,
                        script.as_str(),
                        fetched.status,
                        &String::from_utf8_lossy(&fetched.body),
                    );
                    manifest.push_ok(index, script.as_str(), &filename);
                    successful += 1;
                    total_size += size;
                    rec.success(format!("[{}/{}] Saved {} ({} bytes)", index, total, filename, size));
                }
                Err(e) => {
                    let message = e.describe();
                    rec.record_outcome(&NewOutcome {
                        job_id: rec.job_id().to_string(),
                        original_url: script.to_string(),
                        local_filename: failed_name(index),
                        size_bytes: None,
                        status: if e.is_timeout() {
                            OutcomeStatus::Timeout
                        } else {
                            OutcomeStatus::Failed
                        },
                        error_message: Some(message.clone()),
                    })?;

                    combined.push_failure(index, script.as_str(), &e);
                    manifest.push_error(index, script.as_str(), &message);
                    rec.error(format!("[{}/{}] Failed {}: {}", index, total, script, message));
                }
            }
        }

        write_artifact(&out_dir, COMBINED_FILE, combined.as_str().as_bytes()).await?;
        write_artifact(&out_dir, MANIFEST_FILE, manifest.as_str().as_bytes()).await?;

        let failed = total - successful;
        rec.update(JobUpdate {
            successful_files: Some(successful as i64),
            failed_files: Some(failed as i64),
            total_size_bytes: Some(total_size),
            ..JobUpdate::finish(JobStatus::Completed)
        })?;
        rec.success(format!(
            "Extraction completed: {} downloaded, {} failed, {} bytes total",
            successful, failed, total_size
        ));
        Ok(())
    }

    /// Fetch one resource and save it as `filename`. Either failure is
    /// local to this resource.
    async fn download(&self, out_dir: &Path, url: &Url, filename: &str) -> Result<Fetched, ResourceError> {
        let fetched = self.fetcher.fetch(url.as_str()).await?;
        let path = out_dir.join(filename);
        tokio::fs::write(&path, &fetched.body)
            .await
            .map_err(|source| ResourceError::Save {
                context: format!("Failed to write {}", path.display()),
                source,
            })?;
        Ok(fetched)
    }
}

fn fail(rec: &JobRecorder, message: &str) {
    rec.error(message);
    if let Err(e) = rec.update(JobUpdate::finish(JobStatus::Failed)) {
        error!(job = %rec.job_id(), "Could not mark job failed: {:#}", e);
    }
}

async fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| PipelineError::io(format!("Failed to write {}", path.display()), e))
}
