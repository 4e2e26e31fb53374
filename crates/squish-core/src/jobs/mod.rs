//! Compression job store for Squish.
//!
//! Every upload becomes a [`Job`]. Jobs and the directory holding their
//! outputs live under the data directory.
//!
//! ## Features
//!
//! - Records completed, kept-original and failed jobs
//! - Respects `max_entries`, deleting the outputs of pruned jobs
//! - Expires outputs after the retention window, keeping the job record
//! - Persists jobs to a JSON file

use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compress::{CompressionOutcome, CompressionReport, MediaKind, Parameter};
use crate::config::Config;
use crate::error::{Error, Result};

/// File name of the job database inside the data directory.
pub const JOBS_FILE: &str = "jobs.json";

/// Directory holding job outputs inside the data directory.
pub const OUTPUTS_DIR: &str = "outputs";

/// Final state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The compressed file was kept
    Completed,
    /// Compression did not pay off and the original was kept
    KeptOriginal,
    /// Compression failed
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::KeptOriginal => write!(f, "Kept original"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl From<CompressionOutcome> for JobState {
    fn from(outcome: CompressionOutcome) -> Self {
        match outcome {
            CompressionOutcome::Compressed => Self::Completed,
            CompressionOutcome::KeptOriginal => Self::KeptOriginal,
        }
    }
}

/// A single compression job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, also the stem of the output file
    pub id: Uuid,
    /// Unix timestamp of the upload
    pub created_at: u64,
    /// User who uploaded the file, if signed in
    pub owner: Option<Uuid>,
    /// File name as uploaded
    pub original_name: String,
    /// Media category (unknown when classification failed)
    pub kind: Option<MediaKind>,
    /// Upload size in bytes
    pub original_size: u64,
    /// Result size in bytes
    pub output_size: u64,
    /// Encoder parameter used
    pub parameter: Option<Parameter>,
    /// Final state
    pub state: JobState,
    /// Error message (if failed)
    pub error_message: Option<String>,
    /// Output file name inside the outputs directory (None once purged)
    pub output_file: Option<String>,
    /// Number of downloads served
    pub downloads: u64,
}

impl Job {
    /// Create a new job with the current timestamp.
    #[must_use]
    pub fn new(original_name: impl Into<String>, original_size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: unix_now(),
            owner: None,
            original_name: original_name.into(),
            kind: None,
            original_size,
            output_size: 0,
            parameter: None,
            state: JobState::Completed,
            error_message: None,
            output_file: None,
            downloads: 0,
        }
    }

    /// Set the uploading user.
    #[must_use]
    pub fn with_owner(mut self, owner: Option<Uuid>) -> Self {
        self.owner = owner;
        self
    }

    /// Fill the job from an engine report.
    #[must_use]
    pub fn with_report(mut self, report: &CompressionReport) -> Self {
        self.kind = Some(report.kind);
        self.original_size = report.original_size;
        self.output_size = report.output_size;
        self.parameter = Some(report.parameter);
        self.state = report.outcome.into();
        self.output_file = report
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self
    }

    /// Mark the job as failed.
    #[must_use]
    pub fn with_error(mut self, message: String) -> Self {
        self.error_message = Some(message);
        self.state = JobState::Failed;
        self
    }

    /// Unix timestamp after which the output is no longer served.
    #[must_use]
    pub fn expires_at(&self, retention: Duration) -> u64 {
        self.created_at.saturating_add(retention.as_secs())
    }

    /// Whether the retention window has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, retention: Duration, now: u64) -> bool {
        now >= self.expires_at(retention)
    }

    /// Whether the job's output can still be downloaded.
    #[must_use]
    pub fn is_downloadable(&self, retention: Duration) -> bool {
        self.output_file.is_some() && !self.is_expired_at(retention, unix_now())
    }

    /// Bytes saved (zero when nothing was saved).
    #[must_use]
    pub const fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.output_size)
    }

    /// Name offered to the browser: the uploaded stem with the output extension.
    #[must_use]
    pub fn download_name(&self) -> String {
        let stem = Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("download");

        match self
            .output_file
            .as_deref()
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
        {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.to_string(),
        }
    }

    /// Get the timestamp as a human-readable string.
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        use chrono::{DateTime, Utc};
        let timestamp_i64 = i64::try_from(self.created_at).unwrap_or(i64::MAX);
        let dt = DateTime::<Utc>::from_timestamp(timestamp_i64, 0);
        dt.map_or_else(
            || "Unknown".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
        )
    }
}

/// Job counts per media kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    /// Image jobs
    pub image: usize,
    /// Video jobs
    pub video: usize,
    /// Audio jobs
    pub audio: usize,
    /// PDF jobs
    pub pdf: usize,
}

/// Aggregate statistics for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Jobs in the store
    pub total_jobs: usize,
    /// Jobs whose compressed output was kept
    pub completed: usize,
    /// Jobs that fell back to the original
    pub kept_original: usize,
    /// Failed jobs
    pub failed: usize,
    /// Bytes uploaded by successful jobs
    pub bytes_in: u64,
    /// Bytes produced by successful jobs
    pub bytes_out: u64,
    /// `bytes_in - bytes_out` summed per job
    pub bytes_saved: u64,
    /// Downloads served
    pub downloads: u64,
    /// Jobs per media kind
    pub by_kind: KindCounts,
}

/// Serializable wrapper for the job database.
#[derive(Debug, Serialize, Deserialize)]
struct JobDatabase {
    /// Version of the job database format
    version: u32,
    /// Jobs, newest first
    jobs: Vec<Job>,
}

impl Default for JobDatabase {
    fn default() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
        }
    }
}

/// Persistent job store.
#[derive(Debug)]
pub struct JobStore {
    /// Path to the job database file
    path: PathBuf,
    /// Directory holding outputs
    outputs_dir: PathBuf,
    /// Jobs (newest first)
    jobs: Vec<Job>,
    /// Maximum number of jobs kept
    max_entries: usize,
    /// How long outputs stay downloadable
    retention: Duration,
}

impl JobStore {
    /// Open the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(
            &config.storage.resolved_data_dir(),
            config.jobs.max_entries,
            config.storage.retention,
        )
    }

    /// Open the store in `data_dir`, purging outputs that expired while
    /// the service was down.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be loaded.
    pub fn open(data_dir: &Path, max_entries: usize, retention: Duration) -> Result<Self> {
        let path = data_dir.join(JOBS_FILE);
        let outputs_dir = data_dir.join(OUTPUTS_DIR);

        let jobs = if path.exists() {
            let file = fs::File::open(&path).map_err(|e| {
                Error::StoreError(format!(
                    "Failed to open job store at {}: {}",
                    path.display(),
                    e
                ))
            })?;

            let db: JobDatabase = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                Error::StoreError(format!(
                    "Failed to parse job store at {}: {}",
                    path.display(),
                    e
                ))
            })?;
            db.jobs
        } else {
            Vec::new()
        };

        let mut store = Self {
            path,
            outputs_dir,
            jobs,
            max_entries,
            retention,
        };

        if store.expire_outputs(unix_now()) > 0 {
            store.save()?;
        }

        Ok(store)
    }

    /// Save the job store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::StoreError(format!(
                    "Failed to create data directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let db = JobDatabase {
            jobs: self.jobs.clone(),
            ..JobDatabase::default()
        };

        let file = fs::File::create(&self.path).map_err(|e| {
            Error::StoreError(format!(
                "Failed to create job store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::to_writer_pretty(BufWriter::new(file), &db).map_err(|e| {
            Error::StoreError(format!(
                "Failed to write job store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Add a job (newest first), pruning the oldest beyond `max_entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn add(&mut self, job: Job) -> Result<()> {
        self.jobs.insert(0, job);

        if self.jobs.len() > self.max_entries {
            let pruned = self.jobs.split_off(self.max_entries);
            for job in &pruned {
                self.delete_output(job);
            }
            tracing::debug!(removed = pruned.len(), "Pruned oldest jobs");
        }

        self.save()
    }

    /// List jobs, newest first.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum number of jobs to return (None for all)
    #[must_use]
    pub fn list(&self, limit: Option<usize>) -> &[Job] {
        limit.map_or_else(
            || &self.jobs[..],
            |n| &self.jobs[..n.min(self.jobs.len())],
        )
    }

    /// Get a job by ID.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    /// Remove a job and its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for unknown IDs, or an error if the
    /// store cannot be saved.
    pub fn remove(&mut self, id: &Uuid) -> Result<Job> {
        let index = self
            .jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        let job = self.jobs.remove(index);
        self.delete_output(&job);
        self.save()?;
        Ok(job)
    }

    /// Remove every job and output. Returns the number of jobs removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn clear(&mut self) -> Result<usize> {
        let jobs = std::mem::take(&mut self.jobs);
        for job in &jobs {
            self.delete_output(job);
        }
        self.save()?;
        Ok(jobs.len())
    }

    /// Delete outputs past the retention window. Job records are kept so
    /// their download links report expiry. Returns the number of outputs
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be saved.
    pub fn purge_expired(&mut self) -> Result<usize> {
        let purged = self.expire_outputs(unix_now());
        if purged > 0 {
            self.save()?;
        }
        Ok(purged)
    }

    /// Count a download. Returns the new download count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for unknown IDs, or an error if the
    /// store cannot be saved.
    pub fn record_download(&mut self, id: &Uuid) -> Result<u64> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        job.downloads += 1;
        let downloads = job.downloads;
        self.save()?;
        Ok(downloads)
    }

    /// Aggregate statistics over all jobs.
    #[must_use]
    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            total_jobs: self.jobs.len(),
            ..JobStats::default()
        };

        for job in &self.jobs {
            stats.downloads += job.downloads;

            match job.state {
                JobState::Completed => stats.completed += 1,
                JobState::KeptOriginal => stats.kept_original += 1,
                JobState::Failed => {
                    stats.failed += 1;
                    continue;
                }
            }

            stats.bytes_in += job.original_size;
            stats.bytes_out += job.output_size;
            stats.bytes_saved += job.bytes_saved();

            match job.kind {
                Some(MediaKind::Image) => stats.by_kind.image += 1,
                Some(MediaKind::Video) => stats.by_kind.video += 1,
                Some(MediaKind::Audio) => stats.by_kind.audio += 1,
                Some(MediaKind::Pdf) => stats.by_kind.pdf += 1,
                None => {}
            }
        }

        stats
    }

    /// Path of a job's output, if it still has one.
    #[must_use]
    pub fn output_path(&self, job: &Job) -> Option<PathBuf> {
        job.output_file.as_ref().map(|f| self.outputs_dir.join(f))
    }

    /// Directory holding job outputs.
    #[must_use]
    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// How long outputs stay downloadable.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Get the total number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Get the path to the job database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn expire_outputs(&mut self, now: u64) -> usize {
        let retention = self.retention;
        let mut purged = 0;

        for index in 0..self.jobs.len() {
            let job = &self.jobs[index];
            if job.output_file.is_none() || !job.is_expired_at(retention, now) {
                continue;
            }
            self.delete_output(job);
            self.jobs[index].output_file = None;
            purged += 1;
        }

        if purged > 0 {
            tracing::info!(purged, "Purged expired job outputs");
        }
        purged
    }

    fn delete_output(&self, job: &Job) {
        let Some(path) = self.output_path(job) else {
            return;
        };

        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(job = %job.id, "Deleted job output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(job = %job.id, path = %path.display(), error = %e, "Failed to delete job output");
            }
        }
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
