//! Application state shared by all HTTP handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::{TokenIssuer, UserStore};
use crate::compress::Engine;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{Job, JobStore};

/// Directory for in-flight uploads inside the data directory.
pub const UPLOADS_DIR: &str = "uploads";

/// State shared across requests.
#[derive(Debug)]
pub struct AppState {
    /// Effective configuration
    pub config: Config,
    /// Compression engine
    pub engine: Engine,
    /// Job store
    pub jobs: Mutex<JobStore>,
    /// Account store
    pub users: Mutex<UserStore>,
    /// Token issuer
    pub tokens: TokenIssuer,
    /// Scratch directory for uploads
    pub uploads_dir: PathBuf,
    /// When the server started
    pub started_at: Instant,
}

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Open the stores and prepare the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be loaded or the data directory
    /// cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.storage.resolved_data_dir();
        let uploads_dir = data_dir.join(UPLOADS_DIR);

        let jobs = JobStore::from_config(&config)?;
        let users = UserStore::from_config(&config)?;

        std::fs::create_dir_all(&uploads_dir)?;
        std::fs::create_dir_all(jobs.outputs_dir())?;

        tracing::debug!(data_dir = %data_dir.display(), jobs = jobs.len(), users = users.len(), "Opened stores");

        Ok(Self {
            engine: Engine::new(config.compression.clone()),
            tokens: TokenIssuer::from_config(&config.auth),
            jobs: Mutex::new(jobs),
            users: Mutex::new(users),
            uploads_dir,
            started_at: Instant::now(),
            config,
        })
    }

    /// Wrap the state for sharing with handlers.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Absolute or relative download URL for a job.
    #[must_use]
    pub fn download_url(&self, job: &Job) -> String {
        let path = format!("/api/download/{}", job.id);
        match self.config.server.public_url.as_deref() {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => path,
        }
    }

    /// Path for a new upload's scratch file.
    #[must_use]
    pub fn upload_path(&self) -> PathBuf {
        self.uploads_dir.join(format!("{}.upload", Uuid::new_v4()))
    }
}
