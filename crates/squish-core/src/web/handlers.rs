//! HTTP endpoint handlers for uploads, job status and downloads.

#![allow(clippy::missing_errors_doc)]

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::multipart::MultipartError;
use axum_extra::extract::Multipart;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::Error;
use crate::jobs::{Job, JobState};

use super::auth::MaybeUser;
use super::error::{ApiError, ApiResult};
use super::state::{AppState, SharedState};

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and part headers on top of the upload.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

// ============================================================================
// Response types
// ============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok"
    status: &'static str,
    /// Server version
    version: &'static str,
}

/// A job as returned by the API.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    /// The stored job
    #[serde(flatten)]
    pub job: Job,
    /// Where to fetch the result (None when failed or expired)
    pub download_url: Option<String>,
    /// Unix time the result stops being served
    pub expires_at: u64,
    /// Percentage saved relative to the upload
    pub savings_percent: f64,
}

impl JobResponse {
    /// Build the API view of a job.
    #[must_use]
    pub fn new(state: &AppState, job: Job) -> Self {
        let retention = state.config.storage.retention;
        let download_url =
            (job.state != JobState::Failed && job.is_downloadable(retention))
                .then(|| state.download_url(&job));

        Self {
            download_url,
            expires_at: job.expires_at(retention),
            savings_percent: crate::compress::savings_ratio(job.original_size, job.output_size)
                * 100.0,
            job,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
    })
}

/// POST /api/compress - Upload a file and compress it.
pub async fn compress(
    State(state): State<SharedState>,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    check_content_length(&state, &headers)?;
    let upload_path = state.upload_path();

    let received = receive_upload(&state, &mut multipart, &upload_path).await;
    let (original_name, size) = match received {
        Ok(upload) => upload,
        Err(e) => {
            remove_quietly(&upload_path).await;
            return Err(e);
        }
    };

    let job = Job::new(original_name.clone(), size).with_owner(user.map(|u| u.id));
    let outputs_dir = state.jobs.lock().await.outputs_dir().to_path_buf();

    let result = state
        .engine
        .compress(&upload_path, &original_name, &outputs_dir, &job.id.to_string())
        .await;
    remove_quietly(&upload_path).await;

    match result {
        Ok(report) => {
            let job = job.with_report(&report);
            state.jobs.lock().await.add(job.clone())?;

            tracing::info!(
                job = %job.id,
                file = %job.original_name,
                state = %job.state,
                original_size = job.original_size,
                output_size = job.output_size,
                "Job finished"
            );

            Ok((StatusCode::CREATED, Json(JobResponse::new(&state, job))))
        }
        Err(e) => {
            let job = job.with_error(e.to_string());
            if e.is_client_error() {
                tracing::debug!(job = %job.id, file = %job.original_name, error = %e, "Job rejected");
            } else {
                tracing::warn!(job = %job.id, file = %job.original_name, error = %e, "Job failed");
            }
            if let Err(store_err) = state.jobs.lock().await.add(job) {
                tracing::warn!(error = %store_err, "Failed to record failed job");
            }
            Err(e.into())
        }
    }
}

/// Stream the `file` field to `path`. Returns the sanitized file name and size.
async fn receive_upload(
    state: &AppState,
    multipart: &mut Multipart,
    path: &Path,
) -> ApiResult<(String, u64)> {
    let limit = state.config.server.max_upload_bytes;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error(&e, 0, limit, "multipart field"))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = sanitize_file_name(field.file_name());
        let mut file = File::create(path).await?;
        let mut size: u64 = 0;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| read_error(&e, size, limit, "file data"))?
        {
            size += chunk.len() as u64;
            if size > limit {
                return Err(Error::UploadTooLarge { size, limit }.into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(file = %name, size, "Received upload");
        return Ok((name, size));
    }

    Err(ApiError::bad_request(format!(
        "missing multipart field '{FILE_FIELD}'"
    )))
}

/// Refuse a request whose declared length cannot fit under the upload limit.
fn check_content_length(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let limit = state.config.server.max_upload_bytes;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    match declared {
        Some(size) if size > limit.saturating_add(MULTIPART_OVERHEAD) => {
            Err(Error::UploadTooLarge { size, limit }.into())
        }
        _ => Ok(()),
    }
}

/// A body that overran the request limit is reported as too large.
fn read_error(err: &MultipartError, received: u64, limit: u64, what: &str) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::UploadTooLarge {
            size: received.max(limit.saturating_add(1)),
            limit,
        }
        .into()
    } else {
        ApiError::bad_request(format!("Failed to read {what}: {err}"))
    }
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_file_name(name: Option<&str>) -> String {
    name.map(|n| n.rsplit(['/', '\\']).next().unwrap_or(n).trim())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map_or_else(|| "upload".to_string(), String::from)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload");
        }
    }
}

fn parse_job_id(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| Error::JobNotFound(id.to_string()).into())
}

/// GET /api/jobs/{id} - Job status.
pub async fn get_job(
    State(state): State<SharedState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<JobResponse>> {
    let uuid = parse_job_id(&id)?;
    let job = state
        .jobs
        .lock()
        .await
        .get(&uuid)
        .cloned()
        .ok_or(Error::JobNotFound(id))?;

    Ok(Json(JobResponse::new(&state, job)))
}

/// GET /api/download/{id} - Stream a job's result.
pub async fn download(
    State(state): State<SharedState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Response> {
    let uuid = parse_job_id(&id)?;

    let (job, path) = {
        let jobs = state.jobs.lock().await;
        let job = jobs
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(id.clone()))?;

        if job.state == JobState::Failed {
            return Err(ApiError::with_code(
                "E003",
                format!("job '{id}' has no result"),
            ));
        }
        if !job.is_downloadable(jobs.retention()) {
            return Err(Error::JobExpired(id).into());
        }

        let path: Option<PathBuf> = jobs.output_path(&job);
        (job, path)
    };

    let path = path.ok_or_else(|| Error::JobExpired(id.clone()))?;
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::JobExpired(id).into());
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();

    if let Err(e) = state.jobs.lock().await.record_download(&uuid) {
        tracing::warn!(job = %uuid, error = %e, "Failed to record download");
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&job.download_name())),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `attachment` disposition with a header-safe file name.
fn content_disposition(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
