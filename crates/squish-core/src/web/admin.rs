//! Admin dashboard endpoints. Every route requires an admin token.

#![allow(clippy::missing_errors_doc)]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Role, UserInfo};
use crate::error::Error;
use crate::jobs::JobStats;

use super::auth::AdminUser;
use super::error::ApiResult;
use super::handlers::JobResponse;
use super::state::SharedState;

/// Default page size for job listings.
const DEFAULT_JOB_LIMIT: usize = 100;

/// Routes under `/api/admin`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/jobs", get(list_jobs).delete(clear_jobs))
        .route("/jobs/{id}", delete(delete_job))
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user).patch(update_user))
}

/// Dashboard statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Job aggregates
    pub jobs: JobStats,
    /// Registered accounts
    pub users: usize,
    /// Admin accounts
    pub admins: usize,
    /// Seconds since the server started
    pub uptime_secs: u64,
    /// How long results stay downloadable
    pub retention_secs: u64,
    /// Server version
    pub version: &'static str,
}

/// `?limit=` for listings.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum entries to return
    pub limit: Option<usize>,
}

/// Body of a role change.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    /// New role
    pub role: Role,
}

/// Result of clearing the job store.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    /// Jobs removed
    pub removed: usize,
}

fn parse_id(id: &str, not_found: impl FnOnce(String) -> Error) -> Result<Uuid, Error> {
    Uuid::parse_str(id).map_err(|_| not_found(id.to_string()))
}

/// GET /api/admin/stats - Dashboard statistics.
pub async fn stats(
    State(state): State<SharedState>,
    AdminUser(_): AdminUser,
) -> Json<StatsResponse> {
    let jobs = state.jobs.lock().await.stats();
    let (users, admins) = {
        let store = state.users.lock().await;
        (store.len(), store.admin_count())
    };

    Json(StatsResponse {
        jobs,
        users,
        admins,
        uptime_secs: state.started_at.elapsed().as_secs(),
        retention_secs: state.config.storage.retention.as_secs(),
        version: crate::VERSION,
    })
}

/// GET /api/admin/jobs - Recent jobs, newest first.
pub async fn list_jobs(
    State(state): State<SharedState>,
    AdminUser(_): AdminUser,
    Query(query): Query<ListQuery>,
) -> Json<Vec<JobResponse>> {
    let jobs = state
        .jobs
        .lock()
        .await
        .list(Some(query.limit.unwrap_or(DEFAULT_JOB_LIMIT)))
        .to_vec();

    Json(
        jobs.into_iter()
            .map(|job| JobResponse::new(&state, job))
            .collect(),
    )
}

/// DELETE /api/admin/jobs/{id} - Delete a job and its output.
pub async fn delete_job(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let uuid = parse_id(&id, Error::JobNotFound)?;
    let job = state.jobs.lock().await.remove(&uuid)?;

    tracing::info!(admin = %admin.username, job = %job.id, "Deleted job");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/jobs - Delete every job and output.
pub async fn clear_jobs(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Json<ClearResponse>> {
    let removed = state.jobs.lock().await.clear()?;

    tracing::info!(admin = %admin.username, removed, "Cleared jobs");
    Ok(Json(ClearResponse { removed }))
}

/// GET /api/admin/users - All accounts, without password hashes.
pub async fn list_users(
    State(state): State<SharedState>,
    AdminUser(_): AdminUser,
) -> Json<Vec<UserInfo>> {
    let users = state
        .users
        .lock()
        .await
        .list()
        .iter()
        .map(crate::auth::User::info)
        .collect();

    Json(users)
}

/// PATCH /api/admin/users/{id} - Change an account's role.
pub async fn update_user(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserInfo>> {
    let uuid = parse_id(&id, Error::UserNotFound)?;
    let user = state.users.lock().await.set_role(&uuid, request.role)?;

    tracing::info!(admin = %admin.username, user = %user.username, role = %user.role, "Changed role");
    Ok(Json(user.info()))
}

/// DELETE /api/admin/users/{id} - Delete an account other than your own.
pub async fn delete_user(
    State(state): State<SharedState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let uuid = parse_id(&id, Error::UserNotFound)?;
    if uuid == admin.id {
        return Err(Error::Forbidden("cannot delete your own account".to_string()).into());
    }

    let user = state.users.lock().await.remove(&uuid)?;

    tracing::info!(admin = %admin.username, user = %user.username, "Deleted account");
    Ok(StatusCode::NO_CONTENT)
}
