//! Account endpoints and request authentication.
//!
//! Requests authenticate with `Authorization: Bearer <token>`. The token's
//! subject is looked up on every request, so deleted accounts and role
//! changes take effect immediately.

#![allow(clippy::missing_errors_doc)]

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{
    hash_password, validate_password, validate_username, verify_against_dummy, verify_password,
    User, UserInfo, UserStore,
};

use super::error::{ApiError, ApiResult};
use super::state::SharedState;

/// Routes under `/api/auth`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

/// Credentials for register and login.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
}

/// Response carrying a new session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Bearer token
    pub token: String,
    /// Expiry (unix seconds)
    pub expires_at: i64,
    /// Signed-in account
    pub user: UserInfo,
}

/// An authenticated account.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// An account, if the request carried a token.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn bearer_token(parts: &Parts) -> ApiResult<Option<&str>> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed Authorization header"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| ApiError::unauthorized("expected a Bearer token"))
}

async fn resolve_user(state: &SharedState, token: &str) -> ApiResult<User> {
    let claims = state.tokens.verify(token)?;
    let id = claims.user_id()?;

    state
        .users
        .lock()
        .await
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("account no longer exists"))
}

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> ApiResult<Self> {
        match bearer_token(parts)? {
            Some(token) => Ok(Self(Some(resolve_user(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> ApiResult<Self> {
        let token = bearer_token(parts)?
            .ok_or_else(|| ApiError::unauthorized("sign in to continue"))?;
        Ok(Self(resolve_user(state, token).await?))
    }
}

impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> ApiResult<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::forbidden("admin access required"));
        }
        Ok(Self(user))
    }
}

fn session(state: &SharedState, user: &User) -> ApiResult<SessionResponse> {
    let issued = state.tokens.issue(user)?;
    Ok(SessionResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: user.info(),
    })
}

/// POST /api/auth/register - Create an account and sign it in.
pub async fn register(
    State(state): State<SharedState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let registration_closed = |users: &UserStore| {
        !state.config.server.allow_registration && !users.is_empty()
    };
    if registration_closed(&*state.users.lock().await) {
        return Err(ApiError::forbidden("registration is disabled"));
    }
    validate_username(&credentials.username)?;
    validate_password(&credentials.password)?;

    // Hash without holding the store lock.
    let password = credentials.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("registration task failed: {e}")))??;

    let user = {
        let mut users = state.users.lock().await;
        if registration_closed(&*users) {
            return Err(ApiError::forbidden("registration is disabled"));
        }
        users.register_hashed(&credentials.username, password_hash)?
    };

    tracing::info!(user = %user.username, role = %user.role, "Registered account");
    Ok((StatusCode::CREATED, Json(session(&state, &user)?)))
}

/// POST /api/auth/login - Exchange credentials for a token.
pub async fn login(
    State(state): State<SharedState>,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Json<SessionResponse>> {
    let user = state
        .users
        .lock()
        .await
        .find_by_username(&credentials.username)
        .cloned();

    let verified = tokio::task::spawn_blocking(move || match user {
        Some(user) => verify_password(&credentials.password, &user.password_hash).then_some(user),
        None => {
            verify_against_dummy(&credentials.password);
            None
        }
    })
    .await
    .map_err(|e| ApiError::internal(format!("login task failed: {e}")))?;

    let user = verified.ok_or_else(|| {
        tracing::debug!("Rejected login");
        ApiError::unauthorized("invalid username or password")
    })?;

    Ok(Json(session(&state, &user)?))
}

/// GET /api/auth/me - The signed-in account.
pub async fn me(AuthUser(user): AuthUser) -> Json<UserInfo> {
    Json(user.info())
}
