//! Integration tests for the HTTP API.
//!
//! Requests are driven through the router in-process with
//! `tower::ServiceExt::oneshot`; no socket is bound.

#![cfg(feature = "web")]

mod common;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use squish_core::config::Config;
use squish_core::jobs::{Job, JobState};
use squish_core::web::{router, AppState, SharedState};

use common::{create_temp_dir, multipart_body, sample_jpeg, sample_pdf, test_config};

const BODY_LIMIT: usize = 16 * 1024 * 1024;

struct TestApp {
    _dir: tempfile::TempDir,
    state: SharedState,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = create_temp_dir();
        let mut config = test_config(dir.path());
        tweak(&mut config);

        let state = AppState::new(config).expect("Failed to build state").shared();
        let app = router(state.clone());
        Self {
            _dir: dir,
            state,
            app,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("Failed to read body");
        (status, headers, body)
    }

    async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send_json(request(Method::GET, uri, token, Body::empty()))
            .await
    }

    async fn upload(&self, name: &str, content: &[u8], token: Option<&str>) -> (StatusCode, Value) {
        let (content_type, body) = multipart_body("file", name, content);
        let mut req = request(Method::POST, "/api/compress", token, Body::from(body));
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            content_type.parse().expect("content type"),
        );
        self.send_json(req).await
    }

    async fn post_json(&self, uri: &str, token: Option<&str>, body: &Value) -> (StatusCode, Value) {
        let mut req = request(Method::POST, uri, token, Body::from(body.to_string()));
        req.headers_mut().insert(
            header::CONTENT_TYPE,
            "application/json".parse().expect("content type"),
        );
        self.send_json(req).await
    }

    /// Register an account and return its token.
    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .post_json(
                "/api/auth/register",
                None,
                &json!({ "username": username, "password": "hunter2hunter2" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body).expect("Failed to build request")
}

// ============================================================================
// Service
// ============================================================================

/// The health endpoint reports the crate version.
#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], squish_core::VERSION);
}

/// Marketing pages and the dashboard are served from embedded assets.
#[tokio::test]
async fn test_pages_are_served() {
    let app = TestApp::new();

    for uri in ["/", "/pricing", "/admin", "/style.css", "/app.js"] {
        let (status, _, _) = app
            .send(request(Method::GET, uri, None, Body::empty()))
            .await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }

    let (status, headers, _) = app
        .send(request(Method::GET, "/", None, Body::empty()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .expect("ascii")
        .starts_with("text/html"));

    for uri in ["/no-such-page", "/api/no-such-endpoint"] {
        let (status, _, _) = app
            .send(request(Method::GET, uri, None, Body::empty()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
}

// ============================================================================
// Upload and download
// ============================================================================

/// Upload, poll and download a compressed JPEG.
#[tokio::test]
async fn test_upload_and_download() {
    let app = TestApp::new();
    let original = sample_jpeg(640, 480, 100);

    let (status, job) = app.upload("sunset.jpg", &original, None).await;
    assert_eq!(status, StatusCode::CREATED, "{job}");
    assert_eq!(job["state"], "completed");
    assert_eq!(job["kind"], "image");
    assert_eq!(job["parameter"], json!({ "type": "quality", "value": 80 }));
    assert_eq!(job["original_size"], original.len());
    assert!(job["savings_percent"].as_f64().expect("number") > 0.0);

    let id = job["id"].as_str().expect("id").to_string();
    let url = job["download_url"].as_str().expect("download url").to_string();
    assert_eq!(url, format!("/api/download/{id}"));

    let (status, headers, body) = app
        .send(request(Method::GET, &url, None, Body::empty()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"sunset.jpg\""
    );
    assert_eq!(body.len() as u64, job["output_size"].as_u64().expect("size"));
    assert!(body.len() < original.len());

    let (status, job) = app.get(&format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["downloads"], 1);
}

/// A PDF upload is rewritten and served back as a PDF.
#[tokio::test]
async fn test_upload_pdf() {
    let app = TestApp::new();
    let (status, job) = app.upload("minutes.pdf", &sample_pdf(3), None).await;

    assert_eq!(status, StatusCode::CREATED, "{job}");
    assert_eq!(job["kind"], "pdf");
    assert_eq!(job["parameter"]["type"], "stream_compression");

    let url = job["download_url"].as_str().expect("download url");
    let (status, headers, body) = app
        .send(request(Method::GET, url, None, Body::empty()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert!(body.starts_with(b"%PDF-"));
}

/// Uploads from signed-in users are attributed to them.
#[tokio::test]
async fn test_upload_records_owner() {
    let app = TestApp::new();
    let token = app.register("uploader").await;
    let (_, me) = app.get("/api/auth/me", Some(&token)).await;

    let (status, job) = app
        .upload("cat.jpg", &sample_jpeg(200, 200, 100), Some(&token))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["owner"], me["id"]);
}

/// Unsupported types are rejected with E001 and recorded as failed jobs.
#[tokio::test]
async fn test_upload_unsupported_type() {
    let app = TestApp::new();
    let (status, body) = app.upload("notes.txt", b"plain text", None).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], "E001");

    let jobs = app.state.jobs.lock().await;
    let failed = jobs.list(None).first().expect("failed job recorded");
    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.error_message.is_some());
}

/// Empty uploads are a client error.
#[tokio::test]
async fn test_upload_empty_file() {
    let app = TestApp::new();
    let (status, body) = app.upload("empty.png", b"", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E011");
}

/// A request without the `file` field is rejected.
#[tokio::test]
async fn test_upload_missing_field() {
    let app = TestApp::new();
    let (content_type, body) = multipart_body("attachment", "a.jpg", b"data");
    let mut req = request(Method::POST, "/api/compress", None, Body::from(body));
    req.headers_mut().insert(
        header::CONTENT_TYPE,
        content_type.parse().expect("content type"),
    );

    let (status, body) = app.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E011");
}

/// Uploads over the configured limit are rejected and not left on disk.
#[tokio::test]
async fn test_upload_too_large() {
    let app = TestApp::with_config(|config| config.server.max_upload_bytes = 1024);
    let (status, body) = app.upload("big.jpg", &vec![0xAB; 4096], None).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "E008");

    let leftovers = std::fs::read_dir(&app.state.uploads_dir)
        .expect("uploads dir")
        .count();
    assert_eq!(leftovers, 0);
}

/// A body far past the limit is still answered with a JSON error, whether
/// the overrun shows up while streaming or in the declared length.
#[tokio::test]
async fn test_upload_over_body_limit() {
    let app = TestApp::with_config(|config| config.server.max_upload_bytes = 1024);
    let (content_type, body) = multipart_body("file", "huge.jpg", &vec![0xCD; 200 * 1024]);

    let mut streamed = request(Method::POST, "/api/compress", None, Body::from(body.clone()));
    streamed
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type.parse().expect("content type"));

    let mut declared = request(Method::POST, "/api/compress", None, Body::from(body.clone()));
    declared
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type.parse().expect("content type"));
    declared
        .headers_mut()
        .insert(header::CONTENT_LENGTH, body.len().to_string().parse().expect("length"));

    for req in [streamed, declared] {
        let (status, headers, bytes) = app.send(req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).expect("content type"),
            "application/json"
        );
        let body: Value = serde_json::from_slice(&bytes).expect("JSON error body");
        assert_eq!(body["code"], "E008");
    }

    let leftovers = std::fs::read_dir(&app.state.uploads_dir)
        .expect("uploads dir")
        .count();
    assert_eq!(leftovers, 0);
}

/// Unknown and malformed job IDs are 404.
#[tokio::test]
async fn test_unknown_job() {
    let app = TestApp::new();

    let (status, body) = app
        .get(&format!("/api/jobs/{}", uuid::Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E003");

    let (status, _) = app.get("/api/download/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// A job past its retention window is reported as gone.
#[tokio::test]
async fn test_expired_download_is_gone() {
    let app = TestApp::new();
    let mut job = Job::new("old.jpg", 1000);
    job.created_at = 0;
    job.output_size = 400;
    job.output_file = Some(format!("{}.jpg", job.id));
    let id = job.id;
    app.state.jobs.lock().await.add(job).expect("add job");

    let (status, body) = app.get(&format!("/api/download/{id}"), None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "E004");

    let (status, job) = app.get(&format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(job["download_url"].is_null());
}

/// Failed jobs have nothing to download.
#[tokio::test]
async fn test_failed_job_has_no_download() {
    let app = TestApp::new();
    let job = Job::new("broken.mov", 10).with_error("ffmpeg failed".to_string());
    let id = job.id;
    app.state.jobs.lock().await.add(job).expect("add job");

    let (status, body) = app.get(&format!("/api/download/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E003");
}

/// `public_url` turns download links into absolute URLs.
#[tokio::test]
async fn test_public_url_in_download_link() {
    let app = TestApp::with_config(|config| {
        config.server.public_url = Some("https://squish.example/".to_string());
    });
    let (status, job) = app
        .upload("dog.jpg", &sample_jpeg(200, 150, 100), None)
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let url = job["download_url"].as_str().expect("download url");
    assert!(url.starts_with("https://squish.example/api/download/"), "{url}");
}

// ============================================================================
// Accounts
// ============================================================================

/// The first account is an admin; later ones are regular users.
#[tokio::test]
async fn test_register_roles() {
    let app = TestApp::new();

    let admin = app.register("founder").await;
    let (status, me) = app.get("/api/auth/me", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "admin");
    assert!(me.get("password_hash").is_none());

    let user = app.register("customer").await;
    let (_, me) = app.get("/api/auth/me", Some(&user)).await;
    assert_eq!(me["role"], "user");
}

/// Duplicate usernames conflict regardless of case.
#[tokio::test]
async fn test_register_duplicate() {
    let app = TestApp::new();
    app.register("alice").await;

    let (status, body) = app
        .post_json(
            "/api/auth/register",
            None,
            &json!({ "username": "ALICE", "password": "another-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E009");
}

/// Two racing registrations for one name produce one account.
#[tokio::test]
async fn test_concurrent_duplicate_registration() {
    let app = TestApp::new();
    let first = json!({ "username": "dave", "password": "hunter2hunter2" });
    let second = json!({ "username": "DAVE", "password": "hunter2hunter2" });

    let ((a, _), (b, _)) = tokio::join!(
        app.post_json("/api/auth/register", None, &first),
        app.post_json("/api/auth/register", None, &second),
    );

    let mut statuses = [a, b];
    statuses.sort_by_key(StatusCode::as_u16);
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(app.state.users.lock().await.len(), 1);
}

/// Weak passwords and bad usernames are client errors.
#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new();

    let (status, _) = app
        .post_json(
            "/api/auth/register",
            None,
            &json!({ "username": "bob", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json(
            "/api/auth/register",
            None,
            &json!({ "username": "a b", "password": "long enough password" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// With registration disabled only the first account can be created.
#[tokio::test]
async fn test_registration_disabled() {
    let app = TestApp::with_config(|config| config.server.allow_registration = false);
    app.register("bootstrap").await;

    let (status, body) = app
        .post_json(
            "/api/auth/register",
            None,
            &json!({ "username": "latecomer", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "E007");
}

/// Unknown usernames get the same answer as wrong passwords.
#[tokio::test]
async fn test_login_unknown_user() {
    let app = TestApp::new();
    app.register("erin").await;

    let (status, body) = app
        .post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "nobody", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid username or password");
}

/// Login issues a working token; bad passwords are rejected.
#[tokio::test]
async fn test_login() {
    let app = TestApp::new();
    app.register("carol").await;

    let (status, _) = app
        .post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "carol", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, session) = app
        .post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "Carol", "password": "hunter2hunter2" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["username"], "carol");

    let token = session["token"].as_str().expect("token");
    let (status, _) = app.get("/api/auth/me", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
}

/// Missing, malformed and forged tokens are all 401.
#[tokio::test]
async fn test_me_requires_valid_token() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "E006");

    let (status, _) = app.get("/api/auth/me", Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = request(Method::GET, "/api/auth/me", None, Body::empty());
    req.headers_mut().insert(
        header::AUTHORIZATION,
        "Basic dXNlcjpwYXNz".parse().expect("header"),
    );
    let (status, _) = app.send_json(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Admin dashboard
// ============================================================================

/// Admin routes need a token, and the token must belong to an admin.
#[tokio::test]
async fn test_admin_requires_admin() {
    let app = TestApp::new();
    let admin = app.register("root").await;
    let user = app.register("visitor").await;

    let (status, _) = app.get("/api/admin/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/admin/stats", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "E007");

    let (status, _) = app.get("/api/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
}

/// Stats aggregate jobs and accounts.
#[tokio::test]
async fn test_admin_stats() {
    let app = TestApp::new();
    let admin = app.register("root").await;
    app.register("visitor").await;

    app.upload("one.jpg", &sample_jpeg(300, 200, 100), None).await;
    app.upload("bad.txt", b"nope", None).await;

    let (status, stats) = app.get("/api/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["users"], 2);
    assert_eq!(stats["admins"], 1);
    assert_eq!(stats["jobs"]["total_jobs"], 2);
    assert_eq!(stats["jobs"]["completed"], 1);
    assert_eq!(stats["jobs"]["failed"], 1);
    assert_eq!(stats["jobs"]["by_kind"]["image"], 1);
    assert!(stats["jobs"]["bytes_saved"].as_u64().expect("number") > 0);
    assert_eq!(stats["version"], squish_core::VERSION);
}

/// Admins can list, delete and clear jobs.
#[tokio::test]
async fn test_admin_job_management() {
    let app = TestApp::new();
    let admin = app.register("root").await;

    let (_, first) = app.upload("a.jpg", &sample_jpeg(120, 90, 100), None).await;
    app.upload("b.jpg", &sample_jpeg(120, 90, 100), None).await;

    let (status, jobs) = app.get("/api/admin/jobs?limit=1", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().expect("array").len(), 1);
    assert_eq!(jobs[0]["original_name"], "b.jpg");

    let first_id = first["id"].as_str().expect("id");
    let (status, _, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/admin/jobs/{first_id}"),
            Some(&admin),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/api/jobs/{first_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cleared) = app
        .send_json(request(
            Method::DELETE,
            "/api/admin/jobs",
            Some(&admin),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 1);
    assert!(app.state.jobs.lock().await.is_empty());
}

/// Admins can change roles and delete other accounts, but not themselves.
#[tokio::test]
async fn test_admin_user_management() {
    let app = TestApp::new();
    let admin = app.register("root").await;
    let user = app.register("visitor").await;

    let (_, me) = app.get("/api/auth/me", Some(&admin)).await;
    let admin_id = me["id"].as_str().expect("id").to_string();
    let (_, me) = app.get("/api/auth/me", Some(&user)).await;
    let user_id = me["id"].as_str().expect("id").to_string();

    let (status, users) = app.get("/api/admin/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().expect("array").len(), 2);

    let mut promote = request(
        Method::PATCH,
        &format!("/api/admin/users/{user_id}"),
        Some(&admin),
        Body::from(json!({ "role": "admin" }).to_string()),
    );
    promote.headers_mut().insert(
        header::CONTENT_TYPE,
        "application/json".parse().expect("content type"),
    );
    let (status, updated) = app.send_json(promote).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "admin");

    // Role changes apply to existing tokens immediately.
    let (status, _) = app.get("/api/admin/stats", Some(&user)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send_json(request(
            Method::DELETE,
            &format!("/api/admin/users/{admin_id}"),
            Some(&admin),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "E007");

    let (status, _, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/admin/users/{user_id}"),
            Some(&admin),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The deleted account's token stops working.
    let (status, _) = app.get("/api/auth/me", Some(&user)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send_json(request(
            Method::DELETE,
            &format!("/api/admin/users/{}", uuid::Uuid::new_v4()),
            Some(&admin),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E010");
}
