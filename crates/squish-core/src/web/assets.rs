//! Static file serving using rust-embed.
//!
//! The landing, pricing and dashboard pages (HTML, JS, CSS) are embedded
//! into the binary at compile time.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// Embedded static assets for the web UI.
#[derive(RustEmbed)]
#[folder = "src/web/assets/"]
#[include = "*.html"]
#[include = "*.js"]
#[include = "*.css"]
#[include = "*.ico"]
#[include = "*.png"]
#[include = "*.svg"]
pub struct Assets;

/// Serve embedded assets for any path that doesn't match an API route.
///
/// `/` maps to `index.html` and extensionless paths such as `/pricing`
/// map to `pricing.html`.
pub async fn serve_static_fallback(request: Request<Body>) -> impl IntoResponse {
    let path = request.uri().path().trim_start_matches('/');

    if path.starts_with("api/") {
        return not_found();
    }

    if path.is_empty() {
        return serve_file("index.html");
    }

    if path.contains('.') {
        return serve_file(path);
    }

    let page = format!("{}.html", path.trim_end_matches('/'));
    serve_file(&page)
}

/// Serve a specific file from embedded assets.
fn serve_file(path: &str) -> Response {
    let Some(content) = Assets::get(path) else {
        return not_found();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, cache_control_for(path).to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}

fn not_found() -> Response {
    let page = Assets::get("404.html").map(|c| c.data.into_owned());
    match page {
        Some(body) => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/html")],
            Body::from(body),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Check if path has a specific extension (case-insensitive).
fn has_extension(path: &str, ext: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Get appropriate cache-control header for a file type.
fn cache_control_for(path: &str) -> &'static str {
    if has_extension(path, "html") {
        "no-cache, no-store, must-revalidate"
    } else if has_extension(path, "js") || has_extension(path, "css") {
        "public, max-age=3600"
    } else {
        "public, max-age=86400"
    }
}

/// List all embedded assets.
#[must_use]
pub fn list_assets() -> Vec<String> {
    Assets::iter().map(|f| f.to_string()).collect()
}
