use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, Uri, header},
    response::IntoResponse,
};
use rust_embed::RustEmbed;
use std::sync::Arc;

use super::AppState;
use crate::constants::admin::BLOCKED_PAGE_PATHS;

#[derive(RustEmbed)]
#[folder = "keyhaven-ui/dist"]
struct Asset;

/// Embedded asset name of the admin console page. Only ever served under
/// the per-process dynamic path.
const CONSOLE_ASSET: &str = "console.html";

pub async fn serve_asset(State(state): State<Arc<AppState>>, uri: Uri) -> impl IntoResponse {
    let request_path = uri.path();
    let lowered = request_path.to_lowercase();

    // Guessable console locations 404 unconditionally.
    if BLOCKED_PAGE_PATHS
        .iter()
        .any(|p| lowered == *p || lowered == format!("{p}/"))
    {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    // Unmatched API paths are 404s, never the SPA shell.
    if request_path.starts_with("/api/") {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    // The console page exists only under the dynamic path.
    if request_path.starts_with("/sec/") {
        if state.shared.admin_path.verify_page(request_path) {
            return embedded(CONSOLE_ASSET);
        }
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    let mut path = request_path.trim_start_matches('/').to_string();

    if path.is_empty() {
        path = "index.html".to_string();
    }

    // Never serve the console asset by its embedded name.
    if path == CONSOLE_ASSET {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    }

    match Asset::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                Body::from(content.data),
            )
                .into_response()
        }
        None => embedded("index.html"),
    }
}

fn embedded(name: &str) -> axum::response::Response {
    Asset::get(name).map_or_else(
        || (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
        |content| {
            let mime = mime_guess::from_path(name).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                Body::from(content.data),
            )
                .into_response()
        },
    )
}
