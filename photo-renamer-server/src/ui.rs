//! Embedded upload page. Only compiled with the `embed_ui` feature.

use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
struct UiAssets;

fn respond(path: &str) -> Option<Response> {
    UiAssets::get(path).map(|file| {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let cache = if path.ends_with(".html") {
            "no-cache"
        } else {
            "public, max-age=86400"
        };
        (
            [
                (header::CONTENT_TYPE, mime.essence_str().to_string()),
                (header::CACHE_CONTROL, cache.to_string()),
            ],
            Body::from(file.data.into_owned()),
        )
            .into_response()
    })
}

/// Serve embedded assets; `/` maps to `index.html`.
pub async fn serve_ui(uri: Uri) -> Response {
    let raw_path = uri.path().trim_start_matches('/');
    let path = if raw_path.is_empty() {
        "index.html"
    } else {
        raw_path
    };
    respond(path).unwrap_or_else(|| (StatusCode::NOT_FOUND, "Not Found").into_response())
}
