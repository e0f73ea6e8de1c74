//! Target endpoints: what other nodes measure against.
//!
//! A node is both a measurer and a target. These routes stream download
//! bytes, swallow uploads, and answer ping probes, and carry no state.

use axum::body::{Body, Bytes};
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use rand::RngCore;
use serde::Deserialize;
use tracing::{debug, warn};

use super::state::AppState;

/// Largest download the target will serve, in MB (2^20 bytes).
const MAX_DOWNLOAD_MB: u32 = 1000;

const DEFAULT_DOWNLOAD_MB: u32 = 10;

pub fn target_routes() -> Router<AppState> {
    Router::new()
        .route("/download", get(download))
        .route("/upload", post(upload))
        .route("/ping", get(ping))
}

#[derive(Deserialize)]
struct DownloadParams {
    size: Option<u32>,
}

/// Stream `size` MB of random bytes. One random 1 MB chunk is generated up
/// front and repeated; the point is wire volume, not entropy.
async fn download(Query(params): Query<DownloadParams>) -> impl IntoResponse {
    let size_mb = params
        .size
        .unwrap_or(DEFAULT_DOWNLOAD_MB)
        .clamp(1, MAX_DOWNLOAD_MB);

    let mut chunk = vec![0u8; 1024 * 1024];
    rand::thread_rng().fill_bytes(&mut chunk);
    let chunk = Bytes::from(chunk);

    debug!(size_mb, "serving download stream");
    let stream = futures::stream::iter(
        (0..size_mb).map(move |_| Ok::<Bytes, std::convert::Infallible>(chunk.clone())),
    );

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(stream),
    )
}

/// Drain and discard an uploaded byte stream.
async fn upload(body: Body) -> Result<&'static str, StatusCode> {
    let mut stream = body.into_data_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(c) => received += c.len() as u64,
            Err(e) => {
                warn!(error = %e, bytes = received, "upload stream aborted");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    debug!(bytes = received, "upload drained");
    Ok("ok")
}

async fn ping() -> &'static str {
    "pong"
}
