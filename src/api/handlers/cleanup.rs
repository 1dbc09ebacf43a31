//! Artifact reclamation endpoints.
//!
//! `/cleanup-video` deletes the artifact pair a client echoes back, either
//! from an in-session action or from a page-unload beacon; both callers get
//! the same idempotent contract. `/cleanup-all` is the operator reset.

use anyhow::anyhow;
use log::{error, info, warn};
use rocket::State;
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use crate::api::{AppError, AppResult};
use crate::storage::{ArtifactKind, ArtifactStore};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupRequest {
    pub original_video_url: Option<String>,
    pub reversed_video_url: Option<String>,
}

/// Deletes the echoed artifact pair. `navigator.sendBeacon` posts this with
/// `text/plain`, so the body is taken raw and parsed here rather than through
/// a `format = "json"` guard. Each present identity is handled independently
/// and a missing file is not an error; the response is always an
/// acknowledgement once the payload parses.
#[post("/cleanup-video", data = "<body>")]
pub async fn cleanup_video(store: &State<ArtifactStore>, body: String) -> AppResult<&'static str> {
    let request: CleanupRequest = if body.trim().is_empty() {
        CleanupRequest::default()
    } else {
        serde_json::from_str(&body).map_err(|err| {
            warn!("Invalid cleanup request body: {}", err);
            AppError::transport("Invalid request body")
        })?
    };

    let store = store.inner().clone();
    spawn_blocking(move || {
        delete_echoed(&store, ArtifactKind::Incoming, request.original_video_url);
        delete_echoed(&store, ArtifactKind::Derived, request.reversed_video_url);
    })
    .await
    .map_err(|err| anyhow!("cleanup task failed: {}", err))?;

    Ok("Cleanup request received.")
}

fn delete_echoed(store: &ArtifactStore, kind: ArtifactKind, url: Option<String>) {
    let Some(url) = url else { return };
    let Some(identity) = ArtifactStore::identity_from_url(&url) else {
        warn!("Ignoring cleanup target without a file name: {}", url);
        return;
    };
    if let Err(err) = store.delete(kind, &identity) {
        error!("Error deleting {} file {}: {:#}", kind.label(), identity, err);
    }
}

/// Unconditionally deletes every artifact in both directories. Startup
/// hygiene and the periodic full sweep go through the sweeper; this endpoint
/// is the manual operator-triggered reset.
#[post("/cleanup-all")]
pub async fn cleanup_all(store: &State<ArtifactStore>) -> AppResult<Json<Value>> {
    let store = store.inner().clone();
    let removed = spawn_blocking(move || store.remove_all(std::time::Duration::ZERO))
        .await
        .map_err(|err| anyhow!("cleanup-all task failed: {}", err))?;
    info!("Cleanup-all removed {} file(s)", removed);

    Ok(Json(json!({
        "success": true,
        "message": "All files deleted from uploads and reversed_videos.",
    })))
}

pub fn generate_cleanup_routes() -> Vec<rocket::Route> {
    routes![cleanup_video, cleanup_all]
}
