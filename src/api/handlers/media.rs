//! Upload coordination and read-only artifact serving.
//!
//! An upload is validated, persisted under a generated identity, reversed by
//! one `ReverseJob`, and answered with both artifact locators. Nothing is
//! deleted on success; retention belongs to the cleanup signals and the
//! sweeper. A failed job takes its input (and any partial output) with it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use log::{error, info, warn};
use rocket::State;
use rocket::form::error::ErrorKind;
use rocket::form::{Errors, Form, FromForm};
use rocket::fs::{NamedFile, TempFile};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket_seek_stream::SeekStream;
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::api::{AppError, AppResult};
use crate::background::video::ReverseJob;
use crate::common::VALID_VIDEO_EXTENSIONS;
use crate::config::ServiceConfig;
use crate::storage::{ArtifactKind, ArtifactStore};
use crate::utils::PathExt;

#[derive(Responder)]
pub enum MediaFileResponse<'a> {
    SeekStream(SeekStream<'a>),
    NamedFile(NamedFile),
}

#[derive(FromForm, Debug)]
pub struct UploadForm<'r> {
    #[field(name = "video")]
    pub video: TempFile<'r>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversed_video_url: Option<String>,
}

#[post("/upload", data = "<form>")]
pub async fn upload(
    store: &State<ArtifactStore>,
    config: &State<ServiceConfig>,
    form: Result<Form<UploadForm<'_>>, Errors<'_>>,
) -> AppResult<Json<UploadResponse>> {
    let mut inner_form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => return Err(upload_form_error(errors, config)),
    };

    let file = &mut inner_form.video;
    if file.len() == 0 {
        return Err(AppError::validation(
            Status::BadRequest,
            "No video file uploaded.",
        ));
    }

    let extension = file_extension(file).unwrap_or_default();
    if !VALID_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::validation(
            Status::BadRequest,
            format!(
                "Invalid file type: {}",
                if extension.is_empty() { "unknown" } else { &extension }
            ),
        ));
    }

    let stem = file.name().unwrap_or("video").to_string();
    let original_id = ArtifactStore::incoming_identity(&stem, &extension);
    let input_path = store.dir(ArtifactKind::Incoming).join(&original_id);

    let start_time = Instant::now();
    file.move_copy_to(&input_path)
        .await
        .context("failed to persist uploaded file")?;
    let duration = format!("{:?}", start_time.elapsed());
    info!(duration = &*duration; "Stored upload '{}'", original_id);

    // The output identity exists before the job does, so the failure path
    // knows what to clean up.
    let derived_id = ArtifactStore::derived_identity();
    let output_path = store.dir(ArtifactKind::Derived).join(&derived_id);

    let job = ReverseJob::new(input_path, output_path);
    let job_result = spawn_blocking(move || {
        job.run(|percent| info!("Processing: {:.1}% done", percent))
    })
    .await
    .context("reverse job task failed")?;

    match job_result {
        Ok(()) => {
            info!("Video reversing finished: {}", derived_id);
            Ok(Json(UploadResponse {
                success: true,
                message: "Video reversed successfully!".to_string(),
                original_video_url: Some(store.public_url(ArtifactKind::Incoming, &original_id)),
                reversed_video_url: Some(store.public_url(ArtifactKind::Derived, &derived_id)),
            }))
        }
        Err(err) => {
            error!("Error during processing: {:#}", err);
            discard_failed_job_files(store, original_id, derived_id).await;
            Err(AppError::transcode(err))
        }
    }
}

fn upload_form_error(errors: Errors<'_>, config: &ServiceConfig) -> AppError {
    if errors.iter().any(|error| matches!(error.kind, ErrorKind::Missing)) {
        return AppError::validation(Status::BadRequest, "No video file uploaded.");
    }

    let status = errors.status();
    let message = if status == Status::PayloadTooLarge {
        format!(
            "File too large. Maximum size is {} MiB.",
            config.max_upload_mib
        )
    } else {
        let detail: Vec<String> = errors.iter().map(|error| error.to_string()).collect();
        format!("Upload error: {}", detail.join("; "))
    };
    warn!("Rejected upload: {}", message);
    AppError::validation(status, message)
}

/// Extension from the multipart content type when the client sent one, else
/// from the submitted file name.
fn file_extension(file: &TempFile<'_>) -> Option<String> {
    if let Some(ext) = file.content_type().and_then(|ct| ct.extension()) {
        return Some(ext.as_str().to_ascii_lowercase());
    }
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
        .map(|raw| Path::new(raw).ext_lower())
        .filter(|ext| !ext.is_empty())
}

/// A failed job must leave zero derived artifacts, and its input goes with
/// it. Both deletions are best-effort; failures are logged, never escalated.
async fn discard_failed_job_files(store: &ArtifactStore, original_id: String, derived_id: String) {
    let store = store.clone();
    let _ = spawn_blocking(move || {
        if let Err(err) = store.delete(ArtifactKind::Incoming, &original_id) {
            error!("Error deleting input file {}: {:#}", original_id, err);
        }
        if let Err(err) = store.delete(ArtifactKind::Derived, &derived_id) {
            error!("Error deleting partial output {}: {:#}", derived_id, err);
        }
    })
    .await;
}

#[get("/uploads/<file_path..>")]
pub async fn serve_original(
    store: &State<ArtifactStore>,
    file_path: PathBuf,
) -> Option<MediaFileResponse<'static>> {
    open_media(store.dir(ArtifactKind::Incoming).join(file_path)).await
}

#[get("/reversed_videos/<file_path..>")]
pub async fn serve_reversed(
    store: &State<ArtifactStore>,
    file_path: PathBuf,
) -> Option<MediaFileResponse<'static>> {
    open_media(store.dir(ArtifactKind::Derived).join(file_path)).await
}

async fn open_media(path: PathBuf) -> Option<MediaFileResponse<'static>> {
    match path.ext_lower().as_str() {
        "mp4" => SeekStream::from_path(&path)
            .map(MediaFileResponse::SeekStream)
            .ok(),
        _ => NamedFile::open(&path)
            .await
            .map(MediaFileResponse::NamedFile)
            .ok(),
    }
}

#[get("/")]
pub async fn index() -> Option<NamedFile> {
    NamedFile::open(Path::new("public/index.html")).await.ok()
}

pub fn generate_media_routes() -> Vec<rocket::Route> {
    routes![upload, serve_original, serve_reversed, index]
}
