pub mod handlers;

use std::io::Cursor;

use rocket::Catcher;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;

use crate::config::ServiceConfig;

/// Error responder carrying an HTTP status and an `anyhow` chain, rendered
/// as the service's `{"success": false, "message": ...}` wire shape.
#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl AppError {
    /// Client-side input problem. Nothing has been written when this fires.
    pub fn validation(status: Status, message: impl Into<String>) -> Self {
        AppError {
            status,
            error: anyhow::anyhow!(message.into()),
        }
    }

    /// External engine failure. The caller removes the input artifact; the
    /// service process is unaffected.
    pub fn transcode(error: anyhow::Error) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::anyhow!("Error processing video: {:#}", error),
        }
    }

    /// Malformed cleanup payload. No artifact is affected.
    pub fn transport(message: impl Into<String>) -> Self {
        AppError {
            status: Status::BadRequest,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let body = json!({
            "success": false,
            "message": self.error.to_string(),
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[catch(404)]
fn not_found() -> AppError {
    AppError::validation(Status::NotFound, "Resource not found.")
}

#[catch(413)]
fn payload_too_large(req: &Request) -> AppError {
    let limit = req
        .rocket()
        .state::<ServiceConfig>()
        .map(|config| config.max_upload_mib)
        .unwrap_or(500);
    AppError::validation(
        Status::PayloadTooLarge,
        format!("File too large. Maximum size is {} MiB.", limit),
    )
}

#[catch(default)]
fn fallback(status: Status, _req: &Request) -> AppError {
    AppError {
        status,
        error: anyhow::anyhow!("Request failed."),
    }
}

pub fn generate_catchers() -> Vec<Catcher> {
    catchers![not_found, payload_too_large, fallback]
}
