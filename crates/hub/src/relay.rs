//! Pass-through relays from the browser to the upstream hosts.
//!
//! Each relay is stateless. Any upstream failure is logged with its cause
//! and answered with a fixed 500 body naming the operation.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::upstream::{ImageUpload, DEFAULT_IMAGE_NAME, IMAGE_FIELD};
use crate::web::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to fetch image from Pi")]
    Photo,
    #[error("Failed to fetch from Flask server")]
    Graph,
    #[error("Failed to fetch sensor data")]
    Sensor,
    #[error("Failed to analyze captured image")]
    Capture,
    #[error("Failed to forward image")]
    Forward,
    #[error("Form parsing error")]
    FormParse,
    #[error("No file uploaded")]
    NoFile,
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NoFile => StatusCode::BAD_REQUEST,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

/// Log the upstream cause and swap it for the operation's static error.
fn failed<E: std::fmt::Display>(op: RelayError) -> impl FnOnce(E) -> RelayError {
    move |e| {
        error!(error = %e, "{op}");
        op
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /photo-relay`
pub async fn photo(State(app): State<AppState>) -> Result<Response, RelayError> {
    let jpeg = app.upstream.fetch_photo().await.map_err(failed(RelayError::Photo))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        jpeg,
    )
        .into_response())
}

/// `GET /graph-relay`
pub async fn graph(State(app): State<AppState>) -> Result<Json<Value>, RelayError> {
    let payload = app.upstream.fetch_graph().await.map_err(failed(RelayError::Graph))?;
    Ok(Json(payload))
}

/// `GET /sensor-relay`
pub async fn sensor(State(app): State<AppState>) -> Result<Json<Value>, RelayError> {
    let payload = app.upstream.fetch_status().await.map_err(failed(RelayError::Sensor))?;
    Ok(Json(payload))
}

/// `GET /capture-submit`
pub async fn capture(State(app): State<AppState>) -> Result<Json<Value>, RelayError> {
    let verdict = app
        .upstream
        .submit_capture()
        .await
        .map_err(failed(RelayError::Capture))?;
    Ok(Json(verdict))
}

/// `POST /upload-relay`
pub async fn upload(
    State(app): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, RelayError> {
    let mut multipart = form(multipart)?;
    let image = read_image(&mut multipart).await?;
    let verdict = app
        .upstream
        .submit_upload(image)
        .await
        .map_err(failed(RelayError::Forward))?;
    Ok(Json(verdict))
}

/// Any non-POST method on `/upload-relay`. Never looks at the body.
pub async fn method_not_allowed() -> RelayError {
    RelayError::MethodNotAllowed
}

/// Turn a rejected multipart extraction (wrong content type, missing
/// boundary) into the JSON form-parse error.
pub fn form(multipart: Result<Multipart, MultipartRejection>) -> Result<Multipart, RelayError> {
    multipart.map_err(failed(RelayError::FormParse))
}

/// Pull the first file part named `image` out of a multipart body.
pub async fn read_image(multipart: &mut Multipart) -> Result<ImageUpload, RelayError> {
    while let Some(field) = multipart.next_field().await.map_err(failed(RelayError::FormParse))? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            warn!("'{IMAGE_FIELD}' part is not a file, ignoring");
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(failed(RelayError::FormParse))?;

        return Ok(ImageUpload {
            file_name: if file_name.is_empty() {
                DEFAULT_IMAGE_NAME.to_string()
            } else {
                file_name
            },
            content_type,
            data,
        });
    }
    Err(RelayError::NoFile)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(RelayError::NoFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        for e in [
            RelayError::Photo,
            RelayError::Graph,
            RelayError::Sensor,
            RelayError::Capture,
            RelayError::Forward,
            RelayError::FormParse,
        ] {
            assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn messages_are_static() {
        for (e, msg) in [
            (RelayError::Photo, "Failed to fetch image from Pi"),
            (RelayError::Graph, "Failed to fetch from Flask server"),
            (RelayError::Sensor, "Failed to fetch sensor data"),
            (RelayError::Capture, "Failed to analyze captured image"),
            (RelayError::Forward, "Failed to forward image"),
            (RelayError::FormParse, "Form parsing error"),
            (RelayError::NoFile, "No file uploaded"),
            (RelayError::MethodNotAllowed, "Method not allowed"),
        ] {
            assert_eq!(e.to_string(), msg);
        }
    }
}
