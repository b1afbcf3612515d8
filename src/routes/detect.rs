use crate::{
    aggregator::{self, DetectionResponse, UnknownClassError},
    ingest::{self, IngestError},
    model_service::InferenceError,
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DetectRequestError {
    #[error("Multipart payload carried no file field")]
    MissingInput,
    #[error("Multipart payload could not be read: {0}")]
    Payload(#[from] MultipartError),
    #[error("Image ingestion failed: {0}")]
    InvalidImage(#[from] IngestError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Aggregation failed: {0}")]
    UnknownClass(#[from] UnknownClassError),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for DetectRequestError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            DetectRequestError::MissingInput | DetectRequestError::Payload(_) => {
                (StatusCode::BAD_REQUEST, "No file uploaded", None)
            }
            DetectRequestError::InvalidImage(_) => {
                (StatusCode::BAD_REQUEST, "Invalid or unreadable image", None)
            }
            DetectRequestError::Inference(source) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Detection failed",
                Some(source.to_string()),
            ),
            DetectRequestError::UnknownClass(source) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Detection failed",
                Some(source.to_string()),
            ),
        };

        if status.is_server_error() {
            tracing::error!("Detect request failed: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: message.to_string(),
                details,
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn detect(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, DetectRequestError> {
    let mut multipart = multipart.map_err(|_| DetectRequestError::MissingInput)?;
    let image_bytes = read_file_field(&mut multipart).await?;

    let image = ingest::decode_image(&image_bytes)?;

    let started = Instant::now();
    let raw_detections = state.model.detect(
        &image,
        state.confidence_threshold,
        state.iou_threshold,
    )?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let response = aggregator::aggregate(raw_detections, &state.labels, Some(elapsed_ms))?;
    tracing::debug!("Returning {} detections", response.total_items);

    Ok(Json(response))
}

async fn read_file_field(
    multipart: &mut Multipart,
) -> Result<axum::body::Bytes, DetectRequestError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(field.bytes().await?);
        }
    }
    Err(DetectRequestError::MissingInput)
}
