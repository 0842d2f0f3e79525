//! `/image`, `/file` and `/text` endpoints.

use crate::error::AppError;
use crate::params::Params;
use crate::pipeline::process;
use crate::state::AppState;
use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tooltown_core::{utilities, FileKind, OperationRequest};

#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
}

pub async fn image_size(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "image-size", FileKind::Image, params, multipart, |_, _| {
        Ok(OperationRequest::ImageInfo)
    })
    .await
}

pub async fn grayscale(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "grayscale", FileKind::Image, params, multipart, |_, _| {
        Ok(OperationRequest::Grayscale)
    })
    .await
}

pub async fn file_size(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "file-size", FileKind::Any, params, multipart, |_, _| {
        Ok(OperationRequest::FileSize)
    })
    .await
}

pub async fn file_extension(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "file-extension", FileKind::Any, params, multipart, |_, _| {
        Ok(OperationRequest::FileExtension)
    })
    .await
}

pub async fn word_count(Json(input): Json<TextInput>) -> impl IntoResponse {
    Json(json!({ "word_count": utilities::word_count(&input.text) }))
}

pub async fn char_count(Json(input): Json<TextInput>) -> impl IntoResponse {
    Json(json!({ "char_count": utilities::char_count(&input.text) }))
}
