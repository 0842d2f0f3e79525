//! `/pdf` endpoints.

use crate::error::AppError;
use crate::params::{missing, Params};
use crate::pipeline::process;
use crate::state::AppState;
use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tooltown_core::{
    Bookmark, FileKind, OperationRequest, OptimizeOptions, PageLabelRange, PageSize, TocEntry,
};

/// Keys accepted for a page subset on the text and image extractors.
const PAGE_NUMBER_KEYS: [&str; 2] = ["page_numbers", "pages"];

/// Form values may be any JSON scalar; PDF fields only hold strings.
fn string_map(values: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "app_name": state.config.app_name,
        "version": state.config.version,
    }))
}

pub async fn merge(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "merge", FileKind::Pdf, params, multipart, |_, _| {
        Ok(OperationRequest::Merge)
    })
    .await
}

pub async fn split(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "split", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::Split {
            start: p.parse_or("start", 1)?,
            end: p.parse("end")?,
        })
    })
    .await
}

pub async fn rotate(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "rotate", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::Rotate {
            degrees: p.parse_or("degrees", 90)?,
            pages: p.int_list(&["pages"])?,
        })
    })
    .await
}

pub async fn watermark(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "watermark", FileKind::Pdf, params, multipart, |p, _| {
        let text = p
            .get("watermark_text")
            .or_else(|| p.get("text"))
            .ok_or_else(|| missing("watermark_text"))?;
        Ok(OperationRequest::Watermark {
            text: text.to_string(),
            opacity: p.parse_or("opacity", 0.3)?,
            pages: p.int_list(&["pages"])?,
        })
    })
    .await
}

pub async fn encrypt(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "encrypt", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::Encrypt {
            user_password: p.text("user_password")?,
            owner_password: p.get("owner_password").map(str::to_string),
        })
    })
    .await
}

pub async fn decrypt(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "decrypt", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::Decrypt {
            password: p.text("password")?,
        })
    })
    .await
}

pub async fn extract_text(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "extract-text", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::ExtractText {
            pages: p.int_list(&PAGE_NUMBER_KEYS)?,
        })
    })
    .await
}

pub async fn extract_images(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "extract-images", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::ExtractImages {
            pages: p.int_list(&PAGE_NUMBER_KEYS)?,
            resolution: p.parse_or("resolution", 150)?,
        })
    })
    .await
}

pub async fn images_to_pdf(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "images-to-pdf", FileKind::Image, params, multipart, |p, _| {
        Ok(OperationRequest::ImagesToPdf {
            page_size: p.parse_or("page_size", PageSize::A4)?,
            margin: p.parse_or("margin", 0)?,
        })
    })
    .await
}

pub async fn extract_form(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "extract-form", FileKind::Pdf, params, multipart, |_, _| {
        Ok(OperationRequest::ExtractForm)
    })
    .await
}

pub async fn fill_form(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "fill-form", FileKind::Pdf, params, multipart, |_, form| {
        Ok(OperationRequest::FillForm {
            fields: string_map(form.required_json("field_data")?),
        })
    })
    .await
}

pub async fn set_metadata(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "set-metadata", FileKind::Pdf, params, multipart, |_, form| {
        Ok(OperationRequest::SetMetadata {
            entries: string_map(form.required_json("metadata")?),
        })
    })
    .await
}

pub async fn read_metadata(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "metadata", FileKind::Pdf, params, multipart, |_, _| {
        Ok(OperationRequest::ReadMetadata)
    })
    .await
}

pub async fn set_viewer_prefs(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "set-viewer-prefs", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::SetViewerPreferences {
            layout: p.choice("layout")?.unwrap_or_default(),
            mode: p.choice("mode")?.unwrap_or_default(),
        })
    })
    .await
}

pub async fn extract_outline(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "extract-outline", FileKind::Pdf, params, multipart, |_, _| {
        Ok(OperationRequest::ExtractOutline)
    })
    .await
}

pub async fn add_bookmarks(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "add-bookmarks", FileKind::Pdf, params, multipart, |_, form| {
        let bookmarks: Vec<Bookmark> = form.required_json("bookmarks")?;
        Ok(OperationRequest::AddBookmarks { bookmarks })
    })
    .await
}

pub async fn create_toc(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "create-toc", FileKind::Pdf, params, multipart, |_, form| {
        let entries: Vec<TocEntry> = form.required_json("toc_entries")?;
        Ok(OperationRequest::CreateToc { entries })
    })
    .await
}

pub async fn add_page_labels(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "add-page-labels", FileKind::Pdf, params, multipart, |_, form| {
        let labels: Vec<PageLabelRange> = form.required_json("labels")?;
        Ok(OperationRequest::AddPageLabels { labels })
    })
    .await
}

pub async fn optimize(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "optimize", FileKind::Pdf, params, multipart, |_, form| {
        let options: Option<OptimizeOptions> = form.json("options")?;
        Ok(OperationRequest::Optimize(options.unwrap_or_default()))
    })
    .await
}

pub async fn compress(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "compress", FileKind::Pdf, params, multipart, |p, _| {
        Ok(OperationRequest::Compress {
            quality: p.parse_or("quality", 80)?,
        })
    })
    .await
}

pub async fn validate(
    State(state): State<AppState>,
    Query(params): Query<Params>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    process(&state, "validate", FileKind::Pdf, params, multipart, |_, _| {
        Ok(OperationRequest::Validate)
    })
    .await
}
