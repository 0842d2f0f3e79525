//! Turns operation results into HTTP responses.

use crate::error::AppError;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Local};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tooltown_core::{Artifact, OperationResult, RequestScope, ToolError};

pub const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
pub const X_OPTIMIZED_SIZE: HeaderName = HeaderName::from_static("x-optimized-size");
pub const X_SIZE_REDUCTION: HeaderName = HeaderName::from_static("x-size-reduction");
pub const X_INPUT_REPAIRED: HeaderName = HeaderName::from_static("x-input-repaired");

/// `<stem>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn download_name(stem: &str, extension: &str, now: DateTime<Local>) -> String {
    format!("{stem}_{}.{extension}", now.format("%Y%m%d_%H%M%S"))
}

fn artifact_headers(artifact: &Artifact) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(artifact.media_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.size));

    let disposition = format!(
        "attachment; filename={}",
        download_name(&artifact.stem, artifact.extension, Local::now())
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Some(report) = artifact.report {
        headers.insert(X_ORIGINAL_SIZE, HeaderValue::from(report.original_size));
        headers.insert(X_OPTIMIZED_SIZE, HeaderValue::from(report.result_size));
        if let Ok(value) = HeaderValue::from_str(&format!("{:.1}%", report.reduction_percent())) {
            headers.insert(X_SIZE_REDUCTION, value);
        }
    }
    if artifact.repaired_input {
        headers.insert(X_INPUT_REPAIRED, HeaderValue::from_static("true"));
    }
    headers
}

/// Builds the response for `result`, settling the scope's cleanup.
///
/// JSON payloads are complete before the response exists, so the scope is
/// drained immediately. Artifacts are streamed from disk and the cleanup
/// guard travels inside the body: the files go away once the body is
/// dropped, whether it was fully sent or the client disconnected.
pub async fn respond(result: OperationResult, scope: RequestScope) -> Result<Response, AppError> {
    match result {
        OperationResult::Data(value) => {
            scope.finish();
            Ok(Json(value).into_response())
        }
        OperationResult::Artifact(artifact) => {
            let file = tokio::fs::File::open(&artifact.path)
                .await
                .map_err(|e| ToolError::storage("stream output", e))?;
            let headers = artifact_headers(&artifact);

            let guard = scope.into_guard();
            let stream = ReaderStream::new(file).map(move |chunk| {
                let _holds_cleanup = &guard;
                chunk
            });
            Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tooltown_core::SizeReport;

    fn artifact() -> Artifact {
        Artifact {
            path: PathBuf::from("unused.pdf"),
            stem: "compressed".into(),
            extension: "pdf",
            media_type: "application/pdf",
            size: 750,
            report: Some(SizeReport {
                original_size: 1000,
                result_size: 750,
            }),
            repaired_input: true,
        }
    }

    #[test]
    fn test_download_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(download_name("split_2_to_3", "pdf", now), "split_2_to_3_20240309_140507.pdf");
    }

    #[test]
    fn test_size_and_repair_headers() {
        let headers = artifact_headers(&artifact());
        assert_eq!(headers[header::CONTENT_LENGTH], "750");
        assert_eq!(headers[X_ORIGINAL_SIZE], "1000");
        assert_eq!(headers[X_OPTIMIZED_SIZE], "750");
        assert_eq!(headers[X_SIZE_REDUCTION], "25.0%");
        assert_eq!(headers[X_INPUT_REPAIRED], "true");

        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=compressed_"));
        assert!(disposition.ends_with(".pdf"));
    }

    #[test]
    fn test_plain_artifact_has_no_extra_headers() {
        let mut plain = artifact();
        plain.report = None;
        plain.repaired_input = false;
        let headers = artifact_headers(&plain);
        assert!(!headers.contains_key(X_ORIGINAL_SIZE));
        assert!(!headers.contains_key(X_INPUT_REPAIRED));
    }
}
