//! The request pipeline shared by every upload endpoint.

use crate::error::AppError;
use crate::params::Params;
use crate::response::respond;
use crate::state::AppState;
use crate::upload::{read_form, UploadForm};
use axum::extract::Multipart;
use axum::response::Response;
use std::time::Instant;
use tooltown_core::{pipeline, FileKind, OperationRequest, ToolError};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Stages the uploads, builds the request from `params` and the form's text
/// parts, validates and executes it, then renders the response.
///
/// Everything up to the response is bounded by the configured timeout. The
/// request scope is dropped on every early return, which removes whatever
/// was staged so far.
pub async fn process<F>(
    state: &AppState,
    op: &'static str,
    kind: FileKind,
    params: Params,
    multipart: Multipart,
    build: F,
) -> Result<Response, AppError>
where
    F: FnOnce(&Params, &UploadForm) -> Result<OperationRequest, AppError> + Send,
{
    let request_id = Uuid::new_v4();
    let span = info_span!("operation", op, %request_id);
    let started = Instant::now();

    let scope = state.scope();
    let stager = scope.stager().clone();
    let max_files = state.config.limits.max_files;

    let work = async move {
        let form = read_form(multipart, &stager, kind, max_files).await?;
        let request = build(&params, &form)?;
        let result = pipeline::run(request, form.files, stager).await?;
        Ok::<_, AppError>(result)
    };

    let outcome = tokio::time::timeout(state.request_timeout(), work)
        .instrument(span.clone())
        .await;
    let result = match outcome {
        Ok(result) => result?,
        Err(_) => {
            let seconds = state.config.limits.request_timeout_secs;
            return Err(ToolError::Timeout { seconds }.into());
        }
    };

    let response = respond(result, scope).instrument(span.clone()).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    span.in_scope(|| info!(elapsed_ms, "operation completed"));
    Ok(response)
}
