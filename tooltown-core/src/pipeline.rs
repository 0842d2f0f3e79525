//! Validate-then-execute, off the async executor.

use crate::error::{Result, ToolError};
use crate::operations::{execute, OperationRequest, OperationResult};
use crate::staging::{StagedFile, Stager};
use crate::validation::{validate, ValidatedFile};

/// Validates every staged input, then runs `request` against them.
///
/// All inputs are validated before any output is produced, so one invalid
/// file in a merge fails the whole request. Library work happens on the
/// blocking thread pool.
pub async fn run(
    request: OperationRequest,
    staged: Vec<StagedFile>,
    stager: Stager,
) -> Result<OperationResult> {
    request.check()?;

    tokio::task::spawn_blocking(move || run_blocking(&request, staged, &stager))
        .await
        .map_err(|e| ToolError::library("worker", e))?
}

/// Synchronous body of [`run`].
pub fn run_blocking(
    request: &OperationRequest,
    staged: Vec<StagedFile>,
    stager: &Stager,
) -> Result<OperationResult> {
    let mut inputs = Vec::with_capacity(staged.len());
    for file in staged {
        let validation = validate(&file, stager);
        tracing::debug!(
            file = file.original_name(),
            outcome = ?validation.outcome,
            reason = %validation.reason,
            "validated input"
        );
        if request.tolerates_invalid_input() {
            inputs.push(ValidatedFile {
                staged: file,
                validation,
            });
        } else {
            inputs.push(ValidatedFile::accept(file, validation)?);
        }
    }
    execute(request, &inputs, stager)
}
