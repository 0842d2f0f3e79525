use super::{Artifact, OperationResult};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::{ValidatedFile, ValidationOutcome};
use image::{ImageFormat, ImageReader};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Reports the validator's verdict on the uploaded bytes without
/// transforming them.
pub(super) fn validation_report(input: &ValidatedFile) -> Result<OperationResult> {
    const OP: &str = "validate";

    let validation = &input.validation;
    let digest = sha256_hex(input.staged.path()).map_err(|e| ToolError::storage(OP, e))?;
    Ok(OperationResult::Data(json!({
        "is_valid": validation.outcome != ValidationOutcome::Invalid,
        "status": validation.outcome,
        "message": validation.reason,
        "page_count": validation.page_count,
        "sha256": digest,
    })))
}

pub(super) fn image_info(input: &ValidatedFile) -> Result<OperationResult> {
    const OP: &str = "image size";

    let reader = ImageReader::open(input.path())
        .map_err(|e| ToolError::storage(OP, e))?
        .with_guessed_format()
        .map_err(|e| ToolError::storage(OP, e))?;
    let format = reader
        .format()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown");
    let (width, height) = reader.into_dimensions().map_err(|e| ToolError::library(OP, e))?;

    Ok(OperationResult::Data(json!({
        "width": width,
        "height": height,
        "format": format,
    })))
}

/// Converts to 8-bit luma and returns the result as a PNG artifact.
pub(super) fn grayscale(input: &ValidatedFile, stager: &Stager) -> Result<OperationResult> {
    const OP: &str = "grayscale";

    let image = image::open(input.path()).map_err(|e| ToolError::library(OP, e))?;
    let gray = image.grayscale().into_luma8();

    let path = stager.allocate("artifact-", ".png")?;
    gray.save_with_format(&path, ImageFormat::Png)
        .map_err(|e| ToolError::library(OP, e))?;
    stager.commit(&path, OP)?;
    let size = std::fs::metadata(&path)
        .map_err(|e| ToolError::storage(OP, e))?
        .len();

    tracing::info!(width = gray.width(), height = gray.height(), "converted image to grayscale");
    Ok(OperationResult::Artifact(Artifact {
        path,
        stem: "grayscale".to_string(),
        extension: "png",
        media_type: "image/png",
        size,
        report: None,
        repaired_input: false,
    }))
}

pub(super) fn file_size(input: &ValidatedFile) -> OperationResult {
    OperationResult::Data(json!({ "size_bytes": input.staged.size() }))
}

/// Extension of the client-supplied name including the dot, or `""`.
///
/// A leading dot alone (`.bashrc`) does not count as an extension.
pub(super) fn file_extension(input: &ValidatedFile) -> OperationResult {
    let extension = Path::new(input.original_name())
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    OperationResult::Data(json!({ "extension": extension }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scope::RequestScope;
    use crate::staging::{FileKind, UploadMeta};
    use crate::validation::validate;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn stage_any(scope: &RequestScope, name: &str, bytes: &'static [u8]) -> ValidatedFile {
        let staged = scope
            .stager()
            .stage_bytes(
                UploadMeta::new(name, "application/octet-stream"),
                FileKind::Any,
                Bytes::from_static(bytes),
            )
            .await
            .unwrap();
        let validation = validate(&staged, scope.stager());
        ValidatedFile::accept(staged, validation).unwrap()
    }

    #[tokio::test]
    async fn test_validation_report_for_valid_pdf() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::sample_pdf(2);
        let expected = hex::encode(Sha256::digest(&bytes));
        let input = fixtures::stage_pdf(&scope, "a.pdf", bytes).await;

        let result = validation_report(&input).unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["is_valid"], true);
        assert_eq!(data["status"], "valid");
        assert_eq!(data["page_count"], 2);
        assert_eq!(data["sha256"], expected.as_str());
    }

    #[tokio::test]
    async fn test_image_info() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let png = fixtures::png_image(12, 7, false);
        let input = fixtures::stage_image(&scope, "a.png", "image/png", png).await;

        let result = image_info(&input).unwrap();
        assert_eq!(result.data().unwrap(), &json!({"width": 12, "height": 7, "format": "png"}));
    }

    #[tokio::test]
    async fn test_grayscale_returns_png() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let jpeg = fixtures::jpeg_image(20, 10);
        let input = fixtures::stage_image(&scope, "a.jpg", "image/jpeg", jpeg).await;

        let result = grayscale(&input, scope.stager()).unwrap();
        let artifact = result.artifact().unwrap();
        assert_eq!(artifact.media_type, "image/png");

        let decoded = image::open(&artifact.path).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!((decoded.width(), decoded.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_file_size_and_extension() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());

        let archive = stage_any(&scope, "backup.tar.gz", b"0123456789").await;
        assert_eq!(file_size(&archive).data().unwrap()["size_bytes"], 10);
        assert_eq!(file_extension(&archive).data().unwrap()["extension"], ".gz");

        let dotfile = stage_any(&scope, ".bashrc", b"x").await;
        assert_eq!(file_extension(&dotfile).data().unwrap()["extension"], "");

        let bare = stage_any(&scope, "README", b"x").await;
        assert_eq!(file_extension(&bare).data().unwrap()["extension"], "");
    }
}
