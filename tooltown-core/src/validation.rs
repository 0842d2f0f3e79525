//! Format validation for staged uploads.
//!
//! PDFs are checked for a `%PDF-` header and must parse into a document with
//! at least one page. A PDF that fails to parse gets a single repair attempt:
//! it is re-serialized through oxidize-pdf's writer and re-checked. Images
//! must declare an `image/*` content type that agrees with the sniffed format
//! and must decode.

use crate::error::{Result, ToolError};
use crate::staging::{FileKind, StagedFile, Stager};
use image::ImageFormat;
use oxidize_pdf::operations::{merge_pdfs, MergeInput, MergeOptions};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

const SNIFF_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationOutcome {
    Valid,
    Repaired,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub outcome: ValidationOutcome,
    pub reason: String,
    pub page_count: Option<u32>,
    /// Present only when `outcome` is `Repaired`
    pub repaired: Option<StagedFile>,
}

impl ValidationResult {
    fn valid(reason: impl Into<String>, page_count: Option<u32>) -> Self {
        Self {
            outcome: ValidationOutcome::Valid,
            reason: reason.into(),
            page_count,
            repaired: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            outcome: ValidationOutcome::Invalid,
            reason: reason.into(),
            page_count: None,
            repaired: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.outcome != ValidationOutcome::Invalid
    }

    /// The `InvalidFormat` error reported to the client for `staged`.
    pub fn into_error(self, staged: &StagedFile) -> ToolError {
        ToolError::InvalidFormat(format!(
            "Invalid {} file: {}: {}",
            staged.kind(),
            staged.original_name(),
            self.reason
        ))
    }
}

/// A staged file together with its validation verdict.
///
/// [`ValidatedFile::path`] points at the repaired copy when one exists, so
/// operations never read the damaged original.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub staged: StagedFile,
    pub validation: ValidationResult,
}

impl ValidatedFile {
    /// Fails with `InvalidFormat` unless the file is valid or was repaired.
    pub fn accept(staged: StagedFile, validation: ValidationResult) -> Result<Self> {
        if !validation.is_usable() {
            return Err(validation.into_error(&staged));
        }
        Ok(Self { staged, validation })
    }

    pub fn source(&self) -> &StagedFile {
        self.validation.repaired.as_ref().unwrap_or(&self.staged)
    }

    pub fn path(&self) -> &Path {
        self.source().path()
    }

    pub fn original_name(&self) -> &str {
        self.staged.original_name()
    }

    pub fn was_repaired(&self) -> bool {
        self.validation.outcome == ValidationOutcome::Repaired
    }
}

/// Validates `staged` against the kind the operation expects.
///
/// Blocking: parses the whole file. Run it off the async executor.
pub fn validate(staged: &StagedFile, stager: &Stager) -> ValidationResult {
    match staged.kind() {
        FileKind::Pdf => validate_pdf(staged, stager),
        FileKind::Image => validate_image(staged),
        FileKind::Any => ValidationResult::valid("Accepted", None),
    }
}

fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(head)
}

fn has_pdf_header(head: &[u8]) -> bool {
    head.windows(5).any(|w| w == b"%PDF-")
}

fn count_pages(path: &Path) -> std::result::Result<u32, lopdf::Error> {
    let doc = lopdf::Document::load(path)?;
    Ok(doc.get_pages().len() as u32)
}

fn validate_pdf(staged: &StagedFile, stager: &Stager) -> ValidationResult {
    let declared = media_essence(staged.content_type());
    if declared != "application/pdf" {
        return ValidationResult::invalid(format!(
            "expected content type application/pdf, got {declared}"
        ));
    }

    let head = match read_head(staged.path()) {
        Ok(head) => head,
        Err(e) => return ValidationResult::invalid(format!("unreadable upload ({})", e.kind())),
    };
    if !has_pdf_header(&head) {
        return ValidationResult::invalid("missing %PDF- header");
    }

    match count_pages(staged.path()) {
        Ok(0) => ValidationResult::invalid("document has no pages"),
        Ok(pages) => ValidationResult::valid("PDF is valid", Some(pages)),
        Err(parse_error) => {
            tracing::info!(
                file_name = %staged.original_name(),
                error = %parse_error,
                "PDF failed to parse, attempting repair"
            );
            match repair_pdf(staged, stager) {
                Ok(Some((repaired, pages))) => ValidationResult {
                    outcome: ValidationOutcome::Repaired,
                    reason: "PDF was automatically repaired".to_string(),
                    page_count: Some(pages),
                    repaired: Some(repaired),
                },
                Ok(None) | Err(_) => ValidationResult::invalid(format!(
                    "could not be parsed or repaired: {parse_error}"
                )),
            }
        }
    }
}

/// Re-serializes a damaged PDF through oxidize-pdf, whose lenient reader
/// rebuilds the cross-reference table. Returns `None` when the rewritten file
/// still has no readable pages.
fn repair_pdf(staged: &StagedFile, stager: &Stager) -> Result<Option<(StagedFile, u32)>> {
    let out = stager.allocate("repaired-", ".pdf")?;
    let merged = merge_pdfs(
        vec![MergeInput::new(staged.path())],
        &out,
        MergeOptions::default(),
    );
    stager.commit(&out, "repair PDF")?;
    if let Err(e) = merged {
        tracing::debug!(error = %e, "repair pass rejected the document");
        return Ok(None);
    }

    match count_pages(&out) {
        Ok(pages) if pages > 0 => {
            let size = std::fs::metadata(&out)
                .map_err(|e| ToolError::storage("repair PDF", e))?
                .len();
            Ok(Some((staged.derived(out, size), pages)))
        }
        _ => Ok(None),
    }
}

fn validate_image(staged: &StagedFile) -> ValidationResult {
    let declared = media_essence(staged.content_type());
    if !declared.starts_with("image/") {
        return ValidationResult::invalid(format!("expected an image content type, got {declared}"));
    }

    let head = match read_head(staged.path()) {
        Ok(head) => head,
        Err(e) => return ValidationResult::invalid(format!("unreadable upload ({})", e.kind())),
    };
    let format = match image::guess_format(&head) {
        Ok(format) => format,
        Err(_) => return ValidationResult::invalid("unrecognized image data"),
    };
    if !declared_matches(&declared, format) {
        return ValidationResult::invalid(format!(
            "declared {declared} but the data is {}",
            format.to_mime_type()
        ));
    }

    let decoded = image::ImageReader::open(staged.path())
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())
        .and_then(|reader| reader.decode().map_err(|e| e.to_string()));
    match decoded {
        Ok(_) => ValidationResult::valid("Image is valid", None),
        Err(e) => ValidationResult::invalid(format!("image could not be decoded: {e}")),
    }
}

fn declared_matches(declared: &str, format: ImageFormat) -> bool {
    let declared = match declared {
        "image/jpg" | "image/pjpeg" => "image/jpeg",
        "image/x-ms-bmp" => "image/bmp",
        "image/x-png" => "image/png",
        other => other,
    };
    declared == format.to_mime_type()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scope::RequestScope;
    use crate::staging::UploadMeta;
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn stage(
        scope: &RequestScope,
        name: &str,
        content_type: &str,
        kind: FileKind,
        bytes: Vec<u8>,
    ) -> StagedFile {
        scope
            .stager()
            .stage_bytes(UploadMeta::new(name, content_type), kind, Bytes::from(bytes))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_pdf_reports_page_count() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::sample_pdf(3);
        let staged = stage(&scope, "a.pdf", "application/pdf", FileKind::Pdf, bytes).await;

        let result = validate(&staged, scope.stager());
        assert_eq!(result.outcome, ValidationOutcome::Valid);
        assert_eq!(result.page_count, Some(3));
    }

    #[tokio::test]
    async fn test_text_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let staged = stage(
            &scope,
            "notes.pdf",
            "application/pdf",
            FileKind::Pdf,
            b"just some notes".to_vec(),
        )
        .await;

        let result = validate(&staged, scope.stager());
        assert_eq!(result.outcome, ValidationOutcome::Invalid);

        let err = ValidatedFile::accept(staged, result).unwrap_err();
        assert!(matches!(err, ToolError::InvalidFormat(_)));
        assert!(err.to_string().contains("notes.pdf"));
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_invalid() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::sample_pdf(1);
        let staged = stage(&scope, "a.pdf", "text/plain", FileKind::Pdf, bytes).await;

        assert_eq!(validate(&staged, scope.stager()).outcome, ValidationOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_content_type_parameters_are_ignored() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let staged = stage(
            &scope,
            "a.pdf",
            "Application/PDF; charset=binary",
            FileKind::Pdf,
            fixtures::sample_pdf(1),
        )
        .await;

        assert_eq!(validate(&staged, scope.stager()).outcome, ValidationOutcome::Valid);
    }

    #[tokio::test]
    async fn test_truncated_pdf_is_not_valid() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let mut bytes = fixtures::sample_pdf(2);
        bytes.truncate(40);
        let staged = stage(&scope, "cut.pdf", "application/pdf", FileKind::Pdf, bytes).await;

        let result = validate(&staged, scope.stager());
        assert_ne!(result.outcome, ValidationOutcome::Valid);
        if result.outcome == ValidationOutcome::Repaired {
            assert!(result.repaired.is_some());
        }
    }

    #[tokio::test]
    async fn test_broken_xref_offset_is_repaired() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::with_broken_startxref(fixtures::sample_pdf(2));
        let staged = stage(&scope, "xref.pdf", "application/pdf", FileKind::Pdf, bytes).await;

        let result = validate(&staged, scope.stager());
        assert_eq!(result.outcome, ValidationOutcome::Repaired);
        assert_eq!(result.page_count, Some(2));
        let repaired = result.repaired.as_ref().unwrap();
        assert_eq!(fixtures::page_count(repaired.path()), 2);

        let accepted = ValidatedFile::accept(staged, result).unwrap();
        assert!(accepted.was_repaired());
        assert_eq!(fixtures::page_count(accepted.path()), 2);
    }

    #[tokio::test]
    async fn test_png_with_matching_type_is_valid() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::png_image(8, 4, false);
        let staged = stage(&scope, "a.png", "image/png", FileKind::Image, bytes).await;

        assert_eq!(validate(&staged, scope.stager()).outcome, ValidationOutcome::Valid);
    }

    #[tokio::test]
    async fn test_mislabelled_image_is_invalid() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::png_image(8, 4, false);
        let staged = stage(&scope, "a.jpg", "image/jpeg", FileKind::Image, bytes).await;

        let result = validate(&staged, scope.stager());
        assert_eq!(result.outcome, ValidationOutcome::Invalid);
        assert!(result.reason.contains("image/png"));
    }

    #[tokio::test]
    async fn test_jpg_alias_is_accepted() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::jpeg_image(8, 8);
        let staged = stage(&scope, "a.jpg", "image/jpg", FileKind::Image, bytes).await;

        assert_eq!(validate(&staged, scope.stager()).outcome, ValidationOutcome::Valid);
    }

    #[tokio::test]
    async fn test_any_kind_skips_checks() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let content_type = "application/octet-stream";
        let staged = stage(&scope, "a.bin", content_type, FileKind::Any, vec![0, 1, 2]).await;

        assert!(validate(&staged, scope.stager()).is_usable());
    }
}
