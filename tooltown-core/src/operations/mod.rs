//! Document operations.
//!
//! Each operation reads one or more validated inputs and produces either an
//! artifact file in scratch storage or a JSON payload. Operations are
//! blocking; [`crate::pipeline`] runs them on the blocking thread pool.

mod document;
mod fonts;
mod forms;
mod images;
mod inspect;
mod optimize;
mod outline;
mod pages;
mod security;
mod text;
mod watermark;

pub use document::{PageLayout, PageMode};
pub use optimize::OptimizeOptions;

use crate::error::{Result, ToolError};
use crate::staging::{FileKind, Stager};
use crate::validation::ValidatedFile;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Target paper size for image-to-PDF conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    A4,
    Letter,
}

impl PageSize {
    /// Width and height in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a4" => Ok(PageSize::A4),
            "letter" => Ok(PageSize::Letter),
            other => Err(ToolError::Validation(format!(
                "Unknown page size '{other}'. Use A4 or letter."
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub title: String,
    pub page: i64,
    #[serde(default)]
    pub parent_title: Option<String>,
    /// RGB components in 0.0..=1.0
    #[serde(default)]
    pub color: Option<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub page: i64,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLabelRange {
    #[serde(default = "default_start_page")]
    pub start_page: i64,
    #[serde(default = "default_label_style")]
    pub style: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub start_at: Option<i64>,
}

fn default_start_page() -> i64 {
    1
}

fn default_label_style() -> String {
    "D".to_string()
}

/// A fully parsed request for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    Merge,
    Split {
        start: i64,
        end: Option<i64>,
    },
    Rotate {
        degrees: i64,
        pages: Option<Vec<i64>>,
    },
    Watermark {
        text: String,
        opacity: f32,
        pages: Option<Vec<i64>>,
    },
    Encrypt {
        user_password: String,
        owner_password: Option<String>,
    },
    Decrypt {
        password: String,
    },
    ExtractText {
        pages: Option<Vec<i64>>,
    },
    ExtractImages {
        pages: Option<Vec<i64>>,
        resolution: u32,
    },
    ImagesToPdf {
        page_size: PageSize,
        margin: u32,
    },
    ExtractForm,
    FillForm {
        fields: BTreeMap<String, String>,
    },
    SetMetadata {
        entries: BTreeMap<String, String>,
    },
    ReadMetadata,
    SetViewerPreferences {
        layout: PageLayout,
        mode: PageMode,
    },
    ExtractOutline,
    AddBookmarks {
        bookmarks: Vec<Bookmark>,
    },
    CreateToc {
        entries: Vec<TocEntry>,
    },
    AddPageLabels {
        labels: Vec<PageLabelRange>,
    },
    Compress {
        quality: u8,
    },
    Optimize(OptimizeOptions),
    Validate,
    ImageInfo,
    Grayscale,
    FileSize,
    FileExtension,
}

impl OperationRequest {
    /// Operation name used in logs, error messages and download names.
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::Merge => "merge",
            OperationRequest::Split { .. } => "split",
            OperationRequest::Rotate { .. } => "rotate",
            OperationRequest::Watermark { .. } => "watermark",
            OperationRequest::Encrypt { .. } => "encrypt",
            OperationRequest::Decrypt { .. } => "decrypt",
            OperationRequest::ExtractText { .. } => "extract-text",
            OperationRequest::ExtractImages { .. } => "extract-images",
            OperationRequest::ImagesToPdf { .. } => "images-to-pdf",
            OperationRequest::ExtractForm => "extract-form",
            OperationRequest::FillForm { .. } => "fill-form",
            OperationRequest::SetMetadata { .. } => "set-metadata",
            OperationRequest::ReadMetadata => "metadata",
            OperationRequest::SetViewerPreferences { .. } => "set-viewer-prefs",
            OperationRequest::ExtractOutline => "extract-outline",
            OperationRequest::AddBookmarks { .. } => "add-bookmarks",
            OperationRequest::CreateToc { .. } => "create-toc",
            OperationRequest::AddPageLabels { .. } => "add-page-labels",
            OperationRequest::Compress { .. } => "compress",
            OperationRequest::Optimize(_) => "optimize",
            OperationRequest::Validate => "validate",
            OperationRequest::ImageInfo => "image-size",
            OperationRequest::Grayscale => "grayscale",
            OperationRequest::FileSize => "file-size",
            OperationRequest::FileExtension => "file-extension",
        }
    }

    /// The kind every input of this operation must be.
    pub fn input_kind(&self) -> FileKind {
        match self {
            OperationRequest::ImagesToPdf { .. }
            | OperationRequest::ImageInfo
            | OperationRequest::Grayscale => FileKind::Image,
            OperationRequest::FileSize | OperationRequest::FileExtension => FileKind::Any,
            _ => FileKind::Pdf,
        }
    }

    /// Whether the operation takes a list of files rather than exactly one.
    pub fn accepts_many(&self) -> bool {
        matches!(
            self,
            OperationRequest::Merge | OperationRequest::ImagesToPdf { .. }
        )
    }

    /// Whether an input that fails validation is reported instead of rejected.
    pub fn tolerates_invalid_input(&self) -> bool {
        matches!(self, OperationRequest::Validate)
    }

    /// Checks parameter bounds that do not depend on the inputs.
    pub fn check(&self) -> Result<()> {
        match self {
            OperationRequest::Split { start, end } => {
                if *start < 1 {
                    return Err(ToolError::Range {
                        message: format!("Invalid start page: {start}. Pages are numbered from 1."),
                        invalid: vec![*start],
                    });
                }
                if let Some(end) = end {
                    if end < start {
                        return Err(ToolError::Range {
                            message: format!("Invalid page range: {start}-{end}"),
                            invalid: vec![*start, *end],
                        });
                    }
                }
                Ok(())
            }
            OperationRequest::Rotate { degrees, .. } => {
                if !matches!(degrees, 90 | 180 | 270) {
                    return Err(ToolError::Validation(format!(
                        "Rotation must be 90, 180 or 270 degrees, got {degrees}"
                    )));
                }
                Ok(())
            }
            OperationRequest::Watermark { text, opacity, .. } => {
                let length = text.chars().count();
                if !(1..=50).contains(&length) {
                    return Err(ToolError::Validation(format!(
                        "Watermark text must be 1 to 50 characters, got {length}"
                    )));
                }
                if let Some(c) = text.chars().find(|c| u32::from(*c) > 0xFF) {
                    return Err(ToolError::Validation(format!(
                        "Watermark text supports Latin-1 characters only, found '{c}'"
                    )));
                }
                if !(0.1..=1.0).contains(opacity) {
                    return Err(ToolError::Validation(format!(
                        "Opacity must be between 0.1 and 1.0, got {opacity}"
                    )));
                }
                Ok(())
            }
            OperationRequest::Encrypt {
                user_password,
                owner_password,
            } => {
                let too_short = |password: &str| password.chars().count() < 4;
                if too_short(user_password) || owner_password.as_deref().is_some_and(too_short) {
                    return Err(ToolError::Validation(
                        "Passwords must be at least 4 characters long".into(),
                    ));
                }
                Ok(())
            }
            OperationRequest::Decrypt { password } if password.is_empty() => {
                Err(ToolError::Validation("Password must not be empty".into()))
            }
            OperationRequest::ExtractImages { resolution, .. } => {
                if !(72..=600).contains(resolution) {
                    return Err(ToolError::Validation(format!(
                        "Resolution must be between 72 and 600 dpi, got {resolution}"
                    )));
                }
                Ok(())
            }
            OperationRequest::ImagesToPdf { margin, .. } => {
                if *margin > 100 {
                    return Err(ToolError::Validation(format!(
                        "Margin must be between 0 and 100 points, got {margin}"
                    )));
                }
                Ok(())
            }
            OperationRequest::Compress { quality } => optimize::check_quality(*quality),
            OperationRequest::Optimize(options) => optimize::check_quality(options.image_quality),
            OperationRequest::FillForm { fields } if fields.is_empty() => {
                Err(ToolError::Validation("No form field values provided".into()))
            }
            OperationRequest::SetMetadata { entries } if entries.is_empty() => {
                Err(ToolError::Validation("No metadata entries provided".into()))
            }
            OperationRequest::AddBookmarks { bookmarks } if bookmarks.is_empty() => {
                Err(ToolError::Validation("No bookmarks provided".into()))
            }
            OperationRequest::CreateToc { entries } if entries.is_empty() => {
                Err(ToolError::Validation("No table of contents entries provided".into()))
            }
            OperationRequest::AddPageLabels { labels } => document::check_labels(labels),
            _ => Ok(()),
        }
    }
}

/// Reduction achieved by a size-reducing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub original_size: u64,
    pub result_size: u64,
}

impl SizeReport {
    /// Percentage saved; negative when the output grew.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (self.original_size as f64 - self.result_size as f64) / self.original_size as f64 * 100.0
    }
}

/// An output file in scratch storage, owned by the request's cleanup set.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    /// Download name without timestamp or extension, e.g. `split_2_to_3`
    pub stem: String,
    pub extension: &'static str,
    pub media_type: &'static str,
    pub size: u64,
    pub report: Option<SizeReport>,
    pub repaired_input: bool,
}

#[derive(Debug, Clone)]
pub enum OperationResult {
    Artifact(Artifact),
    Data(serde_json::Value),
}

impl OperationResult {
    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            OperationResult::Artifact(artifact) => Some(artifact),
            OperationResult::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            OperationResult::Data(value) => Some(value),
            OperationResult::Artifact(_) => None,
        }
    }
}

/// Runs `request` against already validated inputs.
pub fn execute(
    request: &OperationRequest,
    inputs: &[ValidatedFile],
    stager: &Stager,
) -> Result<OperationResult> {
    request.check()?;

    if inputs.is_empty() {
        let message = match request.input_kind() {
            FileKind::Image => "No image files provided",
            _ if request.accepts_many() => "No files provided",
            _ => "No file provided",
        };
        return Err(ToolError::EmptyInput(message.to_string()));
    }
    if !request.accepts_many() && inputs.len() > 1 {
        return Err(ToolError::Validation(format!(
            "{} accepts exactly one file, got {}",
            request.name(),
            inputs.len()
        )));
    }

    let input = &inputs[0];
    let mut result = match request {
        OperationRequest::Merge => pages::merge(inputs, stager),
        OperationRequest::Split { start, end } => pages::split(input, *start, *end, stager),
        OperationRequest::Rotate { degrees, pages: selection } => {
            pages::rotate(input, *degrees, selection.as_deref(), stager)
        }
        OperationRequest::Watermark {
            text,
            opacity,
            pages,
        } => watermark::apply(input, text, *opacity, pages.as_deref(), stager),
        OperationRequest::Encrypt {
            user_password,
            owner_password,
        } => security::encrypt(input, user_password, owner_password.as_deref(), stager),
        OperationRequest::Decrypt { password } => security::decrypt(input, password, stager),
        OperationRequest::ExtractText { pages } => text::extract(input, pages.as_deref()),
        OperationRequest::ExtractImages { pages, resolution } => {
            images::extract(input, pages.as_deref(), *resolution)
        }
        OperationRequest::ImagesToPdf { page_size, margin } => {
            images::images_to_pdf(inputs, *page_size, *margin, stager)
        }
        OperationRequest::ExtractForm => forms::extract(input),
        OperationRequest::FillForm { fields } => forms::fill(input, fields, stager),
        OperationRequest::SetMetadata { entries } => {
            document::set_metadata(input, entries, stager)
        }
        OperationRequest::ReadMetadata => document::read_metadata(input),
        OperationRequest::SetViewerPreferences { layout, mode } => {
            document::set_viewer_preferences(input, *layout, *mode, stager)
        }
        OperationRequest::ExtractOutline => outline::extract(input),
        OperationRequest::AddBookmarks { bookmarks } => {
            outline::add_bookmarks(input, bookmarks, stager)
        }
        OperationRequest::CreateToc { entries } => outline::create_toc(input, entries, stager),
        OperationRequest::AddPageLabels { labels } => {
            document::add_page_labels(input, labels, stager)
        }
        OperationRequest::Compress { quality } => {
            let options = OptimizeOptions {
                image_quality: *quality,
                ..OptimizeOptions::default()
            };
            optimize::run(input, &options, "compressed", stager)
        }
        OperationRequest::Optimize(options) => optimize::run(input, options, "optimized", stager),
        OperationRequest::Validate => inspect::validation_report(input),
        OperationRequest::ImageInfo => inspect::image_info(input),
        OperationRequest::Grayscale => inspect::grayscale(input, stager),
        OperationRequest::FileSize => Ok(inspect::file_size(input)),
        OperationRequest::FileExtension => Ok(inspect::file_extension(input)),
    }?;

    if let OperationResult::Artifact(artifact) = &mut result {
        artifact.repaired_input = inputs.iter().any(ValidatedFile::was_repaired);
    }
    Ok(result)
}

// Shared lopdf helpers

pub(crate) fn load_pdf(input: &ValidatedFile, operation: &'static str) -> Result<Document> {
    Document::load(input.path()).map_err(|e| ToolError::library(operation, e))
}

/// Writes `doc` to a fresh scratch file and describes it as an artifact.
pub(crate) fn save_pdf(
    doc: &mut Document,
    stem: impl Into<String>,
    operation: &'static str,
    stager: &Stager,
) -> Result<Artifact> {
    let path = stager.allocate("artifact-", ".pdf")?;
    let file = std::fs::File::create(&path).map_err(|e| ToolError::storage(operation, e))?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer)
        .map_err(|e| ToolError::library(operation, e))?;
    writer.flush().map_err(|e| ToolError::storage(operation, e))?;
    drop(writer);
    stager.commit(&path, operation)?;

    let size = std::fs::metadata(&path)
        .map_err(|e| ToolError::storage(operation, e))?
        .len();
    Ok(Artifact {
        path,
        stem: stem.into(),
        extension: "pdf",
        media_type: "application/pdf",
        size,
        report: None,
        repaired_input: false,
    })
}

/// Resolves an optional page list against a document.
///
/// `None` or an empty list selects every page. Any number outside
/// `1..=page_count` fails the whole request and is listed in the error.
pub(crate) fn select_pages(requested: Option<&[i64]>, page_count: u32) -> Result<BTreeSet<u32>> {
    let Some(requested) = requested.filter(|pages| !pages.is_empty()) else {
        return Ok((1..=page_count).collect());
    };

    let mut invalid = Vec::new();
    let mut selected = BTreeSet::new();
    for &page in requested {
        if page >= 1 && page <= i64::from(page_count) {
            selected.insert(page as u32);
        } else if !invalid.contains(&page) {
            invalid.push(page);
        }
    }

    if !invalid.is_empty() {
        return Err(ToolError::invalid_pages(invalid, page_count));
    }
    Ok(selected)
}

pub(crate) fn catalog_id(doc: &Document, operation: &'static str) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| ToolError::library(operation, e))
}

pub(crate) fn catalog_mut<'a>(
    doc: &'a mut Document,
    operation: &'static str,
) -> Result<&'a mut Dictionary> {
    let id = catalog_id(doc, operation)?;
    doc.get_dictionary_mut(id)
        .map_err(|e| ToolError::library(operation, e))
}

/// Follows a reference to a dictionary, or returns an inline one.
pub(crate) fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Looks up a page attribute, walking up the page tree for inherited keys.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    // Page trees are shallow; the bound only guards against Parent cycles.
    for _ in 0..64 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// The page's resource dictionary as an owned, inline copy.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited_attribute(doc, page_id, b"Resources")
        .and_then(|resources| resolve_dict(doc, &resources).cloned())
        .unwrap_or_default()
}

/// Page size as `(width, height)` from the effective MediaBox.
pub(crate) fn page_dimensions(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .map(|object| resolve(doc, &object).clone())
        .and_then(|object| object.as_array().ok().cloned());
    let Some(values) = media_box else {
        return (612.0, 792.0);
    };
    let numbers: Vec<f32> = values.iter().filter_map(object_to_f32).collect();
    match numbers.as_slice() {
        [x0, y0, x1, y1] => ((x1 - x0).abs(), (y1 - y0).abs()),
        _ => (612.0, 792.0),
    }
}

pub(crate) fn object_to_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Reverse of `get_pages`: page object id to 1-based page number.
pub(crate) fn page_numbers(doc: &Document) -> BTreeMap<ObjectId, u32> {
    doc.get_pages().into_iter().map(|(number, id)| (id, number)).collect()
}

/// Decodes a PDF text string (UTF-16BE with BOM, else PDFDocEncoding).
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encodes a text string, falling back to UTF-16BE for non-Latin-1 input.
pub(crate) fn encode_text(text: &str) -> Object {
    if text.chars().all(|c| (c as u32) < 0x80) {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, lopdf::StringFormat::Hexadecimal)
}

/// Renders an object as display text for JSON payloads.
pub(crate) fn object_to_string(doc: &Document, object: &Object) -> Option<String> {
    match resolve(doc, object) {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Integer(i) => Some(i.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Drops object and cross-reference streams carried over from parsing.
///
/// Their members were already expanded into `doc.objects` on load and the
/// writer emits a classic xref table.
pub(crate) fn strip_structural_streams(doc: &mut Document) {
    doc.objects.retain(|_, object| match object {
        Object::Stream(stream) => !matches!(
            stream.dict.get(b"Type").and_then(Object::as_name),
            Ok(b"ObjStm") | Ok(b"XRef")
        ),
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_select_pages_defaults_to_all() {
        assert_eq!(select_pages(None, 3).unwrap(), BTreeSet::from([1, 2, 3]));
        assert_eq!(select_pages(Some(&[]), 2).unwrap(), BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_select_pages_lists_every_invalid_page() {
        let err = select_pages(Some(&[1, 0, 99, 2, 99]), 3).unwrap_err();
        match err {
            ToolError::Range { invalid, message } => {
                assert_eq!(invalid, vec![0, 99]);
                assert!(message.contains("[0, 99]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_rejects_bad_rotation() {
        let request = OperationRequest::Rotate {
            degrees: 45,
            pages: None,
        };
        assert!(matches!(request.check(), Err(ToolError::Validation(_))));
    }

    #[test]
    fn test_check_rejects_inverted_split() {
        let request = OperationRequest::Split {
            start: 3,
            end: Some(2),
        };
        assert!(matches!(request.check(), Err(ToolError::Range { .. })));
    }

    #[test]
    fn test_check_rejects_out_of_range_opacity() {
        let request = OperationRequest::Watermark {
            text: "DRAFT".into(),
            opacity: 1.5,
            pages: None,
        };
        assert!(matches!(request.check(), Err(ToolError::Validation(_))));

        let faint = OperationRequest::Watermark {
            text: "DRAFT".into(),
            opacity: 0.05,
            pages: None,
        };
        assert!(faint.check().is_err());
    }

    #[test]
    fn test_check_rejects_watermark_text_outside_latin1() {
        let request = OperationRequest::Watermark {
            text: "草稿".into(),
            opacity: 0.3,
            pages: None,
        };
        match request.check() {
            Err(ToolError::Validation(message)) => assert!(message.contains('草')),
            other => panic!("unexpected result: {other:?}"),
        }

        let accented = OperationRequest::Watermark {
            text: "Brouillon é".into(),
            opacity: 0.3,
            pages: None,
        };
        assert!(accented.check().is_ok());
    }

    #[test]
    fn test_check_rejects_short_passwords() {
        let request = OperationRequest::Encrypt {
            user_password: "abc".into(),
            owner_password: None,
        };
        assert!(matches!(request.check(), Err(ToolError::Validation(_))));

        let owner_short = OperationRequest::Encrypt {
            user_password: "secret".into(),
            owner_password: Some("own".into()),
        };
        assert!(owner_short.check().is_err());
    }

    #[test]
    fn test_page_size_parsing() {
        assert_eq!("a4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert_eq!("LETTER".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert!("legal".parse::<PageSize>().is_err());
    }

    #[test]
    fn test_size_report_percent() {
        let report = SizeReport {
            original_size: 200,
            result_size: 150,
        };
        assert!((report.reduction_percent() - 25.0).abs() < f64::EPSILON);

        let grown = SizeReport {
            original_size: 100,
            result_size: 120,
        };
        assert!(grown.reduction_percent() < 0.0);
    }

    #[test]
    fn test_text_string_round_trip() {
        for text in ["Plain title", "Überschrift", "日本語"] {
            let Object::String(bytes, _) = encode_text(text) else {
                panic!("expected a string object");
            };
            assert_eq!(decode_text(&bytes), text);
        }
    }

    proptest! {
        #[test]
        fn prop_select_pages_never_accepts_out_of_range(
            pages in proptest::collection::vec(-5i64..20, 0..10),
            count in 1u32..10,
        ) {
            match select_pages(Some(&pages), count) {
                Ok(selected) => {
                    prop_assert!(selected.iter().all(|p| *p >= 1 && *p <= count));
                }
                Err(ToolError::Range { invalid, .. }) => {
                    prop_assert!(!invalid.is_empty());
                    prop_assert!(invalid.iter().all(|p| *p < 1 || *p > i64::from(count)));
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }
    }
}
