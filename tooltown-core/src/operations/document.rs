//! Document-level settings: Info metadata, viewer preferences, page labels.

use super::{
    catalog_mut, encode_text, load_pdf, object_to_string, resolve_dict, save_pdf, OperationResult,
    PageLabelRange,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{dictionary, Dictionary, Object};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Standard Info keys, as accepted in requests and as written to the PDF.
const INFO_KEYS: [(&str, &str); 8] = [
    ("title", "Title"),
    ("author", "Author"),
    ("subject", "Subject"),
    ("keywords", "Keywords"),
    ("creator", "Creator"),
    ("producer", "Producer"),
    ("creationdate", "CreationDate"),
    ("moddate", "ModDate"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageLayout {
    #[default]
    SinglePage,
    OneColumn,
    TwoColumnLeft,
    TwoColumnRight,
    TwoPageLeft,
    TwoPageRight,
}

impl PageLayout {
    pub fn pdf_name(self) -> &'static str {
        match self {
            PageLayout::SinglePage => "SinglePage",
            PageLayout::OneColumn => "OneColumn",
            PageLayout::TwoColumnLeft => "TwoColumnLeft",
            PageLayout::TwoColumnRight => "TwoColumnRight",
            PageLayout::TwoPageLeft => "TwoPageLeft",
            PageLayout::TwoPageRight => "TwoPageRight",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageMode {
    #[default]
    UseNone,
    UseOutlines,
    UseThumbs,
    FullScreen,
    #[serde(rename = "use-oc")]
    UseOc,
    UseAttachments,
}

impl PageMode {
    pub fn pdf_name(self) -> &'static str {
        match self {
            PageMode::UseNone => "UseNone",
            PageMode::UseOutlines => "UseOutlines",
            PageMode::UseThumbs => "UseThumbs",
            PageMode::FullScreen => "FullScreen",
            PageMode::UseOc => "UseOC",
            PageMode::UseAttachments => "UseAttachments",
        }
    }
}

/// Bounds on label ranges that do not need the document.
pub(super) fn check_labels(labels: &[PageLabelRange]) -> Result<()> {
    if labels.is_empty() {
        return Err(ToolError::Validation("No page labels provided".into()));
    }
    for label in labels {
        if !matches!(label.style.as_str(), "D" | "R" | "r" | "A" | "a") {
            return Err(ToolError::Validation(format!(
                "Invalid page label style '{}'. Use D, R, r, A or a.",
                label.style
            )));
        }
        if label.start_page < 1 {
            return Err(ToolError::Validation(format!(
                "Invalid label start page: {}",
                label.start_page
            )));
        }
        if label.start_at.is_some_and(|start| start < 1) {
            return Err(ToolError::Validation("Label numbering must start at 1 or above".into()));
        }
    }
    Ok(())
}

/// Writes `/PageLabels` as a number tree with a single `/Nums` array.
pub(super) fn add_page_labels(
    input: &ValidatedFile,
    labels: &[PageLabelRange],
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "add page labels";

    let mut doc = load_pdf(input, OP)?;
    let page_count = doc.get_pages().len() as i64;

    let mut ordered: Vec<&PageLabelRange> = labels.iter().collect();
    ordered.sort_by_key(|label| label.start_page);
    if let Some(pair) = ordered.windows(2).find(|pair| pair[0].start_page == pair[1].start_page) {
        return Err(ToolError::Validation(format!(
            "Duplicate label start page: {}",
            pair[0].start_page
        )));
    }
    if let Some(label) = ordered.iter().find(|label| label.start_page > page_count) {
        return Err(ToolError::Validation(format!(
            "Label start page {} is beyond the last page ({page_count})",
            label.start_page
        )));
    }

    let mut nums = Vec::with_capacity(ordered.len() * 2);
    for label in ordered {
        let mut entry = dictionary! { "S" => label.style.as_str() };
        if let Some(prefix) = &label.prefix {
            entry.set("P", encode_text(prefix));
        }
        if let Some(start_at) = label.start_at {
            entry.set("St", start_at);
        }
        nums.push(Object::Integer(label.start_page - 1));
        nums.push(Object::Dictionary(entry));
    }

    catalog_mut(&mut doc, OP)?.set("PageLabels", dictionary! { "Nums" => nums });
    let artifact = save_pdf(&mut doc, "page_labels_added", OP, stager)?;
    tracing::info!(ranges = labels.len(), "added page labels");
    Ok(OperationResult::Artifact(artifact))
}

pub(super) fn set_viewer_preferences(
    input: &ValidatedFile,
    layout: PageLayout,
    mode: PageMode,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "set viewer preferences";

    let mut doc = load_pdf(input, OP)?;
    let catalog = catalog_mut(&mut doc, OP)?;
    catalog.set("PageLayout", Object::Name(layout.pdf_name().as_bytes().to_vec()));
    catalog.set("PageMode", Object::Name(mode.pdf_name().as_bytes().to_vec()));

    let artifact = save_pdf(&mut doc, "viewer_prefs_updated", OP, stager)?;
    tracing::info!(?layout, ?mode, "set viewer preferences");
    Ok(OperationResult::Artifact(artifact))
}

/// Maps a request key to its Info dictionary key.
///
/// Known keys are matched case-insensitively; anything else is kept as
/// given, minus a leading slash.
fn info_key(key: &str) -> Result<String> {
    let trimmed = key.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return Err(ToolError::Validation(format!("Invalid metadata key '{key}'")));
    }
    let lower = trimmed.to_ascii_lowercase();
    Ok(INFO_KEYS
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map_or_else(|| trimmed.to_string(), |(_, name)| name.to_string()))
}

fn pdf_date(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

pub(super) fn set_metadata(
    input: &ValidatedFile,
    entries: &BTreeMap<String, String>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "set metadata";

    let normalized = entries
        .iter()
        .map(|(key, value)| Ok((info_key(key)?, value.as_str())))
        .collect::<Result<Vec<_>>>()?;

    let mut doc = load_pdf(input, OP)?;
    let mut info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve_dict(&doc, object).cloned())
        .unwrap_or_else(Dictionary::new);

    for (key, value) in &normalized {
        info.set(key.as_bytes().to_vec(), encode_text(value));
    }
    if !normalized.iter().any(|(key, _)| key == "ModDate") {
        info.set("ModDate", Object::string_literal(pdf_date(chrono::Utc::now())));
    }

    match doc.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) => {
            doc.objects.insert(id, Object::Dictionary(info));
        }
        Err(_) => {
            let id = doc.add_object(info);
            doc.trailer.set("Info", id);
        }
    }

    let artifact = save_pdf(&mut doc, "metadata_updated", OP, stager)?;
    tracing::info!(keys = normalized.len(), "updated metadata");
    Ok(OperationResult::Artifact(artifact))
}

/// Info entries keyed the way requests spell them, plus the page count.
pub(super) fn read_metadata(input: &ValidatedFile) -> Result<OperationResult> {
    const OP: &str = "read metadata";

    let doc = load_pdf(input, OP)?;
    let mut metadata = Map::new();
    if let Some(info) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve_dict(&doc, object))
    {
        for (key, value) in info.iter() {
            let key = String::from_utf8_lossy(key);
            let key = INFO_KEYS
                .iter()
                .find(|(_, name)| *name == key)
                .map_or_else(|| key.to_string(), |(alias, _)| alias.to_string());
            if let Some(text) = object_to_string(&doc, value) {
                metadata.insert(key, Value::String(text));
            }
        }
    }

    Ok(OperationResult::Data(json!({
        "metadata": metadata,
        "pages": doc.get_pages().len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::operations::catalog_id;
    use crate::scope::RequestScope;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn label(start_page: i64, style: &str) -> PageLabelRange {
        PageLabelRange {
            start_page,
            style: style.to_string(),
            prefix: None,
            start_at: None,
        }
    }

    #[test]
    fn test_layout_and_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&PageLayout::TwoColumnLeft).unwrap(),
            "\"two-column-left\""
        );
        assert_eq!(serde_json::from_str::<PageMode>("\"use-oc\"").unwrap(), PageMode::UseOc);
        assert_eq!(PageMode::UseOc.pdf_name(), "UseOC");
        assert_eq!(PageLayout::default().pdf_name(), "SinglePage");
    }

    #[test]
    fn test_info_key_normalization() {
        assert_eq!(info_key("title").unwrap(), "Title");
        assert_eq!(info_key("/Author").unwrap(), "Author");
        assert_eq!(info_key("Department").unwrap(), "Department");
        assert!(info_key("  ").is_err());
        assert!(info_key("two words").is_err());
    }

    #[test]
    fn test_check_labels() {
        assert!(check_labels(&[label(1, "r"), label(3, "D")]).is_ok());
        assert!(check_labels(&[label(1, "X")]).is_err());
        assert!(check_labels(&[label(0, "D")]).is_err());
        assert!(check_labels(&[]).is_err());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(2)).await;

        let entries = BTreeMap::from([
            ("title".to_string(), "Quarterly Report".to_string()),
            ("author".to_string(), "Finance".to_string()),
            ("Department".to_string(), "Ops".to_string()),
        ]);
        let result = set_metadata(&input, &entries, scope.stager()).unwrap();
        let bytes = std::fs::read(&result.artifact().unwrap().path).unwrap();

        let updated = fixtures::stage_pdf(&scope, "b.pdf", bytes).await;
        let read = read_metadata(&updated).unwrap();
        let data = read.data().unwrap();
        assert_eq!(data["pages"], 2);
        assert_eq!(data["metadata"]["title"], "Quarterly Report");
        assert_eq!(data["metadata"]["author"], "Finance");
        assert_eq!(data["metadata"]["Department"], "Ops");
        // Untouched entries survive
        assert_eq!(data["metadata"]["producer"], "tooltown fixtures");
        assert!(data["metadata"]["moddate"].as_str().unwrap().starts_with("D:"));
    }

    #[tokio::test]
    async fn test_viewer_preferences_written_as_names() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(1)).await;

        let result = set_viewer_preferences(
            &input,
            PageLayout::TwoPageRight,
            PageMode::FullScreen,
            scope.stager(),
        )
        .unwrap();
        let doc = fixtures::load(&result.artifact().unwrap().path);
        let catalog = doc.get_dictionary(catalog_id(&doc, "test").unwrap()).unwrap();
        assert_eq!(catalog.get(b"PageLayout").unwrap().as_name().unwrap(), b"TwoPageRight");
        assert_eq!(catalog.get(b"PageMode").unwrap().as_name().unwrap(), b"FullScreen");
    }

    #[tokio::test]
    async fn test_page_labels_sorted_into_nums() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(5)).await;

        let mut appendix = label(4, "A");
        appendix.prefix = Some("App-".into());
        appendix.start_at = Some(1);
        let labels = vec![appendix, label(1, "r")];

        let result = add_page_labels(&input, &labels, scope.stager()).unwrap();
        let doc = fixtures::load(&result.artifact().unwrap().path);
        let catalog = doc.get_dictionary(catalog_id(&doc, "test").unwrap()).unwrap();
        let labels = resolve_dict(&doc, catalog.get(b"PageLabels").unwrap()).unwrap();
        let nums = labels.get(b"Nums").unwrap().as_array().unwrap();

        assert_eq!(nums.len(), 4);
        assert_eq!(nums[0].as_i64().unwrap(), 0);
        assert_eq!(nums[2].as_i64().unwrap(), 3);
        let appendix = nums[3].as_dict().unwrap();
        assert_eq!(appendix.get(b"S").unwrap().as_name().unwrap(), b"A");
        assert_eq!(appendix.get(b"P").unwrap().as_str().unwrap(), b"App-");
    }

    #[tokio::test]
    async fn test_page_labels_beyond_last_page() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(2)).await;

        let err = add_page_labels(&input, &[label(3, "D")], scope.stager()).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
