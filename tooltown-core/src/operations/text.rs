use super::{load_pdf, OperationResult};
use crate::error::{Result, ToolError};
use crate::validation::ValidatedFile;
use serde_json::{json, Map, Value};

/// Extracts text from the whole document, or page by page for a subset.
///
/// Requested pages outside the document are skipped rather than rejected.
pub(super) fn extract(input: &ValidatedFile, pages: Option<&[i64]>) -> Result<OperationResult> {
    const OP: &str = "extract text";

    let doc = load_pdf(input, OP)?;
    let page_count = doc.get_pages().len() as i64;

    match pages.filter(|pages| !pages.is_empty()) {
        None => {
            let all: Vec<u32> = doc.get_pages().keys().copied().collect();
            let text = doc
                .extract_text(&all)
                .map_err(|e| ToolError::library(OP, e))?;
            Ok(OperationResult::Data(json!({ "text": text })))
        }
        Some(requested) => {
            let mut by_page = Map::new();
            for &page in requested {
                if !(1..=page_count).contains(&page) {
                    tracing::debug!(page, page_count, "skipping page outside document");
                    continue;
                }
                let text = doc
                    .extract_text(&[page as u32])
                    .map_err(|e| ToolError::library(OP, e))?;
                by_page.insert(format!("page_{page}"), Value::String(text));
            }
            Ok(OperationResult::Data(Value::Object(by_page)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scope::RequestScope;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_whole_document_text() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let bytes = fixtures::pdf_with_texts(&["Hello", "World"]);
        let input = fixtures::stage_pdf(&scope, "a.pdf", bytes).await;

        let result = extract(&input, None).unwrap();
        let text = result.data().unwrap()["text"].as_str().unwrap().to_string();
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
    }

    #[tokio::test]
    async fn test_page_subset_skips_out_of_range() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(3)).await;

        let result = extract(&input, Some(&[3, 9, 0])).unwrap();
        let data = result.data().unwrap().as_object().unwrap();
        assert_eq!(data.len(), 1);
        assert!(data["page_3"].as_str().unwrap().contains("Page 3"));
    }
}
