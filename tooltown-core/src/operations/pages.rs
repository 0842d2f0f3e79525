//! Page-tree operations: merge, split, rotate.

use super::{
    inherited_attribute, load_pdf, save_pdf, select_pages, strip_structural_streams,
    OperationResult,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{dictionary, Document, Object, ObjectId};

// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Concatenates every input's pages, in input order, under a new page tree.
pub(super) fn merge(inputs: &[ValidatedFile], stager: &Stager) -> Result<OperationResult> {
    const OP: &str = "merge";

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();

    for input in inputs {
        let mut doc = load_pdf(input, OP)?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let source_pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &source_pages {
            // The source page tree is discarded, so inherited values move onto the page.
            let inherited: Vec<(&[u8], Object)> = INHERITABLE
                .iter()
                .filter_map(|key| {
                    inherited_attribute(&doc, page_id, key).map(|value| (*key, value))
                })
                .collect();
            let page = doc
                .get_dictionary_mut(page_id)
                .map_err(|e| ToolError::library(OP, e))?;
            for (key, value) in inherited {
                if !page.has(key) {
                    page.set(key, value);
                }
            }
        }

        tracing::debug!(
            file_name = %input.original_name(),
            pages = source_pages.len(),
            "appending document"
        );
        page_ids.extend(source_pages);
        merged.objects.extend(doc.objects);
    }

    let pages_id = (next_id, 0);
    merged.max_id = next_id;
    for &page_id in &page_ids {
        if let Ok(page) = merged.get_dictionary_mut(page_id) {
            page.set("Parent", pages_id);
        }
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    strip_structural_streams(&mut merged);
    merged.prune_objects();
    merged.renumber_objects();

    let artifact = save_pdf(&mut merged, "merged", OP, stager)?;
    tracing::info!(files = inputs.len(), pages = page_ids.len(), "merged PDFs");
    Ok(OperationResult::Artifact(artifact))
}

/// Keeps pages `start..=end`; `end` defaults to and is clamped at the last page.
pub(super) fn split(
    input: &ValidatedFile,
    start: i64,
    end: Option<i64>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "split";

    let mut doc = load_pdf(input, OP)?;
    let pages = doc.get_pages();
    let page_count = pages.len() as i64;
    let last = end.unwrap_or(page_count).min(page_count);

    if start < 1 || start > page_count || start > last {
        return Err(ToolError::Range {
            message: format!(
                "Invalid page range: {start}-{} for a PDF with {page_count} pages",
                end.unwrap_or(page_count)
            ),
            invalid: vec![start, end.unwrap_or(page_count)],
        });
    }

    for (&number, &page_id) in pages.iter().rev() {
        let number = i64::from(number);
        if number < start || number > last {
            remove_page(&mut doc, page_id).map_err(|e| ToolError::library(OP, e))?;
        }
    }
    doc.prune_objects();

    let artifact = save_pdf(&mut doc, format!("split_{start}_to_{last}"), OP, stager)?;
    Ok(OperationResult::Artifact(artifact))
}

/// Detaches a page from its parent and fixes `Count` up the tree.
fn remove_page(doc: &mut Document, page_id: ObjectId) -> lopdf::Result<()> {
    let parent_id = doc
        .get_dictionary(page_id)?
        .get(b"Parent")?
        .as_reference()?;

    if let Ok(Object::Array(kids)) = doc.get_dictionary_mut(parent_id)?.get_mut(b"Kids") {
        kids.retain(|kid| !matches!(kid, Object::Reference(id) if *id == page_id));
    }

    let mut ancestor = Some(parent_id);
    while let Some(node_id) = ancestor {
        let node = doc.get_dictionary_mut(node_id)?;
        if let Ok(Object::Integer(count)) = node.get_mut(b"Count") {
            *count -= 1;
        }
        ancestor = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    doc.objects.remove(&page_id);
    Ok(())
}

/// Adds `degrees` clockwise to each selected page's effective rotation.
pub(super) fn rotate(
    input: &ValidatedFile,
    degrees: i64,
    pages: Option<&[i64]>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "rotate";

    let mut doc = load_pdf(input, OP)?;
    let page_map = doc.get_pages();
    let selected = select_pages(pages, page_map.len() as u32)?;

    for (number, page_id) in page_map {
        if !selected.contains(&number) {
            continue;
        }
        let current = inherited_attribute(&doc, page_id, b"Rotate")
            .and_then(|value| value.as_i64().ok())
            .unwrap_or(0);
        let rotation = (current + degrees).rem_euclid(360);
        doc.get_dictionary_mut(page_id)
            .map_err(|e| ToolError::library(OP, e))?
            .set("Rotate", rotation);
    }

    let artifact = save_pdf(&mut doc, "rotated", OP, stager)?;
    tracing::info!(degrees, pages = selected.len(), "rotated pages");
    Ok(OperationResult::Artifact(artifact))
}
