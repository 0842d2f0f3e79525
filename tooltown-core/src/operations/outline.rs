//! Document outline (bookmarks) and generated table-of-contents pages.

use super::fonts::{helvetica_width, literal, type1_font};
use super::{
    catalog_id, encode_text, load_pdf, object_to_string, page_numbers, resolve, resolve_dict,
    save_pdf, Bookmark, OperationResult, TocEntry,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

// Named destination chains and name trees are followed at most this deep.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Serialize, PartialEq)]
struct OutlineItem {
    level: u32,
    title: String,
    /// 1-based target page, -1 when the destination cannot be resolved
    page: i64,
}

fn outline_root(doc: &Document) -> Option<ObjectId> {
    let root = doc.get_dictionary(doc.trailer.get(b"Root").ok()?.as_reference().ok()?).ok()?;
    root.get(b"Outlines").ok()?.as_reference().ok()
}

fn first_child(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(id).ok()?.get(b"First").ok()?.as_reference().ok()
}

fn next_sibling(doc: &Document, id: ObjectId) -> Option<ObjectId> {
    doc.get_dictionary(id).ok()?.get(b"Next").ok()?.as_reference().ok()
}

fn children(doc: &Document, parent: ObjectId, visited: &mut HashSet<ObjectId>) -> Vec<ObjectId> {
    let mut out = Vec::new();
    let mut current = first_child(doc, parent);
    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        out.push(id);
        current = next_sibling(doc, id);
    }
    out
}

/// Looks `name` up in the catalog's `/Dests` dictionary or `/Names /Dests` tree.
fn named_destination<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a Object> {
    let catalog = doc.get_dictionary(catalog_id(doc, "outline").ok()?).ok()?;
    if let Some(dests) = catalog.get(b"Dests").ok().and_then(|d| resolve_dict(doc, d)) {
        if let Ok(found) = dests.get(name) {
            return Some(found);
        }
    }
    let tree = catalog
        .get(b"Names")
        .ok()
        .and_then(|n| resolve_dict(doc, n))?
        .get(b"Dests")
        .ok()
        .and_then(|d| resolve_dict(doc, d))?;
    search_name_tree(doc, tree, name, 0)
}

fn search_name_tree<'a>(
    doc: &'a Document,
    node: &'a Dictionary,
    name: &[u8],
    depth: usize,
) -> Option<&'a Object> {
    if depth > MAX_DEPTH {
        return None;
    }
    if let Some(pairs) = node.get(b"Names").ok().and_then(|n| resolve(doc, n).as_array().ok()) {
        for pair in pairs.chunks_exact(2) {
            if resolve(doc, &pair[0]).as_str().ok() == Some(name) {
                return Some(&pair[1]);
            }
        }
    }
    let kids = node.get(b"Kids").ok().and_then(|k| resolve(doc, k).as_array().ok())?;
    kids.iter()
        .filter_map(|kid| resolve_dict(doc, kid))
        .find_map(|kid| search_name_tree(doc, kid, name, depth + 1))
}

fn destination_page(
    doc: &Document,
    dest: &Object,
    pages: &BTreeMap<ObjectId, u32>,
    depth: usize,
) -> Option<u32> {
    if depth > MAX_DEPTH {
        return None;
    }
    match resolve(doc, dest) {
        Object::Array(items) => pages.get(&items.first()?.as_reference().ok()?).copied(),
        Object::String(name, _) | Object::Name(name) => {
            destination_page(doc, named_destination(doc, name)?, pages, depth + 1)
        }
        Object::Dictionary(dict) => destination_page(doc, dict.get(b"D").ok()?, pages, depth + 1),
        _ => None,
    }
}

fn item_page(doc: &Document, item: &Dictionary, pages: &BTreeMap<ObjectId, u32>) -> Option<u32> {
    if let Ok(dest) = item.get(b"Dest") {
        return destination_page(doc, dest, pages, 0);
    }
    let action = resolve_dict(doc, item.get(b"A").ok()?)?;
    if action.get(b"S").and_then(Object::as_name).ok()? != b"GoTo" {
        return None;
    }
    destination_page(doc, action.get(b"D").ok()?, pages, 0)
}

pub(super) fn extract(input: &ValidatedFile) -> Result<OperationResult> {
    const OP: &str = "extract outline";

    let doc = load_pdf(input, OP)?;
    let pages = page_numbers(&doc);
    let mut items = Vec::new();

    if let Some(root) = outline_root(&doc) {
        let mut visited = HashSet::from([root]);
        let mut stack: Vec<(ObjectId, u32)> = children(&doc, root, &mut visited)
            .into_iter()
            .rev()
            .map(|id| (id, 1))
            .collect();
        while let Some((id, level)) = stack.pop() {
            let Ok(dict) = doc.get_dictionary(id) else {
                continue;
            };
            items.push(OutlineItem {
                level,
                title: dict
                    .get(b"Title")
                    .ok()
                    .and_then(|t| object_to_string(&doc, t))
                    .unwrap_or_default(),
                page: item_page(&doc, dict, &pages).map_or(-1, i64::from),
            });
            for child in children(&doc, id, &mut visited).into_iter().rev() {
                stack.push((child, level + 1));
            }
        }
    }

    tracing::info!(items = items.len(), "extracted outline");
    Ok(OperationResult::Data(json!({ "outline": items })))
}

/// Returns the outline dictionary id, creating an empty one if needed.
fn ensure_outline_root(doc: &mut Document, operation: &'static str) -> Result<ObjectId> {
    if let Some(id) = outline_root(doc) {
        return Ok(id);
    }
    let root_id = catalog_id(doc, operation)?;
    let existing = doc
        .get_dictionary(root_id)
        .ok()
        .and_then(|root| root.get(b"Outlines").ok())
        .and_then(|o| o.as_dict().ok())
        .cloned();
    let mut outlines = existing.unwrap_or_else(|| dictionary! { "Type" => "Outlines" });
    outlines.remove(b"Count");
    let id = doc.add_object(outlines);
    doc.get_dictionary_mut(root_id)
        .map_err(|e| ToolError::library(operation, e))?
        .set("Outlines", id);
    Ok(id)
}

fn append_child(doc: &mut Document, parent: ObjectId, child: ObjectId) -> lopdf::Result<()> {
    let last = doc
        .get_dictionary(parent)?
        .get(b"Last")
        .and_then(Object::as_reference)
        .ok();
    match last {
        Some(last) => {
            doc.get_dictionary_mut(last)?.set("Next", child);
            doc.get_dictionary_mut(child)?.set("Prev", last);
        }
        None => doc.get_dictionary_mut(parent)?.set("First", child),
    }
    doc.get_dictionary_mut(parent)?.set("Last", child);
    Ok(())
}

/// Rewrites `/Count` below `id` and returns how many descendants are visible.
///
/// A negative existing count marks a closed item and is kept closed.
fn recompute_counts(
    doc: &mut Document,
    id: ObjectId,
    visited: &mut HashSet<ObjectId>,
    depth: usize,
) -> i64 {
    let kids = children(doc, id, visited);
    if kids.is_empty() || depth > MAX_DEPTH * 4 {
        return 0;
    }
    let total: i64 = kids
        .iter()
        .map(|kid| 1 + recompute_counts(doc, *kid, visited, depth + 1))
        .sum();
    let Ok(dict) = doc.get_dictionary_mut(id) else {
        return 0;
    };
    let closed = dict.get(b"Count").and_then(Object::as_i64).is_ok_and(|c| c < 0);
    let is_root = dict.get(b"Type").and_then(Object::as_name).is_ok_and(|t| t == b"Outlines");
    if closed && !is_root {
        dict.set("Count", -total);
        0
    } else {
        dict.set("Count", total);
        total
    }
}

/// Appends bookmarks to the document outline.
///
/// `parent_title` may name an existing item or one added earlier in the
/// same request.
pub(super) fn add_bookmarks(
    input: &ValidatedFile,
    bookmarks: &[Bookmark],
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "add bookmarks";

    let mut doc = load_pdf(input, OP)?;
    let page_ids = doc.get_pages();
    let page_count = page_ids.len() as i64;

    for bookmark in bookmarks {
        if !(1..=page_count).contains(&bookmark.page) {
            return Err(ToolError::Validation(format!(
                "Invalid page number for bookmark '{}': {}. PDF has {page_count} pages.",
                bookmark.title, bookmark.page
            )));
        }
    }

    let root = ensure_outline_root(&mut doc, OP)?;

    let mut by_title: HashMap<String, ObjectId> = HashMap::new();
    let mut visited = HashSet::from([root]);
    let mut stack = children(&doc, root, &mut visited);
    while let Some(id) = stack.pop() {
        if let Some(title) = doc
            .get_dictionary(id)
            .ok()
            .and_then(|d| d.get(b"Title").ok())
            .and_then(|t| object_to_string(&doc, t))
        {
            by_title.entry(title).or_insert(id);
        }
        stack.extend(children(&doc, id, &mut visited));
    }

    for bookmark in bookmarks {
        let parent = match &bookmark.parent_title {
            None => root,
            Some(title) => *by_title.get(title).ok_or_else(|| {
                ToolError::Validation(format!("Parent bookmark '{title}' not found"))
            })?,
        };

        let target = page_ids[&(bookmark.page as u32)];
        let mut item = dictionary! {
            "Title" => encode_text(&bookmark.title),
            "Parent" => parent,
            "Dest" => vec![target.into(), "Fit".into()],
        };
        if let Some([r, g, b]) = bookmark.color {
            let rgb = [r, g, b].map(|c| Object::Real(c.clamp(0.0, 1.0)));
            item.set("C", rgb.to_vec());
        }
        let item_id = doc.add_object(item);
        append_child(&mut doc, parent, item_id).map_err(|e| ToolError::library(OP, e))?;
        by_title.entry(bookmark.title.clone()).or_insert(item_id);
    }

    recompute_counts(&mut doc, root, &mut HashSet::from([root]), 0);

    let artifact = save_pdf(&mut doc, "bookmarks_added", OP, stager)?;
    tracing::info!(bookmarks = bookmarks.len(), "added bookmarks");
    Ok(OperationResult::Artifact(artifact))
}

// Letter-size TOC layout, in points
const TOC_WIDTH: f32 = 612.0;
const TOC_HEIGHT: f32 = 792.0;
const TOC_TOP: f32 = 692.0;
const TOC_BOTTOM: f32 = 72.0;
const LINE_STEP: f32 = 20.0;
const ENTRY_SIZE: f32 = 12.0;
const NUMBER_X: f32 = 500.0;

/// Inserts table-of-contents pages at the front of the document, each entry
/// linking to its target page.
pub(super) fn create_toc(
    input: &ValidatedFile,
    entries: &[TocEntry],
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "create table of contents";

    let mut doc = load_pdf(input, OP)?;
    let page_ids = doc.get_pages();
    let page_count = page_ids.len() as i64;
    if let Some(bad) = entries.iter().find(|e| !(1..=page_count).contains(&e.page)) {
        return Err(ToolError::Validation(format!(
            "Invalid page number for '{}': {}. PDF has {page_count} pages.",
            bad.title, bad.page
        )));
    }

    let pages_root = doc
        .get_dictionary(catalog_id(&doc, OP)?)
        .and_then(|root| root.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| ToolError::library(OP, e))?;

    let regular = doc.add_object(type1_font("Helvetica"));
    let bold = doc.add_object(type1_font("Helvetica-Bold"));
    let resources = dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
    };

    let lines_per_page = ((TOC_TOP - TOC_BOTTOM) / LINE_STEP) as usize + 1;
    let mut toc_pages = Vec::new();
    for chunk in entries.chunks(lines_per_page) {
        let mut content = String::new();
        if toc_pages.is_empty() {
            let heading = literal("Table of Contents");
            content.push_str(&format!("BT\n/F2 16 Tf\n72 720 Td\n{heading} Tj\nET\n"));
        }
        let mut annots = Vec::with_capacity(chunk.len());
        let mut y = TOC_TOP;
        for entry in chunk {
            let x = 72.0 + entry.level.min(10) as f32 * 20.0;
            let title_width = helvetica_width(&entry.title, ENTRY_SIZE);
            let dot_width = helvetica_width(". ", ENTRY_SIZE);
            let gap = NUMBER_X - 10.0 - (x + title_width);
            let dots = if gap > dot_width {
                ". ".repeat((gap / dot_width) as usize)
            } else {
                String::new()
            };

            content.push_str(&format!(
                "BT\n/F1 {ENTRY_SIZE} Tf\n{x:.2} {y:.2} Td\n{} Tj\nET\n",
                literal(&entry.title)
            ));
            if !dots.is_empty() {
                content.push_str(&format!(
                    "BT\n/F1 {ENTRY_SIZE} Tf\n{:.2} {y:.2} Td\n{} Tj\nET\n",
                    x + title_width,
                    literal(&dots)
                ));
            }
            content.push_str(&format!(
                "BT\n/F1 {ENTRY_SIZE} Tf\n{NUMBER_X:.2} {y:.2} Td\n({}) Tj\nET\n",
                entry.page
            ));

            let target = page_ids[&(entry.page as u32)];
            annots.push(Object::from(doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => vec![
                    x.into(),
                    (y - 4.0).into(),
                    (NUMBER_X + 24.0).into(),
                    (y + ENTRY_SIZE).into(),
                ],
                "Border" => vec![0.into(), 0.into(), 0.into()],
                "Dest" => vec![target.into(), "Fit".into()],
            })));
            y -= LINE_STEP;
        }

        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_root,
            "MediaBox" => vec![0.into(), 0.into(), TOC_WIDTH.into(), TOC_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => resources.clone(),
            "Annots" => annots,
        });
        toc_pages.push(page_id);
    }

    let root = doc
        .get_dictionary_mut(pages_root)
        .map_err(|e| ToolError::library(OP, e))?;
    let mut kids: Vec<Object> = toc_pages.iter().map(|id| Object::from(*id)).collect();
    if let Ok(existing) = root.get(b"Kids").and_then(Object::as_array) {
        kids.extend(existing.iter().cloned());
    }
    let count = root.get(b"Count").and_then(Object::as_i64).unwrap_or(page_count);
    root.set("Kids", kids);
    root.set("Count", count + toc_pages.len() as i64);

    let artifact = save_pdf(&mut doc, "toc_added", OP, stager)?;
    tracing::info!(entries = entries.len(), pages = toc_pages.len(), "created table of contents");
    Ok(OperationResult::Artifact(artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scope::RequestScope;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn bookmark(title: &str, page: i64, parent: Option<&str>) -> Bookmark {
        Bookmark {
            title: title.to_string(),
            page,
            parent_title: parent.map(str::to_string),
            color: None,
        }
    }

    async fn outline_of(scope: &RequestScope, path: &std::path::Path) -> Vec<serde_json::Value> {
        let staged = fixtures::stage_pdf(scope, "out.pdf", std::fs::read(path).unwrap()).await;
        extract(&staged).unwrap().data().unwrap()["outline"].as_array().unwrap().clone()
    }

    #[tokio::test]
    async fn test_document_without_outline_is_empty() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(2)).await;

        let result = extract(&input).unwrap();
        assert_eq!(result.data().unwrap()["outline"], json!([]));
    }

    #[tokio::test]
    async fn test_bookmarks_nest_under_parent() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(4)).await;

        let mut intro = bookmark("Intro", 1, None);
        intro.color = Some([1.0, 0.0, 0.0]);
        let marks = vec![
            intro,
            bookmark("Chapter 1", 2, None),
            bookmark("Section 1.1", 3, Some("Chapter 1")),
            bookmark("Section 1.2", 4, Some("Chapter 1")),
        ];
        let result = add_bookmarks(&input, &marks, scope.stager()).unwrap();
        let outline = outline_of(&scope, &result.artifact().unwrap().path).await;

        assert_eq!(
            outline,
            vec![
                json!({"level": 1, "title": "Intro", "page": 1}),
                json!({"level": 1, "title": "Chapter 1", "page": 2}),
                json!({"level": 2, "title": "Section 1.1", "page": 3}),
                json!({"level": 2, "title": "Section 1.2", "page": 4}),
            ]
        );

        let doc = fixtures::load(&result.artifact().unwrap().path);
        let root = outline_root(&doc).unwrap();
        assert_eq!(doc.get_dictionary(root).unwrap().get(b"Count").unwrap().as_i64().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_bookmarks_append_to_existing_outline() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(3)).await;

        let first = add_bookmarks(&input, &[bookmark("One", 1, None)], scope.stager()).unwrap();
        let bytes = std::fs::read(&first.artifact().unwrap().path).unwrap();
        let staged = fixtures::stage_pdf(&scope, "b.pdf", bytes).await;
        let nested = [bookmark("Three", 3, Some("One"))];
        let second = add_bookmarks(&staged, &nested, scope.stager()).unwrap();

        let outline = outline_of(&scope, &second.artifact().unwrap().path).await;
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[1], json!({"level": 2, "title": "Three", "page": 3}));
    }

    #[tokio::test]
    async fn test_bookmark_errors() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(2)).await;

        let bad_page =
            add_bookmarks(&input, &[bookmark("Nowhere", 5, None)], scope.stager()).unwrap_err();
        assert!(matches!(bad_page, ToolError::Validation(_)));

        let orphan = add_bookmarks(&input, &[bookmark("Child", 1, Some("Missing"))], scope.stager())
            .unwrap_err();
        assert!(matches!(orphan, ToolError::Validation(ref m) if m.contains("Missing")));
    }

    #[tokio::test]
    async fn test_toc_is_inserted_in_front() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(3)).await;

        let entries = vec![
            TocEntry { title: "Start".into(), page: 1, level: 0 },
            TocEntry { title: "Details".into(), page: 3, level: 1 },
        ];
        let result = create_toc(&input, &entries, scope.stager()).unwrap();
        let path = &result.artifact().unwrap().path;

        assert_eq!(fixtures::page_count(path), 4);
        let toc_text = fixtures::page_text(path, 1);
        assert!(toc_text.contains("Table of Contents"));
        assert!(toc_text.contains("Details"));
        assert!(fixtures::page_text(path, 2).contains("Page 1"));

        let doc = fixtures::load(path);
        let toc_page = doc.get_dictionary(doc.get_pages()[&1]).unwrap();
        let annots = toc_page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 2);
        let link = doc.get_dictionary(annots[1].as_reference().unwrap()).unwrap();
        let dest = link.get(b"Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), doc.get_pages()[&4]);
    }

    #[tokio::test]
    async fn test_toc_spills_onto_extra_pages() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(1)).await;

        let entries: Vec<TocEntry> = (0..40)
            .map(|i| TocEntry { title: format!("Entry {i}"), page: 1, level: 0 })
            .collect();
        let result = create_toc(&input, &entries, scope.stager()).unwrap();
        assert_eq!(fixtures::page_count(&result.artifact().unwrap().path), 3);
    }

    #[tokio::test]
    async fn test_toc_rejects_out_of_range_page() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(1)).await;

        let entries = vec![TocEntry { title: "Ghost".into(), page: 2, level: 0 }];
        assert!(matches!(
            create_toc(&input, &entries, scope.stager()),
            Err(ToolError::Validation(_))
        ));
    }
}
