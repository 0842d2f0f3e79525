use super::fonts::{helvetica_width, literal, type1_font};
use super::{
    load_pdf, page_dimensions, page_resources, resolve_dict, save_pdf, select_pages,
    OperationResult,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const FONT_SIZE: f32 = 60.0;
const FONT_NAME: &str = "TTWmFont";
const STATE_NAME: &str = "TTWmGS";

/// Stamps `text` diagonally across the centre of each selected page.
///
/// The original content is wrapped in `q`/`Q` so its graphics state cannot
/// leak into the stamp. The text is set in WinAnsi-encoded Helvetica, so it
/// is limited to Latin-1; other characters are rejected when the request is
/// checked.
pub(super) fn apply(
    input: &ValidatedFile,
    text: &str,
    opacity: f32,
    pages: Option<&[i64]>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "watermark";

    let mut doc = load_pdf(input, OP)?;
    let page_map = doc.get_pages();
    let selected = select_pages(pages, page_map.len() as u32)?;

    let font_id = doc.add_object(type1_font("Helvetica"));
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => opacity,
        "CA" => opacity,
    });

    for (number, page_id) in page_map {
        if selected.contains(&number) {
            stamp_page(&mut doc, page_id, text, font_id, state_id)
                .map_err(|e| ToolError::library(OP, e))?;
        }
    }

    let artifact = save_pdf(&mut doc, "watermarked", OP, stager)?;
    tracing::info!(pages = selected.len(), opacity, "applied watermark");
    Ok(OperationResult::Artifact(artifact))
}

fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    text: &str,
    font_id: ObjectId,
    state_id: ObjectId,
) -> lopdf::Result<()> {
    let (width, height) = page_dimensions(doc, page_id);

    let mut resources = page_resources(doc, page_id);
    add_resource(doc, &mut resources, b"Font", FONT_NAME, font_id);
    add_resource(doc, &mut resources, b"ExtGState", STATE_NAME, state_id);

    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(contents @ Object::Reference(_)) => vec![contents.clone()],
        _ => Vec::new(),
    };

    // Shrink long text so it still fits along the page diagonal.
    let diagonal = (width * width + height * height).sqrt();
    let natural = helvetica_width(text, FONT_SIZE);
    let size = if natural > diagonal * 0.9 {
        FONT_SIZE * diagonal * 0.9 / natural
    } else {
        FONT_SIZE
    };
    let text_width = helvetica_width(text, size);

    let (sin, cos) = 45f32.to_radians().sin_cos();
    let stamp = format!(
        "Q\nq\n/{STATE_NAME} gs\n0.5 0.5 0.5 rg\n\
         {cos:.4} {sin:.4} {neg_sin:.4} {cos:.4} {cx:.2} {cy:.2} cm\n\
         BT\n/{FONT_NAME} {size:.2} Tf\n{dx:.2} {dy:.2} Td\n{text} Tj\nET\nQ\n",
        neg_sin = -sin,
        cx = width / 2.0,
        cy = height / 2.0,
        dx = -text_width / 2.0,
        dy = -size * 0.35,
        text = literal(text),
    );

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(Dictionary::new(), stamp.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    let page = doc.get_dictionary_mut(page_id)?;
    page.set("Resources", resources);
    page.set("Contents", contents);
    Ok(())
}

/// Adds `name => id` to a resource category, copying a referenced
/// sub-dictionary inline so other pages sharing it are untouched.
fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) {
    let mut entries = resources
        .get(category)
        .ok()
        .and_then(|object| resolve_dict(doc, object).cloned())
        .unwrap_or_default();
    entries.set(name, id);
    resources.set(category, entries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scope::RequestScope;
    use tempfile::TempDir;

    fn page_streams(doc: &Document, page: u32) -> Vec<String> {
        let page_id = doc.get_pages()[&page];
        match doc.get_dictionary(page_id).unwrap().get(b"Contents").unwrap() {
            Object::Array(items) => items
                .iter()
                .map(|item| {
                    let id = item.as_reference().unwrap();
                    let stream = doc.get_object(id).unwrap().as_stream().unwrap();
                    let bytes = stream
                        .decompressed_content()
                        .unwrap_or_else(|_| stream.content.clone());
                    String::from_utf8_lossy(&bytes).into_owned()
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_watermark_wraps_original_content() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(2)).await;

        let result = apply(&input, "CONFIDENTIAL", 0.3, None, scope.stager()).unwrap();
        let doc = fixtures::load(&result.artifact().unwrap().path);

        for page in 1..=2 {
            let streams = page_streams(&doc, page);
            assert_eq!(streams.len(), 3);
            assert_eq!(streams[0].trim(), "q");
            assert!(streams[2].starts_with("Q\n"));
            assert!(streams[2].contains("(CONFIDENTIAL) Tj"));
        }
        assert!(fixtures::page_text(&result.artifact().unwrap().path, 1).contains("Page 1"));
    }

    #[tokio::test]
    async fn test_watermark_only_selected_pages() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(3)).await;

        let result = apply(&input, "DRAFT", 0.5, Some(&[2]), scope.stager()).unwrap();
        let doc = fixtures::load(&result.artifact().unwrap().path);

        assert_eq!(page_streams(&doc, 2).len(), 3);
        let first = doc.get_dictionary(doc.get_pages()[&1]).unwrap();
        assert!(matches!(first.get(b"Contents").unwrap(), Object::Reference(_)));
    }

    #[tokio::test]
    async fn test_watermark_rejects_invalid_pages() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let input = fixtures::stage_pdf(&scope, "a.pdf", fixtures::sample_pdf(1)).await;

        let err = apply(&input, "DRAFT", 0.5, Some(&[0, 2]), scope.stager()).unwrap_err();
        assert!(matches!(err, ToolError::Range { ref invalid, .. } if invalid == &vec![0, 2]));
    }
}
