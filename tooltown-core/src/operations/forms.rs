use super::{
    catalog_id, encode_text, load_pdf, object_to_f32, object_to_string, resolve_dict, save_pdf,
    OperationResult,
};
use crate::error::{Result, ToolError};
use crate::staging::Stager;
use crate::validation::ValidatedFile;
use lopdf::{Document, Object, ObjectId};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A terminal field of the AcroForm tree.
#[derive(Debug)]
struct Field {
    id: ObjectId,
    name: String,
    field_type: Option<Vec<u8>>,
    /// Widget annotations; the field itself when it has no kids.
    widgets: Vec<ObjectId>,
}

/// Walks `/AcroForm /Fields`, building dotted names and inheriting `/FT`.
fn collect_fields(doc: &Document, operation: &'static str) -> Result<Vec<Field>> {
    let root = doc
        .get_dictionary(catalog_id(doc, operation)?)
        .map_err(|e| ToolError::library(operation, e))?;
    let acroform = root
        .get(b"AcroForm")
        .ok()
        .and_then(|object| resolve_dict(doc, object))
        .ok_or_else(|| ToolError::Validation("PDF does not contain a form".into()))?;
    let top: Vec<ObjectId> = acroform
        .get(b"Fields")
        .ok()
        .and_then(|object| super::resolve(doc, object).as_array().ok())
        .map(|items| items.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default();

    let mut fields = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(ObjectId, Option<String>, Option<Vec<u8>>)> =
        top.into_iter().rev().map(|id| (id, None, None)).collect();

    while let Some((id, parent_name, parent_type)) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Ok(dict) = doc.get_dictionary(id) else {
            continue;
        };
        let partial = dict
            .get(b"T")
            .ok()
            .and_then(|t| object_to_string(doc, t));
        let name = match (&parent_name, partial) {
            (Some(parent), Some(partial)) => Some(format!("{parent}.{partial}")),
            (None, Some(partial)) => Some(partial),
            (parent, None) => parent.clone(),
        };
        let field_type = dict
            .get(b"FT")
            .and_then(Object::as_name)
            .ok()
            .map(<[u8]>::to_vec)
            .or(parent_type);

        let kids: Vec<ObjectId> = dict
            .get(b"Kids")
            .ok()
            .and_then(|k| super::resolve(doc, k).as_array().ok())
            .map(|items| items.iter().filter_map(|o| o.as_reference().ok()).collect())
            .unwrap_or_default();

        // Kids without /T are widgets of this field rather than sub-fields.
        let (widgets, subfields): (Vec<ObjectId>, Vec<ObjectId>) =
            kids.into_iter().partition(|kid| {
                doc.get_dictionary(*kid).map(|d| !d.has(b"T")).unwrap_or(true)
            });

        if subfields.is_empty() {
            if let Some(name) = name {
                fields.push(Field {
                    id,
                    name,
                    field_type,
                    widgets: if widgets.is_empty() { vec![id] } else { widgets },
                });
            }
        } else {
            for kid in subfields.into_iter().rev() {
                stack.push((kid, name.clone(), field_type.clone()));
            }
        }
    }
    Ok(fields)
}

fn type_name(field_type: Option<&[u8]>) -> &'static str {
    match field_type {
        Some(b"Tx") => "text",
        Some(b"Btn") => "button",
        Some(b"Ch") => "choice",
        Some(b"Sig") => "signature",
        _ => "unknown",
    }
}

/// Reads an attribute from the field or, failing that, its ancestors.
fn field_attribute<'a>(doc: &'a Document, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = id;
    for _ in 0..32 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

pub(super) fn extract(input: &ValidatedFile) -> Result<OperationResult> {
    const OP: &str = "extract form";

    let doc = load_pdf(input, OP)?;
    let fields = collect_fields(&doc, OP)?;

    let mut out = Map::new();
    for field in &fields {
        let value = field_attribute(&doc, field.id, b"V")
            .and_then(|v| object_to_string(&doc, v))
            .map_or(Value::Null, Value::String);
        let flags = field_attribute(&doc, field.id, b"Ff")
            .and_then(|f| f.as_i64().ok())
            .unwrap_or(0);
        let rect = field
            .widgets
            .first()
            .and_then(|w| doc.get_dictionary(*w).ok())
            .and_then(|w| w.get(b"Rect").ok())
            .and_then(|r| super::resolve(&doc, r).as_array().ok())
            .map(|values| values.iter().filter_map(object_to_f32).collect::<Vec<_>>());

        out.insert(
            field.name.clone(),
            json!({
                "type": type_name(field.field_type.as_deref()),
                "value": value,
                "flags": flags,
                "rect": rect,
            }),
        );
    }

    tracing::info!(fields = out.len(), "extracted form fields");
    Ok(OperationResult::Data(json!({ "form_fields": out })))
}

/// Whether the widget's normal appearance has a `state` entry; `None` without `/AP /N`.
fn has_appearance_state(doc: &Document, widget: ObjectId, state: &[u8]) -> Option<bool> {
    let dict = doc.get_dictionary(widget).ok()?;
    let appearance = resolve_dict(doc, dict.get(b"AP").ok()?)?;
    let normal = resolve_dict(doc, appearance.get(b"N").ok()?)?;
    Some(normal.has(state))
}

/// Sets `/V` on each named field and asks viewers to regenerate appearances.
pub(super) fn fill(
    input: &ValidatedFile,
    values: &BTreeMap<String, String>,
    stager: &Stager,
) -> Result<OperationResult> {
    const OP: &str = "fill form";

    let mut doc = load_pdf(input, OP)?;
    let fields = collect_fields(&doc, OP)?;
    let by_name: BTreeMap<&str, &Field> = fields.iter().map(|f| (f.name.as_str(), f)).collect();

    let unknown: Vec<&str> = values
        .keys()
        .map(String::as_str)
        .filter(|name| !by_name.contains_key(name))
        .collect();
    if !unknown.is_empty() {
        return Err(ToolError::Validation(format!(
            "Unknown form fields: {}",
            unknown.join(", ")
        )));
    }

    for (name, value) in values {
        let field = by_name[name.as_str()];
        let is_button = field.field_type.as_deref() == Some(b"Btn");
        let new_value = if is_button {
            Object::Name(value.as_bytes().to_vec())
        } else {
            encode_text(value)
        };

        doc.get_dictionary_mut(field.id)
            .map_err(|e| ToolError::library(OP, e))?
            .set("V", new_value);
        if is_button {
            let states: Vec<(ObjectId, &[u8])> = field
                .widgets
                .iter()
                .map(|&widget| {
                    let on = has_appearance_state(&doc, widget, value.as_bytes()).unwrap_or(true);
                    (widget, if on { value.as_bytes() } else { b"Off".as_slice() })
                })
                .collect();
            for (widget, state) in states {
                if let Ok(dict) = doc.get_dictionary_mut(widget) {
                    dict.set("AS", Object::Name(state.to_vec()));
                }
            }
        }
    }

    let root_id = catalog_id(&doc, OP)?;
    let acroform_ref = doc
        .get_dictionary(root_id)
        .and_then(|root| root.get(b"AcroForm"))
        .map_err(|e| ToolError::library(OP, e))?
        .clone();
    match acroform_ref {
        Object::Reference(id) => doc
            .get_dictionary_mut(id)
            .map_err(|e| ToolError::library(OP, e))?
            .set("NeedAppearances", true),
        _ => {
            let root = doc
                .get_dictionary_mut(root_id)
                .map_err(|e| ToolError::library(OP, e))?;
            if let Ok(Object::Dictionary(acroform)) = root.get_mut(b"AcroForm") {
                acroform.set("NeedAppearances", true);
            }
        }
    }

    let artifact = save_pdf(&mut doc, "filled", OP, stager)?;
    tracing::info!(fields = values.len(), "filled form");
    Ok(OperationResult::Artifact(artifact))
}
