//! Multipart intake: file parts are streamed straight into scratch storage,
//! text parts are kept for JSON-valued parameters.

use crate::error::AppError;
use axum::extract::Multipart;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tooltown_core::{FileKind, StagedFile, Stager, ToolError, UploadMeta};

const FILE_FIELDS: [&str; 3] = ["file", "files", "files[]"];

#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<StagedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Parses the text part `name` as JSON.
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.fields
            .get(name)
            .map(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| AppError::BadRequest(format!("Invalid JSON in '{name}': {e}")))
            })
            .transpose()
    }

    pub fn required_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, AppError> {
        self.json(name)?
            .ok_or_else(|| AppError::BadRequest(format!("Missing required field '{name}'")))
    }
}

/// Reads every part of `multipart`, staging file parts as `kind`.
pub async fn read_form(
    mut multipart: Multipart,
    stager: &Stager,
    kind: FileKind,
    max_files: usize,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        let is_file = FILE_FIELDS.contains(&name.as_str()) || field.file_name().is_some();

        if is_file {
            if form.files.len() >= max_files {
                return Err(ToolError::Validation(format!(
                    "Too many files: at most {max_files} are accepted per request"
                ))
                .into());
            }
            let meta = UploadMeta {
                file_name: field.file_name().map(str::to_string),
                content_type: field.content_type().map(str::to_string),
            };
            let staged = stager.stage(meta, kind, Box::pin(field)).await?;
            form.files.push(staged);
        } else {
            let value = field.text().await?;
            form.fields.insert(name, value);
        }
    }

    tracing::debug!(files = form.files.len(), fields = form.fields.len(), "read multipart form");
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_fields() {
        let mut form = UploadForm::default();
        form.fields.insert("field_data".into(), r#"{"name": "Ada"}"#.into());
        form.fields.insert("broken".into(), "{".into());

        let data: BTreeMap<String, String> = form.required_json("field_data").unwrap();
        assert_eq!(data["name"], "Ada");
        assert!(form.json::<BTreeMap<String, String>>("broken").is_err());
        assert!(form.json::<BTreeMap<String, String>>("absent").unwrap().is_none());
        assert!(form.required_json::<BTreeMap<String, String>>("absent").is_err());
    }
}
