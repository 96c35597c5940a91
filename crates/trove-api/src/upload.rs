//! Multipart intake shared by the upload and update endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::ApiError;

/// One file part pulled out of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
  pub file_name: String,
  pub mime_type: Option<String>,
  pub bytes:     Vec<u8>,
}

/// A fully-drained multipart request: file parts plus plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
  pub files:  Vec<UploadedFile>,
  pub fields: HashMap<String, String>,
}

impl UploadForm {
  /// Read a boolean text field, with `default` standing in when the field
  /// is absent or not a recognised boolean.
  pub fn bool_field(&self, name: &str, default: bool) -> bool {
    match self.fields.get(name).map(String::as_str) {
      Some("true") => true,
      Some("false") => false,
      _ => default,
    }
  }
}

/// Drain `multipart` into an [`UploadForm`]. Parts carrying a filename
/// become files; the rest are collected as text fields.
pub async fn collect(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
  let mut form = UploadForm::default();
  while let Some(field) = multipart.next_field().await.map_err(|e| {
    ApiError::BadRequest(format!("malformed multipart body: {e}"))
  })? {
    match field.file_name().map(str::to_owned) {
      Some(file_name) => {
        let mime_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(|e| {
          ApiError::BadRequest(format!("failed reading part `{file_name}`: {e}"))
        })?;
        form.files.push(UploadedFile {
          file_name,
          mime_type,
          bytes: bytes.to_vec(),
        });
      }
      None => {
        let name = field.name().unwrap_or_default().to_owned();
        let value = field.text().await.map_err(|e| {
          ApiError::BadRequest(format!("failed reading field `{name}`: {e}"))
        })?;
        form.fields.insert(name, value);
      }
    }
  }
  Ok(form)
}
