//! HTTP client for the storage service's document API.

use std::time::Duration;

use reqwest::{
  Client, Response, StatusCode,
  header::AUTHORIZATION,
  multipart::{Form, Part},
  redirect,
};
use serde::Deserialize;
use trove_core::transfer::NewTransfer;
use uuid::Uuid;

use crate::{Error, Result};

const DOCUMENT_ID_HEADER: &str = "x-document-id";
const DOCUMENT_NAME_HEADER: &str = "x-document-name";

/// An uploaded file on its way to the storage service.
#[derive(Debug, Clone)]
pub struct FileUpload {
  pub file_name:     String,
  pub mime_type:     Option<String>,
  pub bytes:         Vec<u8>,
  /// The caller's authorization header, forwarded verbatim.
  pub authorization: Option<String>,
}

/// Identity the storage service assigned to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
  pub document_id:   String,
  pub document_name: String,
}

/// A redirected upload whose bytes still have to reach the redirect target.
#[derive(Debug, Clone)]
pub struct PendingTransfer {
  pub document_id:   String,
  pub document_name: String,
  pub target_url:    String,
  pub content_type:  String,
  pub body:          Vec<u8>,
}

impl PendingTransfer {
  /// Turn the pending hand-off into a durable queue item for `record_key`.
  pub fn into_transfer(
    self,
    record_key: Uuid,
    org_id: impl Into<String>,
    user_id: impl Into<String>,
    max_attempts: u32,
  ) -> NewTransfer {
    NewTransfer {
      record_key,
      org_id: org_id.into(),
      user_id: user_id.into(),
      target_url: self.target_url,
      document_id: self.document_id,
      document_name: self.document_name,
      content_type: self.content_type,
      body: self.body,
      max_attempts,
    }
  }
}

/// Outcome of a storage hand-off.
#[derive(Debug, Clone)]
pub enum StorageUpload {
  /// The storage service stored the bytes and answered with the final
  /// document identity.
  Stored(DocumentRef),
  /// The storage service redirected. It issued a provisional identity and
  /// expects the bytes at [`PendingTransfer::target_url`]; the caller can
  /// proceed with the provisional identity while the transfer runs in the
  /// background.
  Redirected(PendingTransfer),
}

impl StorageUpload {
  pub fn document_ref(&self) -> DocumentRef {
    match self {
      Self::Stored(doc) => doc.clone(),
      Self::Redirected(pending) => DocumentRef {
        document_id:   pending.document_id.clone(),
        document_name: pending.document_name.clone(),
      },
    }
  }
}

/// Response body of a direct (non-redirected) upload.
#[derive(Debug, Deserialize)]
struct UploadResponse {
  #[serde(rename = "_id")]
  id:            String,
  #[serde(rename = "documentName")]
  document_name: String,
}

/// Async HTTP client for the storage service.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based. Redirects
/// are never followed: the 308 a large upload answers with carries the
/// transfer target and must surface to the caller.
#[derive(Clone)]
pub struct StorageClient {
  client:   Client,
  endpoint: String,
}

impl StorageClient {
  pub fn new(endpoint: impl Into<String>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .redirect(redirect::Policy::none())
      .build()?;
    Ok(Self { client, endpoint: endpoint.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api/v1{}", self.endpoint.trim_end_matches('/'), path)
  }

  /// `POST /api/v1/document/upload`
  ///
  /// Hands the file to the storage service and reports which of the two
  /// outcomes happened. Any status other than success or 308 is an error.
  pub async fn save_file_to_storage(
    &self,
    upload: FileUpload,
    document_path: &str,
    is_versioned: bool,
  ) -> Result<StorageUpload> {
    let mut part =
      Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
    if let Some(mime) = &upload.mime_type {
      part = part.mime_str(mime)?;
    }
    let form = Form::new()
      .part("file", part)
      .text("documentPath", document_path.to_owned())
      .text("isVersionedFile", is_versioned.to_string())
      .text("documentName", upload.file_name.clone());

    let mut req =
      self.client.post(self.url("/document/upload")).multipart(form);
    if let Some(auth) = &upload.authorization {
      req = req.header(AUTHORIZATION, auth.as_str());
    }
    let resp = req.send().await?;

    let status = resp.status();
    if status == StatusCode::PERMANENT_REDIRECT {
      let target_url = header_str(&resp, "location")?;
      let document_id = header_str(&resp, DOCUMENT_ID_HEADER)?;
      let document_name = header_str(&resp, DOCUMENT_NAME_HEADER)?;
      return Ok(StorageUpload::Redirected(PendingTransfer {
        document_id,
        document_name,
        target_url,
        content_type: "application/octet-stream".into(),
        body: upload.bytes,
      }));
    }
    if !status.is_success() {
      return Err(unexpected_status(resp).await);
    }

    let body: UploadResponse = resp.json().await?;
    Ok(StorageUpload::Stored(DocumentRef {
      document_id:   body.id,
      document_name: body.document_name,
    }))
  }

  /// `POST /api/v1/document/{id}/uploadNextVersion`
  ///
  /// Appends a new version to an existing document. There is no redirect
  /// branch on this path; failures surface directly.
  pub async fn upload_next_version(
    &self,
    document_id: &str,
    upload: FileUpload,
  ) -> Result<()> {
    let mut part = Part::bytes(upload.bytes).file_name(upload.file_name);
    if let Some(mime) = &upload.mime_type {
      part = part.mime_str(mime)?;
    }
    let form = Form::new().part("file", part);

    let mut req = self
      .client
      .post(self.url(&format!("/document/{document_id}/uploadNextVersion")))
      .multipart(form);
    if let Some(auth) = &upload.authorization {
      req = req.header(AUTHORIZATION, auth.as_str());
    }
    let resp = req.send().await?;

    if !resp.status().is_success() {
      return Err(unexpected_status(resp).await);
    }
    Ok(())
  }
}

fn header_str(resp: &Response, name: &'static str) -> Result<String> {
  resp
    .headers()
    .get(name)
    .and_then(|value| value.to_str().ok())
    .map(str::to_owned)
    .ok_or(Error::MissingHeader(name))
}

async fn unexpected_status(resp: Response) -> Error {
  let status = resp.status().as_u16();
  let body = resp.text().await.unwrap_or_default();
  Error::UnexpectedStatus { status, body }
}
