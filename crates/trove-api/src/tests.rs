//! Endpoint tests: the full router against an in-memory store, with the
//! storage service mocked out.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, Response, StatusCode, header::CONTENT_TYPE, request},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt as _;
use trove_core::{
  event::{EventStream, PushCommand},
  principal::{RelationshipType, Role},
  transfer::TransferStore,
};
use trove_notify::LiveGateway;
use trove_relations::RelationService;
use trove_storage::StorageClient;
use trove_store_sqlite::SqliteStore;

use crate::{AppState, api_router};

const BOUNDARY: &str = "X-TROVE-TEST-BOUNDARY";

async fn make_state(storage_url: &str) -> AppState<SqliteStore> {
  let store = Arc::new(
    SqliteStore::open_in_memory()
      .await
      .expect("in-memory store"),
  );
  AppState {
    store:                 store.clone(),
    relations:             RelationService::new(store),
    storage:               StorageClient::new(storage_url).unwrap(),
    gateway:               Arc::new(LiveGateway::new()),
    transfer_max_attempts: 3,
  }
}

fn request_as(user: &str, method: &str, uri: &str) -> request::Builder {
  Request::builder()
    .method(method)
    .uri(uri)
    .header("x-user-id", user)
    .header("x-org-id", "org-1")
    .header("x-user-email", format!("{user}@example.com"))
}

fn request(method: &str, uri: &str) -> request::Builder {
  request_as("u-1", method, uri)
}

async fn send(
  state: &AppState<SqliteStore>,
  req: Request<Body>,
) -> Response<Body> {
  api_router(state.clone()).oneshot(req).await.unwrap()
}

async fn body_json(resp: Response<Body>) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ── Multipart builders ──

fn text_part(name: &str, value: &str) -> String {
  format!(
    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
  )
}

fn file_part(file_name: &str, content: &str) -> String {
  format!(
    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; \
     filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n{content}\r\n"
  )
}

fn multipart(
  builder: request::Builder,
  parts: &[String],
) -> Request<Body> {
  builder
    .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
    .body(Body::from(format!("{}--{BOUNDARY}--\r\n", parts.concat())))
    .unwrap()
}

fn json_body(builder: request::Builder, value: Value) -> Request<Body> {
  builder
    .header(CONTENT_TYPE, "application/json")
    .body(Body::from(value.to_string()))
    .unwrap()
}

async fn mock_upload(
  server: &mut mockito::ServerGuard,
  id: &str,
  hits: usize,
) -> mockito::Mock {
  server
    .mock("POST", "/api/v1/document/upload")
    .with_status(200)
    .with_header("content-type", "application/json")
    .with_body(json!({ "_id": id, "documentName": "stored.pdf" }).to_string())
    .expect(hits)
    .create_async()
    .await
}

/// Upload one file and return the created record's id.
async fn seed_record(
  state: &AppState<SqliteStore>,
  server: &mut mockito::ServerGuard,
  name: &str,
) -> String {
  let _upload = mock_upload(server, "doc-1", 1).await;
  let resp = send(
    state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[file_part(
      name, "content",
    )]),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body = body_json(resp).await;
  body["records"][0]["id"].as_str().unwrap().to_owned()
}

// ─── Upload ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_creates_records_and_publishes_events() {
  let mut server = mockito::Server::new_async().await;
  let mock = mock_upload(&mut server, "doc-1", 2).await;
  let state = make_state(&server.url()).await;

  let resp = send(
    &state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[
      file_part("a.pdf", "alpha"),
      file_part("b.pdf", "beta"),
    ]),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::CREATED);
  let body = body_json(resp).await;
  let records = body["records"].as_array().unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(records[0]["recordName"], "a.pdf");
  assert_eq!(records[0]["version"], 1);
  assert_eq!(records[0]["origin"], "UPLOAD");
  assert_eq!(records[0]["externalRecordId"], "doc-1");
  assert_eq!(records[0]["fileRecord"]["sizeInBytes"], 5);
  mock.assert_async().await;

  let events = state.store.fetch_after(0, 10).await.unwrap();
  assert_eq!(events.len(), 2);
  assert!(events.iter().all(|e| e.event == "newRecord"));
  assert_eq!(events[0].assigned_to.as_deref(), Some("u-1"));
  assert_eq!(events[0].payload["recordName"], "a.pdf");
}

#[tokio::test]
async fn upload_without_files_is_rejected_by_default() {
  let state = make_state("http://127.0.0.1:1").await;

  let resp =
    send(&state, multipart(request("POST", "/api/v1/knowledgeBase"), &[]))
      .await;

  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = body_json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("no files"));
}

#[tokio::test]
async fn upload_without_files_passes_when_not_strict() {
  let state = make_state("http://127.0.0.1:1").await;

  let resp = send(
    &state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[text_part(
      "strictFileUpload",
      "false",
    )]),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["records"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn redirected_upload_leaves_a_durable_transfer() {
  let mut server = mockito::Server::new_async().await;
  let _redirect = server
    .mock("POST", "/api/v1/document/upload")
    .with_status(308)
    .with_header("location", "https://bucket.example/put/doc-9")
    .with_header("x-document-id", "doc-9")
    .with_header("x-document-name", "big.pdf")
    .create_async()
    .await;
  let state = make_state(&server.url()).await;

  let resp = send(
    &state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[file_part(
      "big.pdf", "oversized",
    )]),
  )
  .await;

  // The caller gets the provisional identity without waiting.
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body = body_json(resp).await;
  assert_eq!(body["records"][0]["externalRecordId"], "doc-9");

  let counts = state.store.counts().await.unwrap();
  assert_eq!(counts.pending, 1);
}

#[tokio::test]
async fn upload_failure_leaves_no_records_behind() {
  let mut server = mockito::Server::new_async().await;
  let _failing = server
    .mock("POST", "/api/v1/document/upload")
    .with_status(503)
    .with_body("maintenance")
    .create_async()
    .await;
  let state = make_state(&server.url()).await;

  let resp = send(
    &state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[file_part(
      "a.pdf", "alpha",
    )]),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
  let list =
    send(&state, request("GET", "/api/v1/knowledgeBase/records").body(Body::empty()).unwrap())
      .await;
  let body = body_json(list).await;
  assert_eq!(body["pagination"]["totalCount"], 0);
}

#[tokio::test]
async fn missing_identity_headers_is_rejected() {
  let state = make_state("http://127.0.0.1:1").await;

  let resp = send(
    &state,
    Request::builder()
      .method("GET")
      .uri("/api/v1/knowledgeBase/records")
      .header("x-org-id", "org-1")
      .body(Body::empty())
      .unwrap(),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = body_json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

// ─── Listing and lookup ──────────────────────────────────────────────────────

#[tokio::test]
async fn listing_paginates_and_reports_totals() {
  let mut server = mockito::Server::new_async().await;
  let _upload = mock_upload(&mut server, "doc-1", 3).await;
  let state = make_state(&server.url()).await;

  let resp = send(
    &state,
    multipart(request("POST", "/api/v1/knowledgeBase"), &[
      file_part("a.pdf", "1"),
      file_part("b.pdf", "2"),
      file_part("c.pdf", "3"),
    ]),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);

  let uri = "/api/v1/knowledgeBase/records?limit=2&page=1&sortBy=recordName&sortOrder=asc";
  let body =
    body_json(send(&state, request("GET", uri).body(Body::empty()).unwrap()).await)
      .await;
  let records = body["records"].as_array().unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(records[0]["recordName"], "a.pdf");
  assert_eq!(body["pagination"]["totalCount"], 3);
  assert_eq!(body["pagination"]["totalPages"], 2);

  let uri = "/api/v1/knowledgeBase/records?limit=2&page=2&sortBy=recordName&sortOrder=asc";
  let body =
    body_json(send(&state, request("GET", uri).body(Body::empty()).unwrap()).await)
      .await;
  assert_eq!(body["records"].as_array().unwrap().len(), 1);
  assert_eq!(body["records"][0]["recordName"], "c.pdf");
}

#[tokio::test]
async fn listing_rejects_unknown_filter_values() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    request("GET", "/api/v1/knowledgeBase/records?recordTypes=BOGUS")
      .body(Body::empty())
      .unwrap(),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = body_json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("BOGUS"));
}

#[tokio::test]
async fn get_returns_the_bundle_and_unknown_ids_are_404() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    request("GET", &format!("/api/v1/knowledgeBase/records/{id}"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["recordName"], "a.pdf");
  assert_eq!(body["fileRecord"]["fileName"], "a.pdf");

  let resp = send(
    &state,
    request(
      "GET",
      &format!("/api/v1/knowledgeBase/records/{}", uuid::Uuid::new_v4()),
    )
    .body(Body::empty())
    .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_applies_patch_and_announces_it() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    multipart(
      request("PUT", &format!("/api/v1/knowledgeBase/records/{id}")),
      &[text_part("record", r#"{"recordName":"renamed.pdf"}"#)],
    ),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["recordName"], "renamed.pdf");

  let events = state.store.fetch_after(0, 10).await.unwrap();
  assert_eq!(events.last().unwrap().event, "updateRecord");
}

#[tokio::test]
async fn update_rejects_immutable_fields() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    multipart(
      request("PUT", &format!("/api/v1/knowledgeBase/records/{id}")),
      &[text_part("record", r#"{"orgId":"org-2"}"#)],
    ),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = body_json(resp).await;
  assert!(body["error"].as_str().unwrap().contains("orgId"));

  // Nothing changed.
  let body = body_json(
    send(
      &state,
      request("GET", &format!("/api/v1/knowledgeBase/records/{id}"))
        .body(Body::empty())
        .unwrap(),
    )
    .await,
  )
  .await;
  assert_eq!(body["orgId"], "org-1");
}

#[tokio::test]
async fn update_with_file_part_bumps_the_version() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;
  let version_mock = server
    .mock("POST", "/api/v1/document/doc-1/uploadNextVersion")
    .with_status(200)
    .create_async()
    .await;

  let resp = send(
    &state,
    multipart(
      request("PUT", &format!("/api/v1/knowledgeBase/records/{id}")),
      &[file_part("a-v2.pdf", "second version")],
    ),
  )
  .await;

  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["version"], 2);
  assert_eq!(body["recordName"], "a-v2.pdf");
  assert_eq!(body["fileRecord"]["fileName"], "a-v2.pdf");
  assert_eq!(body["fileRecord"]["sizeInBytes"], 14);
  version_mock.assert_async().await;
}

// ─── Delete and archive ──────────────────────────────────────────────────────

#[tokio::test]
async fn delete_soft_deletes_and_hides_from_listing() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    request("DELETE", &format!("/api/v1/knowledgeBase/records/{id}"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["isDeleted"], true);
  assert_eq!(body["deletedByUserId"], "u-1");

  let body = body_json(
    send(
      &state,
      request("GET", "/api/v1/knowledgeBase/records")
        .body(Body::empty())
        .unwrap(),
    )
    .await,
  )
  .await;
  assert_eq!(body["pagination"]["totalCount"], 0);

  let events = state.store.fetch_after(0, 10).await.unwrap();
  assert_eq!(events.last().unwrap().event, "deleteRecord");
}

#[tokio::test]
async fn archive_round_trip() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let resp = send(
    &state,
    request("PATCH", &format!("/api/v1/knowledgeBase/records/{id}/archive"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["isArchived"], true);
  assert_eq!(body["archivedBy"], "u-1");

  let resp = send(
    &state,
    request("PATCH", &format!("/api/v1/knowledgeBase/records/{id}/unarchive"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body = body_json(resp).await;
  assert_eq!(body["isArchived"], false);
  // The last archival stays attributable.
  assert_eq!(body["archivedBy"], "u-1");
}

#[tokio::test]
async fn readers_can_read_but_not_mutate() {
  let mut server = mockito::Server::new_async().await;
  let state = make_state(&server.url()).await;
  let id = seed_record(&state, &mut server, "a.pdf").await;

  let reader = state
    .relations
    .find_or_create_user("u-2", "u-2@example.com", "org-1", None)
    .await
    .unwrap();
  let kb = state.relations.get_or_create_knowledge_base("org-1").await.unwrap();
  state
    .relations
    .create_kb_user_permission(kb.id, reader.id, RelationshipType::User, Role::Reader)
    .await
    .unwrap();

  let resp = send(
    &state,
    request_as("u-2", "GET", &format!("/api/v1/knowledgeBase/records/{id}"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);

  let resp = send(
    &state,
    request_as("u-2", "DELETE", &format!("/api/v1/knowledgeBase/records/{id}"))
      .body(Body::empty())
      .unwrap(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// ─── Push dispatch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_user_requires_a_live_connection() {
  let state = make_state("http://127.0.0.1:1").await;

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/user/u-9"),
      json!({ "event": "ping", "data": { "n": 1 } }),
    ),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);

  let (tx, mut rx) = mpsc::unbounded_channel::<PushCommand>();
  state.gateway.register("u-9", "org-1", tx);

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/user/u-9"),
      json!({ "event": "ping", "data": { "n": 1 } }),
    ),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let pushed = rx.recv().await.unwrap();
  assert_eq!(pushed.event, "ping");
  assert_eq!(pushed.data["n"], 1);
}

#[tokio::test]
async fn notify_org_fans_out_to_member_connections() {
  let state = make_state("http://127.0.0.1:1").await;
  let (tx_a, mut rx_a) = mpsc::unbounded_channel::<PushCommand>();
  let (tx_b, mut rx_b) = mpsc::unbounded_channel::<PushCommand>();
  state.gateway.register("u-1", "org-1", tx_a);
  state.gateway.register("u-2", "org-1", tx_b);

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/org/org-1"),
      json!({ "event": "maintenance", "data": {} }),
    ),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(rx_a.recv().await.unwrap().event, "maintenance");
  assert_eq!(rx_b.recv().await.unwrap().event, "maintenance");

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/org/org-2"),
      json!({ "event": "maintenance", "data": {} }),
    ),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn broadcast_reports_the_delivery_count() {
  let state = make_state("http://127.0.0.1:1").await;

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/broadcast"),
      json!({ "event": "announce", "data": {} }),
    ),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(body_json(resp).await["delivered"], 0);

  let (tx_a, _rx_a) = mpsc::unbounded_channel::<PushCommand>();
  let (tx_b, _rx_b) = mpsc::unbounded_channel::<PushCommand>();
  state.gateway.register("u-1", "org-1", tx_a);
  state.gateway.register("u-2", "org-2", tx_b);

  let resp = send(
    &state,
    json_body(
      request("POST", "/api/v1/notifications/notify/broadcast"),
      json!({ "event": "announce", "data": {} }),
    ),
  )
  .await;
  assert_eq!(body_json(resp).await["delivered"], 2);
}
