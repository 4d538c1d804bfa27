//! In-process stand-in for the remote service, served by axum on a random
//! local port. Every handler records what it received in [`FakeState`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Value};

use view_data_client::{ClientConfig, ViewDataClient};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";

/// Item URN the fake answers with a 500
pub const BROKEN_ITEM: &str = "urn:adsk.viewing:fs.file:dXJu/output/broken.svf";

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub session_id: String,
    pub content_range: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct FakeState {
    pub token_requests: Vec<HashMap<String, String>>,
    pub token_expires_in: u64,
    pub authorization_headers: Vec<String>,

    pub buckets: HashSet<String>,
    pub created_buckets: Vec<Value>,

    pub objects: HashMap<String, Vec<u8>>,
    pub chunks: Vec<ChunkRecord>,

    pub registered: Vec<(String, bool)>,
    /// (status, progress) returned by successive status checks; the last
    /// entry repeats. Status "error" answers 500.
    pub status_script: VecDeque<(String, String)>,
    pub status_checks: usize,

    pub manifest: Value,
    pub items: HashMap<String, Vec<u8>>,
    pub thumbnail_queries: Vec<HashMap<String, String>>,
    pub thumbnail_urns: Vec<String>,
}

pub type Shared = Arc<Mutex<FakeState>>;

pub struct FakeService {
    pub base_url: String,
    pub state: Shared,
}

impl FakeService {
    pub async fn start(mut state: FakeState) -> Self {
        if state.token_expires_in == 0 {
            state.token_expires_in = 1799;
        }
        let state: Shared = Arc::new(Mutex::new(state));

        let app = Router::new()
            .route("/authentication/v1/authenticate", post(authenticate))
            .route("/oss/v1/buckets", get(list_buckets).post(create_bucket))
            .route("/oss/v1/buckets/:bucket/details", get(bucket_details))
            .route("/oss/v1/buckets/:bucket/objects/:object", put(upload_object))
            .route(
                "/oss/v1/buckets/:bucket/objects/:object/resumable",
                put(upload_chunk),
            )
            .route("/viewingservice/v1/register", post(register))
            .route("/viewingservice/v1/supported", get(supported))
            .route("/viewingservice/v1/thumbnails/:urn", get(thumbnail))
            .route("/viewingservice/v1/items/:item", get(item))
            .route("/viewingservice/v1/:urn", get(manifest))
            .route("/viewingservice/v1/:urn/status", get(status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake service");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(CLIENT_ID, CLIENT_SECRET);
        config.base_url = self.base_url.clone();
        config.default_bucket_key = "test-bucket".to_string();
        config.http_timeout = Duration::from_secs(10);
        config
    }

    pub fn client(&self) -> ViewDataClient {
        ViewDataClient::new(self.config()).expect("client")
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn check_auth(state: &mut FakeState, headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value.starts_with("Bearer token-") => {
            state.authorization_headers.push(value.to_string());
            Ok(())
        }
        _ => Err((StatusCode::UNAUTHORIZED, "missing token").into_response()),
    }
}

async fn authenticate(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.token_requests.push(form.clone());

    if form.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"developerMessage": "The client_id specified does not have access to the api product"})),
        )
            .into_response();
    }

    Json(json!({
        "access_token": format!("token-{}", state.token_requests.len()),
        "token_type": "Bearer",
        "expires_in": state.token_expires_in,
    }))
    .into_response()
}

async fn list_buckets(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    let mut keys: Vec<_> = state.buckets.iter().cloned().collect();
    keys.sort();
    let items: Vec<Value> = keys
        .into_iter()
        .map(|key| json!({"bucketKey": key, "createdDate": 1463785698187u64, "policyKey": "transient"}))
        .collect();
    Json(json!({ "items": items })).into_response()
}

async fn create_bucket(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    let key = body["bucketKey"].as_str().unwrap_or_default().to_string();
    if !state.buckets.insert(key.clone()) {
        return (StatusCode::CONFLICT, "Bucket already exists").into_response();
    }
    state.created_buckets.push(body.clone());

    Json(json!({
        "key": key,
        "owner": CLIENT_ID,
        "createDate": 1463785698187u64,
        "permissions": [{"serviceId": CLIENT_ID, "access": "full"}],
        "policy": body["policy"],
    }))
    .into_response()
}

async fn bucket_details(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    if !state.buckets.contains(&bucket) {
        return (StatusCode::NOT_FOUND, "Bucket not found").into_response();
    }

    Json(json!({
        "key": bucket,
        "owner": CLIENT_ID,
        "createDate": 1463785698187u64,
        "permissions": [],
        "policy": "transient",
    }))
    .into_response()
}

fn object_json(bucket: &str, object: &str, data: &[u8]) -> Value {
    json!({
        "bucket-key": bucket,
        "objects": [{
            "location": format!("/oss/v1/buckets/{}/objects/{}", bucket, object),
            "size": data.len(),
            "key": object,
            "id": format!("urn:adsk.objects:os.object:{}/{}", bucket, object),
            "content-type": "application/octet-stream",
        }]
    })
}

async fn upload_object(
    State(state): State<Shared>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    state.objects.insert(format!("{}/{}", bucket, object), body.to_vec());
    Json(object_json(&bucket, &object, &body)).into_response()
}

/// Parse "bytes 0-3/10" into (start, end, total)
fn parse_content_range(value: &str) -> Option<(usize, usize, usize)> {
    let (range, total) = value.strip_prefix("bytes ")?.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?, total.parse().ok()?))
}

async fn upload_chunk(
    State(state): State<Shared>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let session_id = header("session-id");
    let content_range = header("content-range");

    let Some((start, end, total)) = parse_content_range(&content_range) else {
        return (StatusCode::BAD_REQUEST, "bad Content-Range").into_response();
    };
    if end + 1 - start != body.len() {
        return (StatusCode::BAD_REQUEST, "length mismatch").into_response();
    }

    state.chunks.push(ChunkRecord {
        session_id: session_id.clone(),
        content_range,
        data: body.to_vec(),
    });

    let mut parts: Vec<(usize, Vec<u8>)> = state
        .chunks
        .iter()
        .filter(|c| c.session_id == session_id)
        .filter_map(|c| parse_content_range(&c.content_range).map(|(s, _, _)| (s, c.data.clone())))
        .collect();
    let received: usize = parts.iter().map(|(_, d)| d.len()).sum();

    if received < total {
        return StatusCode::ACCEPTED.into_response();
    }

    parts.sort_by_key(|(s, _)| *s);
    let assembled: Vec<u8> = parts.into_iter().flat_map(|(_, d)| d).collect();
    let response = object_json(&bucket, &object, &assembled);
    state.objects.insert(format!("{}/{}", bucket, object), assembled);
    Json(response).into_response()
}

async fn register(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    let urn = body["urn"].as_str().unwrap_or_default().to_string();
    let force = headers
        .get("x-ads-force")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "true")
        .unwrap_or(false);
    state.registered.push((urn, force));

    (StatusCode::CREATED, Json(json!({"Result": "Success"}))).into_response()
}

async fn supported(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    Json(json!({"extensions": ["dwf", "dwg", "rvt", "f3d"]})).into_response()
}

async fn thumbnail(
    State(state): State<Shared>,
    Path(urn): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    state.thumbnail_queries.push(query);
    state.thumbnail_urns.push(urn);
    (StatusCode::OK, vec![0x89u8, b'P', b'N', b'G']).into_response()
}

async fn item(
    State(state): State<Shared>,
    Path(item_urn): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    if item_urn == BROKEN_ITEM {
        return (StatusCode::INTERNAL_SERVER_ERROR, "derivative storage unavailable").into_response();
    }

    match state.items.get(&item_urn) {
        Some(data) => (StatusCode::OK, data.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "Item not found").into_response(),
    }
}

async fn manifest(
    State(state): State<Shared>,
    Path(urn): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    if state.manifest.is_null() || state.manifest["urn"] != urn.as_str() {
        return (StatusCode::NOT_FOUND, "Model not found").into_response();
    }
    Json(state.manifest.clone()).into_response()
}

async fn status(
    State(state): State<Shared>,
    Path(urn): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    if let Err(denied) = check_auth(&mut state, &headers) {
        return denied;
    }

    state.status_checks += 1;
    let entry = if state.status_script.len() > 1 {
        state.status_script.pop_front()
    } else {
        state.status_script.front().cloned()
    };

    match entry {
        None => (StatusCode::NOT_FOUND, "Model not registered").into_response(),
        Some((status, _)) if status == "error" => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response()
        }
        Some((status, progress)) => Json(json!({
            "guid": "dXJu",
            "urn": urn,
            "type": "design",
            "status": status,
            "progress": progress,
            "success": if progress == "complete" { "100%" } else { "0%" },
        }))
        .into_response(),
    }
}

/// Pending / in-progress / terminal status script
pub fn script(entries: &[(&str, &str)]) -> VecDeque<(String, String)> {
    entries
        .iter()
        .map(|(s, p)| (s.to_string(), p.to_string()))
        .collect()
}
