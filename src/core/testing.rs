//! In-process PostgREST stand-in used by unit tests. Rows are keyed by a
//! string `config_type` or `name`; a duplicate create answers 409 like a
//! unique constraint would. Requests without an `apikey` answer 401.
//! `tests/e2e_harness.rs` follows the same rules for the spawned binary.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub table: Option<String>,
    pub query: HashMap<String, String>,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
    pub prefer: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct StoreState {
    tables: HashMap<String, Vec<Value>>,
    requests: Vec<RecordedRequest>,
    table_failures: HashMap<String, u16>,
    patch_failures: HashMap<String, u16>,
    unreachable: bool,
}

type Shared = Arc<Mutex<StoreState>>;

pub struct MockStore {
    port: u16,
    state: Shared,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn key_column(row: &Value) -> Option<&'static str> {
    ["config_type", "name"]
        .into_iter()
        .find(|column| row.get(*column).and_then(Value::as_str).is_some())
}

async fn root(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
    st.requests.push(RecordedRequest {
        method: "GET".to_string(),
        table: None,
        query: HashMap::new(),
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        prefer: header(&headers, "prefer"),
        content_type: header(&headers, "content-type"),
        body: None,
    });
    if st.unreachable {
        return (StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
    }
    Json(json!({"swagger": "2.0"})).into_response()
}

async fn table(
    State(state): State<Shared>,
    method: Method,
    Path(table): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed: Option<Value> = serde_json::from_slice(&body).ok();
    let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
    st.requests.push(RecordedRequest {
        method: method.to_string(),
        table: Some(table.clone()),
        query: query.clone(),
        apikey: header(&headers, "apikey"),
        authorization: header(&headers, "authorization"),
        prefer: header(&headers, "prefer"),
        content_type: header(&headers, "content-type"),
        body: parsed.clone(),
    });

    if !headers.get("apikey").is_some_and(|v| !v.is_empty()) {
        return (StatusCode::UNAUTHORIZED, "missing apikey").into_response();
    }

    if let Some(status) = st.table_failures.get(&table).copied() {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (code, "internal error").into_response();
    }

    match method {
        Method::GET => {
            let rows = st.tables.get(&table).cloned().unwrap_or_default();
            Json(Value::Array(rows)).into_response()
        }
        Method::POST => {
            let Some(row) = parsed else {
                return (StatusCode::BAD_REQUEST, "invalid json").into_response();
            };
            let Some(column) = key_column(&row) else {
                return (StatusCode::BAD_REQUEST, "missing key column").into_response();
            };
            let rows = st.tables.entry(table).or_default();
            if rows.iter().any(|r| r.get(column) == row.get(column)) {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "code": "23505",
                        "message": "duplicate key value violates unique constraint"
                    })),
                )
                    .into_response();
            }
            rows.push(row);
            StatusCode::CREATED.into_response()
        }
        Method::PATCH => {
            if let Some(status) = st.patch_failures.get(&table).copied() {
                let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
                return (code, "patch rejected").into_response();
            }
            let Some(Value::Object(patch)) = parsed else {
                return (StatusCode::BAD_REQUEST, "invalid json").into_response();
            };
            let rows = st.tables.entry(table).or_default();
            for (column, filter) in &query {
                let Some(expected) = filter.strip_prefix("eq.") else {
                    continue;
                };
                for row in rows.iter_mut() {
                    if row.get(column).and_then(Value::as_str) == Some(expected)
                        && let Some(obj) = row.as_object_mut()
                    {
                        for (k, v) in &patch {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

impl MockStore {
    /// Starts the store, or returns `None` when the sandbox forbids binding.
    pub async fn start_or_skip() -> Option<Self> {
        match Self::start().await {
            Ok(store) => Some(store),
            Err(err) if err.to_string().contains("Operation not permitted") => {
                eprintln!("Skipping mock store test: socket bind not permitted");
                None
            }
            Err(err) => panic!("mock store failed to start: {}", err),
        }
    }

    pub async fn start() -> std::io::Result<Self> {
        let state: Shared = Arc::new(Mutex::new(StoreState::default()));
        let app = Router::new()
            .route("/rest/v1/", get(root))
            .route("/rest/v1/{table}", any(table))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.tables.get(table).cloned().unwrap_or_default()
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.tables.insert(table.to_string(), rows);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.requests.clone()
    }

    /// Every request against `table` answers `status`.
    pub fn fail_table(&self, table: &str, status: u16) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.table_failures.insert(table.to_string(), status);
    }

    pub fn fail_patch(&self, table: &str, status: u16) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.patch_failures.insert(table.to_string(), status);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.unreachable = unreachable;
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_without_apikey_are_rejected() {
        let Some(store) = MockStore::start_or_skip().await else {
            return;
        };
        let url = format!("{}/rest/v1/workflows_backup", store.base_url());
        let res = reqwest::Client::new().get(&url).send().await.unwrap();
        assert_eq!(res.status().as_u16(), 401);
        assert_eq!(store.requests().len(), 1);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn rows_need_a_string_key() {
        let Some(store) = MockStore::start_or_skip().await else {
            return;
        };
        let url = format!("{}/rest/v1/workflows_backup", store.base_url());
        let client = reqwest::Client::new();
        let post = |body: Value| {
            client
                .post(&url)
                .header("apikey", "k")
                .body(body.to_string())
                .send()
        };

        let res = post(json!({"name": 7, "data": {}})).await.unwrap();
        assert_eq!(res.status().as_u16(), 400);
        let res = post(json!({"name": "a", "config_type": null})).await.unwrap();
        assert_eq!(res.status().as_u16(), 201);
        let res = post(json!({"name": "a"})).await.unwrap();
        assert_eq!(res.status().as_u16(), 409);
        assert_eq!(store.rows("workflows_backup").len(), 1);
        store.shutdown().await;
    }
}
