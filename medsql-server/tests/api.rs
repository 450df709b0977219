//! HTTP API tests driven through the router without a socket.
//!
//! The database and the generation service are in-process doubles, so
//! these run without containers or network access.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use medsql_core::{
    BindValue, ColumnInfo, ConnectionConfig, DatabaseAdapter, ExecutionOutcome, GenerationError,
    MedSqlError, PipelineConfig, QueryMode, QueryPipeline, Result, ScalarValue, SchemaFetchError,
    SchemaSnapshot, TextGenerator,
};
use medsql_server::{AppState, router};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct FakeDatabase {
    reachable: bool,
    executed: Mutex<Vec<(String, Vec<BindValue>, QueryMode)>>,
}

impl FakeDatabase {
    fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable,
            executed: Mutex::new(Vec::new()),
        })
    }

    fn executed(&self) -> Vec<(String, Vec<BindValue>, QueryMode)> {
        self.executed.lock().unwrap().clone()
    }

    fn refused() -> MedSqlError {
        MedSqlError::connection_failed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }
}

#[async_trait]
impl DatabaseAdapter for FakeDatabase {
    async fn test_connection(&self) -> Result<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(Self::refused())
        }
    }

    async fn fetch_schema(
        &self,
        _namespace: &str,
    ) -> std::result::Result<SchemaSnapshot, SchemaFetchError> {
        if !self.reachable {
            return Err(SchemaFetchError::message("connection refused"));
        }
        Ok(SchemaSnapshot::from_catalog_rows(vec![
            (
                "patients".to_string(),
                ColumnInfo::new("id", "integer", false, None),
            ),
            (
                "patients".to_string(),
                ColumnInfo::new("first_name", "text", false, None),
            ),
        ]))
    }

    async fn execute_bound(
        &self,
        sql: &str,
        args: &[BindValue],
        mode: QueryMode,
    ) -> Result<ExecutionOutcome> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec(), mode));
        if !self.reachable {
            return Err(Self::refused());
        }
        if sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            Ok(ExecutionOutcome::Rows {
                columns: vec!["id".to_string(), "first_name".to_string()],
                rows: vec![vec![ScalarValue::Int(1), ScalarValue::Text("Asha".to_string())]],
            })
        } else {
            Ok(ExecutionOutcome::Acknowledgement { rows_affected: 1 })
        }
    }

    fn engine_name(&self) -> &'static str {
        "Fake"
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
    }
}

struct Scripted {
    responses: Mutex<VecDeque<std::result::Result<String, GenerationError>>>,
}

impl Scripted {
    fn new<I>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = std::result::Result<String, GenerationError>>,
    {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
        })
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::malformed_output("script exhausted")))
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "api-test"
    }
}

fn app<I>(database: Arc<FakeDatabase>, responses: I) -> axum::Router
where
    I: IntoIterator<Item = std::result::Result<String, GenerationError>>,
{
    let pipeline = QueryPipeline::new(database, Scripted::new(responses), PipelineConfig::default());
    router(Arc::new(AppState::new(pipeline)))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_query_returns_rows() {
    let database = FakeDatabase::new(true);
    let app = app(
        database.clone(),
        [Ok("```sql\nSELECT id, first_name FROM patients LIMIT 100;\n```".to_string())],
    );

    let (status, body) = send(app, post_json("/api/query", &json!({"query": "show all patients"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "show all patients");
    assert_eq!(body["sql"], "SELECT id, first_name FROM patients LIMIT 100;");
    assert_eq!(body["result"], json!([{"id": 1, "first_name": "Asha"}]));
    assert!(body.get("warning").is_none());

    let executed = database.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].2, QueryMode::ReadOnly);
}

#[tokio::test]
async fn test_api_empty_query_is_bad_request() {
    let database = FakeDatabase::new(true);
    let app = app(database.clone(), []);

    let (status, body) = send(app, post_json("/api/query", &json!({"query": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Query cannot be empty");
    assert!(database.executed().is_empty());
}

#[tokio::test]
async fn test_api_read_endpoint_denies_delete() {
    let database = FakeDatabase::new(true);
    let app = app(database.clone(), [Ok("DELETE FROM patients".to_string())]);

    // The body asks for readwrite; /api/read forces read mode.
    let (status, body) = send(
        app,
        post_json(
            "/api/read",
            &json!({"query": "delete all patients", "mode": "readwrite"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["sql"].as_str().unwrap().starts_with("SELECT 1 AS message"));

    let executed = database.executed();
    assert_eq!(executed.len(), 1);
    assert!(!executed[0].0.contains("DELETE"));
    assert_eq!(executed[0].2, QueryMode::ReadOnly);
}

#[tokio::test]
async fn test_api_readwrite_update_is_acknowledged() {
    let database = FakeDatabase::new(true);
    let app = app(
        database.clone(),
        [Ok("UPDATE patients SET first_name = 'Asha' WHERE id = 1".to_string())],
    );

    let (status, body) = send(
        app,
        post_json(
            "/api/query",
            &json!({"query": "rename patient 1", "mode": "readwrite"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["rows_affected"], 1);
    assert_eq!(database.executed()[0].2, QueryMode::ReadWrite);
}

#[tokio::test]
async fn test_api_quota_error_is_too_many_requests() {
    let database = FakeDatabase::new(true);
    let app = app(
        database.clone(),
        [Err(GenerationError::quota_exceeded("HTTP 429: RESOURCE_EXHAUSTED"))],
    );

    let (status, body) = send(app, post_json("/api/query", &json!({"query": "show all patients"}))).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("RESOURCE_EXHAUSTED"));
    assert!(body.get("sql").is_none());
    assert!(database.executed().is_empty());
}

#[tokio::test]
async fn test_api_generation_network_error_is_bad_gateway() {
    let app = app(
        FakeDatabase::new(true),
        [Err(GenerationError::network("connection reset"))],
    );

    let (status, _) = send(app, post_json("/api/query", &json!({"query": "show all patients"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_api_health() {
    let (status, body) = send(app(FakeDatabase::new(true), []), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["generator"]["provider"], "scripted");
    assert_eq!(body["generator"]["model"], "api-test");
    assert_eq!(body["pool"]["engine"], "Fake");
    assert_eq!(body["pool"]["max_connections"], 10);
    assert_eq!(body["pool"]["statement_timeout_ms"], 30_000);

    let (status, body) = send(app(FakeDatabase::new(false), []), get("/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["pool"]["max_connections"], 10);
}

#[tokio::test]
async fn test_api_schema_endpoints() {
    let (status, body) = send(app(FakeDatabase::new(true), []), get("/api/schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patients"][0]["column"], "id");
    assert_eq!(body["patients"][1]["column"], "first_name");

    let (status, body) = send(
        app(FakeDatabase::new(true), []),
        Request::builder()
            .method("POST")
            .uri("/api/schema/refresh")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tables"], 1);
    assert_eq!(body["columns"], 2);

    let (status, body) = send(app(FakeDatabase::new(false), []), get("/api/schema")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_api_query_with_degraded_schema_warns() {
    let database = FakeDatabase::new(false);
    let app = app(database, [Ok("SELECT 1".to_string())]);

    let (status, body) = send(app, post_json("/api/query", &json!({"query": "anything"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["warning"].is_string());
    assert!(body["result"]["error"].is_string());
}

#[tokio::test]
async fn test_api_reports() {
    let (status, body) = send(app(FakeDatabase::new(true), []), get("/api/reports")).await;
    assert_eq!(status, StatusCode::OK);
    let reports = body.as_array().unwrap();
    assert_eq!(reports.len(), 10);
    assert!(
        reports
            .iter()
            .any(|r| r["name"] == "procedures-by-month" && r["parameters"] == json!(["month"]))
    );

    let database = FakeDatabase::new(true);
    let (status, body) = send(
        app(database.clone(), []),
        get("/api/reports/low-stock-medicines?threshold=5"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
    let executed = database.executed();
    assert_eq!(executed[0].1, vec![BindValue::Int(5)]);
    assert_eq!(executed[0].2, QueryMode::ReadOnly);
}

#[tokio::test]
async fn test_api_report_errors() {
    let database = FakeDatabase::new(true);
    let (status, body) = send(
        app(database.clone(), []),
        get("/api/reports/procedures-by-month"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Month parameter is required");
    assert!(database.executed().is_empty());

    let (status, _) = send(app(FakeDatabase::new(true), []), get("/api/reports/not-a-report")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app(FakeDatabase::new(false), []),
        get("/api/reports/revenue-by-service"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_api_malformed_bodies_return_error_json() {
    let database = FakeDatabase::new(true);

    let (status, body) = send(
        app(database.clone(), []),
        post_json("/api/query", &json!({"query": "show all patients", "mode": "bogus"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/read")
        .header("content-type", "application/json")
        .body(Body::from("{\"query\": "))
        .unwrap();
    let (status, body) = send(app(database.clone(), []), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/query")
        .body(Body::from(json!({"query": "show all patients"}).to_string()))
        .unwrap();
    let (status, body) = send(app(database.clone(), []), request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());

    assert!(database.executed().is_empty());
}
