//! HTTP API for the MedSQL pipeline.
//!
//! The router is a thin layer: every handler delegates to
//! [`QueryPipeline`], the schema cache or a predefined report and maps the
//! outcome to a status code.
//!
//! # Routes
//! - `POST /api/query`: run a request in the mode it names (default read)
//! - `POST /api/read`: run a request in read mode regardless of its body
//! - `GET /api/schema`, `POST /api/schema/refresh`: inspect or rebuild the cached schema
//! - `GET /api/health`: database connectivity, pool settings and generator identity
//! - `GET /api/reports`, `GET /api/reports/{name}`: predefined reports

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use medsql_core::{
    ExecutionOutcome, GenerationErrorKind, MedSqlError, PipelineError, QueryMode, QueryPipeline,
    QueryRequest, ReportKind, ReportParams, ResultSerializer,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: QueryPipeline,
}

impl AppState {
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self { pipeline }
    }
}

/// Build the axum router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(run_query))
        .route("/api/read", post(run_read))
        .route("/api/schema", get(get_schema))
        .route("/api/schema/refresh", post(refresh_schema))
        .route("/api/health", get(health))
        .route("/api/reports", get(list_reports))
        .route("/api/reports/{name}", get(run_report))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves the API until `shutdown` resolves.
///
/// # Errors
/// Returns an I/O error if the address cannot be bound.
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn execute_request(state: &AppState, request: QueryRequest) -> Response {
    match state.pipeline.run(&request).await {
        Ok(report) => Json(report.to_response()).into_response(),
        Err(error) => {
            let status = match &error {
                PipelineError::EmptyQuery => StatusCode::BAD_REQUEST,
                PipelineError::Generation(_) => match error.generation_kind() {
                    Some(GenerationErrorKind::QuotaExceeded) => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::BAD_GATEWAY,
                },
            };
            (status, Json(error.to_body())).into_response()
        }
    }
}

/// Malformed bodies get the same `{error}` shape as every other failure.
fn rejection_response(rejection: &JsonRejection) -> Response {
    error_response(rejection.status(), rejection.body_text())
}

/// POST /api/query - Run a request in its own mode
async fn run_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => execute_request(&state, request).await,
        Err(rejection) => rejection_response(&rejection),
    }
}

/// POST /api/read - Run a request in read mode
async fn run_read(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => {
            execute_request(&state, QueryRequest::new(request.text, QueryMode::ReadOnly)).await
        }
        Err(rejection) => rejection_response(&rejection),
    }
}

/// GET /api/schema - Current snapshot as a table → columns mapping
async fn get_schema(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.schema_cache().get().await {
        (snapshot, None) => Json(snapshot.as_ref()).into_response(),
        (_, Some(error)) => error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
    }
}

/// POST /api/schema/refresh - Rebuild the cached snapshot
async fn refresh_schema(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.schema_cache().refresh().await {
        Ok(snapshot) => Json(json!({
            "status": "refreshed",
            "tables": snapshot.table_count(),
            "columns": snapshot.column_count(),
        }))
        .into_response(),
        Err(error) => error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string()),
    }
}

/// GET /api/health - Database connectivity, pool settings and generator identity
async fn health(State(state): State<Arc<AppState>>) -> Response {
    let generator = json!({
        "provider": state.pipeline.generator().provider(),
        "model": state.pipeline.generator().model(),
    });
    let adapter = state.pipeline.executor().adapter();
    let config = adapter.connection_config();
    let pool = json!({
        "engine": adapter.engine_name(),
        "max_connections": config.max_connections,
        "statement_timeout_ms": u64::try_from(config.query_timeout.as_millis()).unwrap_or(u64::MAX),
    });

    match adapter.test_connection().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "pool": pool,
            "generator": generator,
        }))
        .into_response(),
        Err(error) => {
            tracing::warn!("Health check failed: {}", error);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": error.to_string(),
                    "pool": pool,
                    "generator": generator,
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/reports - Available predefined reports
async fn list_reports() -> Response {
    let reports: Vec<_> = ReportKind::all()
        .iter()
        .map(|kind| {
            json!({
                "name": kind.name(),
                "description": kind.description(),
                "parameters": kind.parameters(),
            })
        })
        .collect();
    Json(reports).into_response()
}

/// GET /api/reports/{name} - Run a predefined report
async fn run_report(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let kind = match name.parse::<ReportKind>() {
        Ok(kind) => kind,
        Err(_) => return error_response(StatusCode::NOT_FOUND, format!("Unknown report '{}'", name)),
    };
    let params: ReportParams = params.into_iter().collect();
    let today = chrono::Local::now().date_naive();

    match kind.run(state.pipeline.executor(), &params, today).await {
        Ok(outcome @ ExecutionOutcome::Failure { .. }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ResultSerializer::serialize(&outcome)),
        )
            .into_response(),
        Ok(outcome) => Json(ResultSerializer::serialize(&outcome)).into_response(),
        Err(MedSqlError::Configuration { message }) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(error) => error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}
