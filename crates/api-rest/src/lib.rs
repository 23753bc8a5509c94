//! # API REST
//!
//! HTTP trigger surface for the call metadata pipeline.
//!
//! Handles:
//! - `POST /events/preload` and `POST /events/merge` with axum
//! - OpenAPI/Swagger documentation
//! - Mapping pipeline failures onto HTTP statuses
//!
//! Pipeline invocations are synchronous and may sleep while polling, so each one runs on the
//! blocking thread pool.

#![warn(rust_2018_idioms)]

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use callmeta_core::{
    CallPipeline, FailureClass, FsObjectStore, MergeEvent, MergeRequest, PipelineConfig,
    PipelineError, PipelineSettings, PreloadEvent, PreloadOutcome,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Optional YAML settings file read at startup.
pub const ENV_CONFIG_FILE: &str = "CALLMETA_CONFIG";
/// Directory backing the filesystem object store.
pub const ENV_STORE_ROOT: &str = "CALLMETA_STORE_ROOT";
/// Listen address of the REST server.
pub const ENV_REST_ADDR: &str = "CALLMETA_REST_ADDR";
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    pipeline: CallPipeline,
}

impl AppState {
    pub fn new(pipeline: CallPipeline) -> Self {
        Self { pipeline }
    }

    /// Resolve configuration and the object store from the process environment.
    ///
    /// Called once at startup; handlers never read the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = match std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from) {
            Some(path) => PipelineSettings::from_yaml_file(&path)?,
            None => PipelineSettings::default(),
        }
        .with_lookup(|name| std::env::var(name).ok())?;

        let store_root = std::env::var(ENV_STORE_ROOT).unwrap_or_else(|_| ".".into());
        let store = FsObjectStore::new(std::path::Path::new(&store_root))?;
        let config = PipelineConfig::new(settings)?;

        tracing::info!(
            ingest = %config.ingest_bucket(),
            output = %config.output_bucket(),
            store_root = %store_root,
            "pipeline configured"
        );
        Ok(Self::new(CallPipeline::new(Arc::new(config), Arc::new(store))))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error payload for failed invocations.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub class: FailureClass,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn status_for(class: FailureClass) -> StatusCode {
    match class {
        FailureClass::MissingDependency => StatusCode::NOT_FOUND,
        FailureClass::MalformedInput => StatusCode::UNPROCESSABLE_ENTITY,
        FailureClass::Conflict => StatusCode::CONFLICT,
        FailureClass::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: PipelineError) -> ApiError {
    let class = e.class();
    tracing::error!(?class, "pipeline error: {}", e);
    (
        status_for(class),
        Json(ErrorBody {
            error: e.to_string(),
            class,
        }),
    )
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    tracing::error!("pipeline task failed: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "pipeline task failed".into(),
            class: FailureClass::Infrastructure,
        }),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(health, preload, merge),
    components(schemas(
        HealthRes,
        ErrorBody,
        FailureClass,
        PreloadEvent,
        PreloadOutcome,
        MergeRequest,
    ))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events/preload", post(preload))
        .route("/events/merge", post(merge))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "callmeta REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/events/preload",
    request_body = PreloadEvent,
    responses(
        (status = 200, description = "Artifacts published, or the object was skipped", body = PreloadOutcome),
        (status = 404, description = "Source record or companion audio missing", body = ErrorBody),
        (status = 422, description = "Malformed event or call record", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
/// Stage 1: normalize a call record and hand its artifacts off
///
/// Accepts `{bucket, objectKey}` or an object-store notification envelope.
#[axum::debug_handler]
async fn preload(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PreloadOutcome>, ApiError> {
    let event = PreloadEvent::from_value(&body).map_err(api_error)?;
    let pipeline = state.pipeline.clone();

    tokio::task::spawn_blocking(move || pipeline.handle_preload(&event))
        .await
        .map_err(join_error)?
        .map(Json)
        .map_err(api_error)
}

#[utoipa::path(
    post,
    path = "/events/merge",
    request_body = MergeRequest,
    responses(
        (status = 200, description = "Metadata merged; the triggering event is returned unchanged"),
        (status = 404, description = "Metadata or interim result document missing", body = ErrorBody),
        (status = 409, description = "Interim result document changed during the merge", body = ErrorBody),
        (status = 422, description = "Malformed event or document", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
/// Stage 2: merge normalized metadata into the interim result document
#[axum::debug_handler]
async fn merge(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let event = MergeEvent::from_value(body).map_err(api_error)?;
    let pipeline = state.pipeline.clone();

    tokio::task::spawn_blocking(move || pipeline.handle_merge(event))
        .await
        .map_err(join_error)?
        .map(|event| Json(event.into_value()))
        .map_err(api_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use callmeta_core::{BucketName, MemoryObjectStore, ObjectKey, ObjectStore, PollPolicy};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn app(store: Arc<MemoryObjectStore>) -> Router {
        let config = PipelineConfig::new(PipelineSettings {
            ingest_bucket: "ingest".into(),
            output_bucket: "output".into(),
            ..PipelineSettings::default()
        })
        .unwrap()
        .with_poll(PollPolicy::new(1, 1).unwrap());
        router(AppState::new(CallPipeline::new(Arc::new(config), store)))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(Arc::new(MemoryObjectStore::new()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn non_matching_key_is_skipped() {
        let (status, body) = post_json(
            app(Arc::new(MemoryObjectStore::new())),
            "/events/preload",
            json!({"bucket": "drop", "objectKey": "notes/readme.txt"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["fileNames"], json!({}));
    }

    #[tokio::test]
    async fn missing_source_maps_to_not_found() {
        let (status, body) = post_json(
            app(Arc::new(MemoryObjectStore::new())),
            "/events/preload",
            json!({"bucket": "drop", "objectKey": "in/call.xml"}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["class"], "missingDependency");
    }

    #[tokio::test]
    async fn malformed_event_maps_to_unprocessable() {
        let (status, body) = post_json(
            app(Arc::new(MemoryObjectStore::new())),
            "/events/merge",
            json!({"key": "a.wav"}),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["class"], "malformedInput");
    }

    #[tokio::test]
    async fn merge_returns_event_unchanged() {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put(
                &BucketName::parse("ingest").unwrap(),
                &ObjectKey::parse("originalAudio/x.json").unwrap(),
                br#"{"recording":{"id":"x"}}"#,
            )
            .unwrap();
        store
            .put(
                &BucketName::parse("output").unwrap(),
                &ObjectKey::parse("interim/x.json").unwrap(),
                br#"{"a":1}"#,
            )
            .unwrap();

        let event = json!({
            "key": "originalAudio/x.wav",
            "interimResultsFile": "interim/x.json",
            "executionId": "e-9"
        });
        let (status, body) = post_json(app(store.clone()), "/events/merge", event.clone()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, event);

        let merged: Value = serde_json::from_slice(
            &store
                .get(
                    &BucketName::parse("output").unwrap(),
                    &ObjectKey::parse("interim/x.json").unwrap(),
                )
                .unwrap(),
        )
        .unwrap();
        assert_eq!(merged, json!({"a": 1, "MitelMetadata": {"recording": {"id": "x"}}}));
    }

    #[test]
    fn openapi_lists_event_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/events/preload"));
        assert!(doc.paths.paths.contains_key("/events/merge"));
    }
}
