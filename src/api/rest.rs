use crate::config::{ApiConfig, HistoryConfig};
use crate::engine::DetectionEngine;
use crate::error::Error;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod logs_controller;
pub mod realtime_controller;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DetectionEngine>,
    pub history: HistoryConfig,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Failure body: `{"error": message, "status": code}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::UnknownSensor(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::BAD_REQUEST.as_u16(),
            },
            Error::InvalidInput(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            },
            Error::NotFound(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
            },
            // Storage details stay in the log; nothing was committed, so the caller may retry.
            Error::Database(_) | Error::Internal(_) | Error::Config(_) => {
                error!("Request failed: {}", err);
                ApiError {
                    message: "Storage failure, nothing was recorded; the request can be retried".to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                }
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = Error::find(&err) {
            return err.clone().into();
        }

        Error::Internal(err.to_string()).into()
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub threshold: i32,
    pub quiet_seconds: i64,
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
}

impl RestApi {
    pub fn new(config: &ApiConfig, engine: Arc<DetectionEngine>, history: HistoryConfig) -> Self {
        Self {
            config: config.clone(),
            state: AppState { engine, history },
        }
    }

    pub fn router(&self) -> Router {
        // Create a CORS layer that allows all origins and preflight requests
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600));

        Router::new()
            .route("/api", get(api_status))
            .route("/api/health", get(health))
            .route(
                "/api/realtime",
                get(realtime_controller::get_realtime).post(realtime_controller::post_realtime),
            )
            .route("/api/logs", get(logs_controller::get_logs))
            .route(
                "/api/event/:event_id/timeline",
                get(realtime_controller::get_event_timeline),
            )
            .with_state(self.state.clone())
            // Dashboard page and its assets
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(cors)
    }

    /// Serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        axum::Server::bind(&addr)
            .serve(self.router().into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

async fn api_status() -> &'static str {
    "Seismic event detection backend running"
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database = state.engine.health_check().await?;
    let settings = state.engine.settings();

    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        threshold: settings.threshold,
        quiet_seconds: settings.quiet_period.num_seconds(),
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::engine::DetectionSettings;
    use crate::store::MemoryStore;
    use axum::body::{Body, HttpBody};
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    pub(crate) async fn memory_state(sensors: &[i64]) -> AppState {
        let engine = DetectionEngine::new(Arc::new(MemoryStore::new()), DetectionSettings::default());
        engine.provision(sensors).await.unwrap();

        AppState {
            engine: Arc::new(engine),
            history: HistoryConfig::default(),
        }
    }

    async fn memory_router(sensors: &[i64]) -> Router {
        let state = memory_state(sensors).await;
        RestApi::new(&ApiConfig::default(), state.engine, state.history).router()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();

        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/realtime")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn assert_invalid_input(status: StatusCode, body: &serde_json::Value) {
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], 422);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input: "));
    }

    #[tokio::test]
    async fn test_router_ingests_well_formed_sample() {
        let router = memory_router(&[1]).await;

        let (status, body) = send(router, post_json(r#"{"sensor_id": 1, "intensity": 45, "duration": 1.0}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["event_active"], true);
    }

    #[tokio::test]
    async fn test_router_rejects_non_integer_intensity() {
        for payload in [
            r#"{"sensor_id": 1, "intensity": "45"}"#,
            r#"{"sensor_id": 1, "intensity": 4.5}"#,
        ] {
            let router = memory_router(&[1]).await;
            let (status, body) = send(router, post_json(payload)).await;
            assert_invalid_input(status, &body);
        }
    }

    #[tokio::test]
    async fn test_router_rejects_truncated_json() {
        let router = memory_router(&[1]).await;

        let (status, body) = send(router, post_json(r#"{"sensor_id": 1, "inten"#)).await;

        assert_invalid_input(status, &body);
    }

    #[tokio::test]
    async fn test_router_rejects_body_without_content_type() {
        let router = memory_router(&[1]).await;
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/realtime")
            .body(Body::from(r#"{"sensor_id": 1, "intensity": 45}"#))
            .unwrap();

        let (status, body) = send(router, request).await;

        assert_invalid_input(status, &body);
    }

    #[tokio::test]
    async fn test_router_rejects_bad_query_and_path_parameters() {
        for uri in ["/api/logs?limit=abc", "/api/realtime?sensor_id=x", "/api/event/abc/timeline"] {
            let router = memory_router(&[1]).await;
            let (status, body) = send(router, get(uri)).await;
            assert_invalid_input(status, &body);
        }
    }

    #[tokio::test]
    async fn test_router_reports_unknown_sensor_as_bad_request() {
        let router = memory_router(&[1]).await;

        let (status, body) = send(router, post_json(r#"{"sensor_id": 8, "intensity": 45}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Sensor not registered: 8");
        assert_eq!(body["status"], 400);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::UnknownSensor(4), StatusCode::BAD_REQUEST),
            (Error::InvalidInput("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Database("pool timed out".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Config("bad port".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            let api: ApiError = anyhow::Error::from(err).into();
            assert_eq!(api.status, status.as_u16());
        }
    }

    #[test]
    fn test_storage_details_are_not_leaked() {
        let api: ApiError = Error::Database("password authentication failed for user".into()).into();
        assert!(!api.message.contains("password"));

        let body = serde_json::to_value(&api).unwrap();
        assert!(body.get("error").is_some());
        assert_eq!(body["status"], 500);
    }

    #[test]
    fn test_unknown_sensor_message_names_sensor() {
        let response = ApiError::from(Error::UnknownSensor(12)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let api = ApiError::from(Error::UnknownSensor(12));
        assert_eq!(api.message, "Sensor not registered: 12");
    }

    #[tokio::test]
    async fn test_health_reports_tunables() {
        let state = memory_state(&[1]).await;

        let Json(health) = health(State(state)).await.unwrap();

        assert_eq!(health.status, "ok");
        assert!(health.database);
        assert_eq!(health.threshold, 40);
        assert_eq!(health.quiet_seconds, 3);
    }
}
