use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{EventTimeline, SensorReading, SensorSnapshot};
use crate::error::Error;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Sensor used when a status query names none
const DEFAULT_SENSOR_ID: i64 = 1;

/// Sample posted by a sensor
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub sensor_id: i64,
    pub intensity: i64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub snapshot: SensorSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub sensor_id: Option<i64>,
}

/// POST /api/realtime
pub async fn post_realtime(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(request) = payload.map_err(|e| Error::InvalidInput(e.body_text()))?;
    let reading = SensorReading::new(request.sensor_id, request.intensity, request.duration)?;

    let snapshot = state.engine.ingest_on_arrival(reading).await?;

    Ok(Json(IngestResponse {
        status: "ok",
        snapshot,
    }))
}

/// GET /api/realtime
pub async fn get_realtime(
    State(state): State<AppState>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> ApiResult<Json<SensorSnapshot>> {
    let Query(params) = params.map_err(|e| Error::InvalidInput(e.body_text()))?;
    let sensor_id = params.sensor_id.unwrap_or(DEFAULT_SENSOR_ID);

    Ok(Json(state.engine.snapshot(sensor_id).await?))
}

/// GET /api/event/:event_id/timeline
pub async fn get_event_timeline(
    State(state): State<AppState>,
    event_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<EventTimeline>> {
    let Path(event_id) = event_id.map_err(|e| Error::InvalidInput(e.body_text()))?;
    Ok(Json(state.engine.event_timeline(event_id).await?))
}
