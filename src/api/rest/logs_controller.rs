use crate::api::rest::{ApiResult, AppState};
use crate::db::models::EventRecord;
use crate::error::Error;
use crate::store::EventFilter;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

/// Query parameters for the event history
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub limit: Option<i64>,
    pub sensor_id: Option<i64>,
    #[serde(default)]
    pub closed_only: bool,
}

/// GET /api/logs
pub async fn get_logs(
    State(state): State<AppState>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let Query(params) = params.map_err(|e| Error::InvalidInput(e.body_text()))?;

    let filter = EventFilter {
        sensor_id: params.sensor_id,
        closed_only: params.closed_only,
        limit: state.history.clamp(params.limit),
    };

    Ok(Json(state.engine.recent_events(&filter).await?))
}
