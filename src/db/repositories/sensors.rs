use crate::db::models::SensorState;
use crate::error::Error;
use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::info;

const SENSOR_COLUMNS: &str = r#"
    sensor_id, event_active, current_event_id, event_start_time,
    max_intensity, sum_intensity, sample_count, last_below_threshold,
    shake, intensity, duration, observed_at
"#;

/// Sensors repository for the `realtime_status` table
#[derive(Clone)]
pub struct SensorsRepository {
    pool: Arc<PgPool>,
}

impl SensorsRepository {
    /// Create a new sensors repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Provision a sensor. Returns false if it already existed.
    pub async fn register(&self, sensor_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO realtime_status (sensor_id)
            VALUES ($1)
            ON CONFLICT (sensor_id) DO NOTHING
            "#,
        )
        .bind(sensor_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to register sensor: {}", e)))?;

        let created = result.rows_affected() > 0;
        if created {
            info!("Registered sensor {}", sensor_id);
        }

        Ok(created)
    }

    /// Get sensor state by ID without locking it
    pub async fn get_by_id(&self, sensor_id: i64) -> Result<Option<SensorState>> {
        let result = sqlx::query_as::<_, SensorState>(&format!(
            "SELECT {} FROM realtime_status WHERE sensor_id = $1",
            SENSOR_COLUMNS
        ))
        .bind(sensor_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get sensor state: {}", e)))?;

        Ok(result)
    }

    /// Read a sensor row and hold its row lock until the surrounding transaction ends
    pub async fn lock_for_update(conn: &mut PgConnection, sensor_id: i64) -> Result<Option<SensorState>> {
        let result = sqlx::query_as::<_, SensorState>(&format!(
            "SELECT {} FROM realtime_status WHERE sensor_id = $1 FOR UPDATE",
            SENSOR_COLUMNS
        ))
        .bind(sensor_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to lock sensor state: {}", e)))?;

        Ok(result)
    }

    /// Overwrite the full sensor row
    pub async fn save(conn: &mut PgConnection, state: &SensorState) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE realtime_status
            SET event_active = $2,
                current_event_id = $3,
                event_start_time = $4,
                max_intensity = $5,
                sum_intensity = $6,
                sample_count = $7,
                last_below_threshold = $8,
                shake = $9,
                intensity = $10,
                duration = $11,
                observed_at = $12
            WHERE sensor_id = $1
            "#,
        )
        .bind(state.sensor_id)
        .bind(state.event_active)
        .bind(state.current_event_id)
        .bind(state.event_start_time)
        .bind(state.max_intensity)
        .bind(state.sum_intensity)
        .bind(state.sample_count)
        .bind(state.last_below_threshold)
        .bind(state.shake)
        .bind(state.intensity)
        .bind(state.duration)
        .bind(state.timestamp)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to save sensor state: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::UnknownSensor(state.sensor_id).into());
        }

        Ok(())
    }
}
