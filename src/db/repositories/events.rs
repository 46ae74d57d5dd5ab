use crate::db::models::{EventRecord, EventSummary, NewEvent};
use crate::error::Error;
use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;

/// Events repository for the `quake_logs` table
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<PgPool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a new event. The row starts with `end_time = start_time` and provisional figures.
    pub async fn create(conn: &mut PgConnection, event: &NewEvent) -> Result<EventRecord> {
        let result = sqlx::query_as::<_, EventRecord>(
            r#"
            INSERT INTO quake_logs (
                sensor_id, start_time, end_time, duration_sec, max_intensity, avg_intensity
            )
            VALUES ($1, $2, $2, 0, $3, $4)
            RETURNING event_id, sensor_id, start_time, end_time, duration_sec, max_intensity, avg_intensity
            "#,
        )
        .bind(event.sensor_id)
        .bind(event.start_time)
        .bind(event.intensity)
        .bind(f64::from(event.intensity))
        .fetch_one(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event: {}", e)))?;

        Ok(result)
    }

    /// Write the closing figures of an event
    pub async fn close(conn: &mut PgConnection, event_id: i64, summary: &EventSummary) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE quake_logs
            SET end_time = $2,
                duration_sec = $3,
                max_intensity = $4,
                avg_intensity = $5
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(summary.end_time)
        .bind(summary.duration_sec)
        .bind(summary.max_intensity)
        .bind(summary.avg_intensity)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to close event: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Event {} not found", event_id)).into());
        }

        Ok(())
    }

    /// Most recent events, newest first. `closed_only` leaves out events still open on their sensor.
    pub async fn get_recent(&self, sensor_id: Option<i64>, closed_only: bool, limit: i64) -> Result<Vec<EventRecord>> {
        let result = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT q.event_id, q.sensor_id, q.start_time, q.end_time, q.duration_sec,
                   q.max_intensity, q.avg_intensity
            FROM quake_logs q
            WHERE ($1::BIGINT IS NULL OR q.sensor_id = $1)
              AND (NOT $2 OR NOT EXISTS (
                    SELECT 1 FROM realtime_status s
                    WHERE s.current_event_id = q.event_id
                  ))
            ORDER BY q.event_id DESC
            LIMIT $3
            "#,
        )
        .bind(sensor_id)
        .bind(closed_only)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get recent events: {}", e)))?;

        Ok(result)
    }
}
