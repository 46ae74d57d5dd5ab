use crate::config::DatabaseConfig;
use crate::db::migrations;
use crate::db::models::{EventRecord, EventSummary, NewEvent, Sample, SensorState};
use crate::db::repositories::{EventsRepository, SamplesRepository, SensorsRepository};
use crate::error::Error;
use crate::store::{DetectionStore, EventFilter, SensorTransaction};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// PostgreSQL-backed detection store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
    sensors: SensorsRepository,
    events: EventsRepository,
    samples: SamplesRepository,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            sensors: SensorsRepository::new(Arc::clone(&pool)),
            events: EventsRepository::new(Arc::clone(&pool)),
            samples: SamplesRepository::new(Arc::clone(&pool)),
            pool,
        }
    }

    /// Open the pool, bring the schema up to date when `auto_migrate` is set, and wrap the result
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        info!(
            "Connected to PostgreSQL with up to {} connections",
            config.max_connections
        );

        if config.auto_migrate {
            migrations::run_migrations(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;
        }

        Ok(Self::new(Arc::new(pool)))
    }
}

/// Database transaction holding the sensor's row lock
struct PgSensorTransaction {
    tx: Transaction<'static, Postgres>,
    state: SensorState,
}

#[async_trait]
impl SensorTransaction for PgSensorTransaction {
    fn state(&self) -> &SensorState {
        &self.state
    }

    async fn open_event(&mut self, event: &NewEvent) -> Result<i64> {
        let record = EventsRepository::create(&mut *self.tx, event).await?;
        Ok(record.event_id)
    }

    async fn record_sample(&mut self, sample: &Sample) -> Result<()> {
        SamplesRepository::append(&mut *self.tx, sample).await
    }

    async fn close_event(&mut self, event_id: i64, summary: &EventSummary) -> Result<()> {
        EventsRepository::close(&mut *self.tx, event_id, summary).await
    }

    async fn save_state(&mut self, state: &SensorState) -> Result<()> {
        SensorsRepository::save(&mut *self.tx, state).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let sensor_id = self.state.sensor_id;
        self.tx
            .commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit sensor {} update: {}", sensor_id, e)))?;

        Ok(())
    }
}

#[async_trait]
impl DetectionStore for PgStore {
    async fn begin(&self, sensor_id: i64) -> Result<Box<dyn SensorTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        // Dropping `tx` on the error path rolls the empty transaction back.
        let state = SensorsRepository::lock_for_update(&mut *tx, sensor_id)
            .await?
            .ok_or(Error::UnknownSensor(sensor_id))?;

        debug!("Locked sensor {} for update", sensor_id);

        Ok(Box::new(PgSensorTransaction { tx, state }))
    }

    async fn register_sensor(&self, sensor_id: i64) -> Result<bool> {
        self.sensors.register(sensor_id).await
    }

    async fn sensor_state(&self, sensor_id: i64) -> Result<Option<SensorState>> {
        self.sensors.get_by_id(sensor_id).await
    }

    async fn recent_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        self.events
            .get_recent(filter.sensor_id, filter.closed_only, filter.limit)
            .await
    }

    async fn event_samples(&self, event_id: i64) -> Result<Vec<Sample>> {
        self.samples.get_by_event(event_id).await
    }

    async fn health_check(&self) -> Result<bool> {
        // An unreachable database degrades health instead of failing the probe.
        match sqlx::query("SELECT 1").execute(&*self.pool).await {
            Ok(_) => Ok(true),
            Err(e) => {
                error!("Database health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use chrono::{Duration, TimeZone, Utc};

    // Runs against a scratch database; the sensor id is derived from the clock so
    // repeated runs do not collide.
    async fn connect() -> Result<Option<PgStore>> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping PostgreSQL test. Set TEST_DATABASE_URL to run.");
                return Ok(None);
            }
        };

        let config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            url,
            max_connections: 4,
            auto_migrate: true,
        };
        Ok(Some(PgStore::connect(&config).await?))
    }

    fn scratch_sensor_id() -> i64 {
        Utc::now().timestamp_nanos_opt().unwrap_or_default().abs() % 1_000_000_000 + 1_000_000
    }

    #[tokio::test]
    async fn test_unreachable_database_is_a_storage_error() {
        let config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            url: "postgres://quake@127.0.0.1:1/quake".to_string(),
            max_connections: 1,
            auto_migrate: true,
        };

        let err = PgStore::connect(&config).await.err().expect("port 1 does not accept connections");
        assert!(matches!(Error::find(&err), Some(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_connected_store_is_healthy() -> Result<()> {
        let Some(store) = connect().await? else {
            return Ok(());
        };

        assert!(store.health_check().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_rejected() -> Result<()> {
        let Some(store) = connect().await? else {
            return Ok(());
        };

        let err = store.begin(-42).await.err().expect("unknown sensor must fail");
        assert_eq!(Error::find(&err), Some(&Error::UnknownSensor(-42)));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() -> Result<()> {
        let Some(store) = connect().await? else {
            return Ok(());
        };
        let sensor_id = scratch_sensor_id();
        assert!(store.register_sensor(sensor_id).await?);
        assert!(!store.register_sensor(sensor_id).await?);

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        {
            let mut tx = store.begin(sensor_id).await?;
            let event_id = tx
                .open_event(&NewEvent {
                    sensor_id,
                    start_time: start,
                    intensity: 60,
                })
                .await?;
            tx.record_sample(&Sample {
                event_id,
                sensor_id,
                intensity: 60,
                recorded_at: start,
            })
            .await?;
            // no commit
        }

        let state = store.sensor_state(sensor_id).await?.expect("sensor exists");
        assert!(!state.event_active);

        let filter = EventFilter {
            sensor_id: Some(sensor_id),
            closed_only: false,
            limit: 10,
        };
        assert!(store.recent_events(&filter).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_committed_event_round_trip() -> Result<()> {
        let Some(store) = connect().await? else {
            return Ok(());
        };
        let sensor_id = scratch_sensor_id() + 1;
        store.register_sensor(sensor_id).await?;

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tx = store.begin(sensor_id).await?;
        let event_id = tx
            .open_event(&NewEvent {
                sensor_id,
                start_time: start,
                intensity: 45,
            })
            .await?;
        for (offset, intensity) in [(0, 45), (1, 50)] {
            tx.record_sample(&Sample {
                event_id,
                sensor_id,
                intensity,
                recorded_at: start + Duration::seconds(offset),
            })
            .await?;
        }
        let mut state = tx.state().clone();
        state.event_active = true;
        state.current_event_id = Some(event_id);
        state.event_start_time = Some(start);
        state.max_intensity = 50;
        state.sum_intensity = 95;
        state.sample_count = 2;
        tx.save_state(&state).await?;
        tx.commit().await?;

        let open = EventFilter {
            sensor_id: Some(sensor_id),
            closed_only: true,
            limit: 10,
        };
        assert!(store.recent_events(&open).await?.is_empty());

        let all = EventFilter {
            closed_only: false,
            ..open
        };
        let events = store.recent_events(&all).await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, events[0].end_time);

        let samples = store.event_samples(event_id).await?;
        assert_eq!(
            samples.iter().map(|s| s.intensity).collect::<Vec<_>>(),
            vec![45, 50]
        );
        Ok(())
    }
}
