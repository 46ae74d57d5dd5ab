pub mod locks;
pub mod state_machine;

pub use locks::SensorLocks;
pub use state_machine::{Action, DetectionSettings, Step};

use crate::db::models::{EventRecord, EventTimeline, Sample, SensorReading, SensorSnapshot};
use crate::error::Error;
use crate::store::{DetectionStore, EventFilter};
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Seismic event detection engine. The only writer of sensor state, event rows and samples.
pub struct DetectionEngine {
    store: Arc<dyn DetectionStore>,
    settings: DetectionSettings,
    locks: SensorLocks,
}

impl DetectionEngine {
    pub fn new(store: Arc<dyn DetectionStore>, settings: DetectionSettings) -> Self {
        Self {
            store,
            settings,
            locks: SensorLocks::new(),
        }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Register sensors that are not provisioned yet. Returns how many were added.
    pub async fn provision(&self, sensor_ids: &[i64]) -> Result<usize> {
        let mut added = 0;
        for &sensor_id in sensor_ids {
            if self.store.register_sensor(sensor_id).await? {
                added += 1;
            }
        }

        info!("Provisioned {} of {} configured sensors", added, sensor_ids.len());
        Ok(added)
    }

    /// Apply one sample to its sensor and return the resulting snapshot.
    ///
    /// The state read, the transition and every write happen under the sensor's lock and
    /// inside one store transaction, so either all of them land or none do.
    pub async fn ingest(&self, reading: SensorReading, now: DateTime<Utc>) -> Result<SensorSnapshot> {
        self.ingest_with(reading, || now).await
    }

    /// Like [`ingest`](Self::ingest), stamping the sample once the sensor's lock is held so
    /// that samples of one sensor are timestamped in commit order.
    pub async fn ingest_on_arrival(&self, reading: SensorReading) -> Result<SensorSnapshot> {
        self.ingest_with(reading, Utc::now).await
    }

    async fn ingest_with<F>(&self, reading: SensorReading, clock: F) -> Result<SensorSnapshot>
    where
        F: FnOnce() -> DateTime<Utc>,
    {
        let sensor_id = reading.sensor_id;

        let guard = self.locks.acquire(sensor_id).await;
        let result = self.apply(reading, clock()).await;
        drop(guard);

        if let Err(e) = &result {
            match Error::find(e) {
                Some(Error::UnknownSensor(_)) => {
                    warn!("Rejected sample for unregistered sensor {}", sensor_id);
                    self.locks.forget(sensor_id).await;
                }
                _ => error!("Failed to ingest sample for sensor {}: {}", sensor_id, e),
            }
        }

        result
    }

    async fn apply(&self, reading: SensorReading, now: DateTime<Utc>) -> Result<SensorSnapshot> {
        let mut tx = self.store.begin(reading.sensor_id).await?;
        let state = tx.state().clone();
        state.check_invariants()?;

        let Step { action, mut next } = state_machine::step(&self.settings, &state, &reading, now);

        let event_id = match &action {
            Action::Open(event) => {
                let event_id = tx.open_event(event).await?;
                next.current_event_id = Some(event_id);
                info!(
                    "Sensor {} opened event {} at intensity {}",
                    reading.sensor_id, event_id, reading.intensity
                );
                Some(event_id)
            }
            other => other.event_id(),
        };

        if let Some(event_id) = event_id {
            tx.record_sample(&Sample {
                event_id,
                sensor_id: reading.sensor_id,
                intensity: reading.intensity,
                recorded_at: now,
            })
            .await?;
        }

        match &action {
            Action::StartQuiet { event_id } => {
                debug!("Sensor {} went quiet during event {}", reading.sensor_id, event_id);
            }
            Action::HoldQuiet { event_id, quiet } => {
                debug!(
                    "Sensor {} quiet for {}ms during event {}",
                    reading.sensor_id,
                    quiet.num_milliseconds(),
                    event_id
                );
            }
            Action::Close { event_id, summary } => {
                tx.close_event(*event_id, summary).await?;
                info!(
                    "Sensor {} closed event {} after {:.1}s (max {}, avg {:.2})",
                    reading.sensor_id,
                    event_id,
                    summary.duration_sec,
                    summary.max_intensity,
                    summary.avg_intensity
                );
            }
            _ => {}
        }

        next.check_invariants()?;
        tx.save_state(&next).await?;
        tx.commit().await?;

        Ok(SensorSnapshot::from(&next))
    }

    /// Current status of a sensor, without touching it
    pub async fn snapshot(&self, sensor_id: i64) -> Result<SensorSnapshot> {
        let state = self
            .store
            .sensor_state(sensor_id)
            .await?
            .ok_or(Error::UnknownSensor(sensor_id))?;

        Ok(SensorSnapshot::from(&state))
    }

    pub async fn recent_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        self.store.recent_events(filter).await
    }

    /// Samples of an event in recording order. Unknown events replay as empty.
    pub async fn event_timeline(&self, event_id: i64) -> Result<EventTimeline> {
        let samples = self.store.event_samples(event_id).await?;
        Ok(EventTimeline::from_samples(event_id, samples))
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }
}
