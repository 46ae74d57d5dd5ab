use crate::db::models::{EventRecord, EventSummary, NewEvent, Sample, SensorState};
use crate::error::Error;
use crate::store::{DetectionStore, EventFilter, SensorTransaction};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    sensors: HashMap<i64, SensorState>,
    events: BTreeMap<i64, EventRecord>,
    samples: Vec<Sample>,
    last_event_id: i64,
}

/// In-process detection store with the same transactional behaviour as the database
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

enum PendingWrite {
    OpenEvent(EventRecord),
    Sample(Sample),
    CloseEvent(i64, EventSummary),
    State(SensorState),
}

/// Buffers writes until commit; the buffered writes are applied under a single table lock
struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    state: SensorState,
    pending: Vec<PendingWrite>,
}

impl MemoryTransaction {
    fn has_pending_event(&self, event_id: i64) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::OpenEvent(record) if record.event_id == event_id))
    }
}

#[async_trait]
impl SensorTransaction for MemoryTransaction {
    fn state(&self) -> &SensorState {
        &self.state
    }

    async fn open_event(&mut self, event: &NewEvent) -> Result<i64> {
        // Identifiers are handed out eagerly, like a database sequence, so a
        // rolled back transaction leaves a gap.
        let event_id = {
            let mut tables = self.tables.lock().await;
            tables.last_event_id += 1;
            tables.last_event_id
        };

        self.pending.push(PendingWrite::OpenEvent(EventRecord {
            event_id,
            sensor_id: event.sensor_id,
            start_time: event.start_time,
            end_time: event.start_time,
            duration_sec: 0.0,
            max_intensity: event.intensity,
            avg_intensity: f64::from(event.intensity),
        }));

        Ok(event_id)
    }

    async fn record_sample(&mut self, sample: &Sample) -> Result<()> {
        self.pending.push(PendingWrite::Sample(sample.clone()));
        Ok(())
    }

    async fn close_event(&mut self, event_id: i64, summary: &EventSummary) -> Result<()> {
        let known = self.has_pending_event(event_id) || self.tables.lock().await.events.contains_key(&event_id);
        if !known {
            return Err(Error::NotFound(format!("Event {} not found", event_id)).into());
        }

        self.pending.push(PendingWrite::CloseEvent(event_id, *summary));
        Ok(())
    }

    async fn save_state(&mut self, state: &SensorState) -> Result<()> {
        if state.sensor_id != self.state.sensor_id {
            return Err(Error::Internal(format!(
                "transaction for sensor {} cannot write sensor {}",
                self.state.sensor_id, state.sensor_id
            ))
            .into());
        }

        self.pending.push(PendingWrite::State(state.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            tables,
            state,
            pending,
        } = *self;
        let mut tables = tables.lock().await;

        if !tables.sensors.contains_key(&state.sensor_id) {
            return Err(Error::UnknownSensor(state.sensor_id).into());
        }

        for write in pending {
            match write {
                PendingWrite::OpenEvent(record) => {
                    tables.events.insert(record.event_id, record);
                }
                PendingWrite::Sample(sample) => tables.samples.push(sample),
                PendingWrite::CloseEvent(event_id, summary) => {
                    if let Some(record) = tables.events.get_mut(&event_id) {
                        record.end_time = summary.end_time;
                        record.duration_sec = summary.duration_sec;
                        record.max_intensity = summary.max_intensity;
                        record.avg_intensity = summary.avg_intensity;
                    }
                }
                PendingWrite::State(state) => {
                    tables.sensors.insert(state.sensor_id, state);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl DetectionStore for MemoryStore {
    async fn begin(&self, sensor_id: i64) -> Result<Box<dyn SensorTransaction>> {
        let state = self
            .tables
            .lock()
            .await
            .sensors
            .get(&sensor_id)
            .cloned()
            .ok_or(Error::UnknownSensor(sensor_id))?;

        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            state,
            pending: Vec::new(),
        }))
    }

    async fn register_sensor(&self, sensor_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.sensors.contains_key(&sensor_id) {
            return Ok(false);
        }

        tables.sensors.insert(sensor_id, SensorState::new(sensor_id));
        Ok(true)
    }

    async fn sensor_state(&self, sensor_id: i64) -> Result<Option<SensorState>> {
        Ok(self.tables.lock().await.sensors.get(&sensor_id).cloned())
    }

    async fn recent_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        let tables = self.tables.lock().await;
        let limit = usize::try_from(filter.limit.max(0)).unwrap_or(usize::MAX);

        let events = tables
            .events
            .values()
            .rev()
            .filter(|e| filter.sensor_id.map_or(true, |id| e.sensor_id == id))
            .filter(|e| {
                !filter.closed_only
                    || !tables
                        .sensors
                        .values()
                        .any(|s| s.current_event_id == Some(e.event_id))
            })
            .take(limit)
            .cloned()
            .collect();

        Ok(events)
    }

    async fn event_samples(&self, event_id: i64) -> Result<Vec<Sample>> {
        let tables = self.tables.lock().await;
        let mut samples: Vec<Sample> = tables
            .samples
            .iter()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal timestamps.
        samples.sort_by_key(|s| s.recorded_at);
        Ok(samples)
    }
}
