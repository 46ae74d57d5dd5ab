//! Storage seam of the detection engine.
//!
//! An ingestion call reads a sensor's state and issues its writes through one
//! [`SensorTransaction`]. Nothing becomes visible until [`SensorTransaction::commit`];
//! dropping the transaction discards every write made through it.

use crate::db::models::{EventRecord, EventSummary, NewEvent, Sample, SensorState};
use anyhow::Result;
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which events a history listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub sensor_id: Option<i64>,
    /// Leave out events that are still open
    pub closed_only: bool,
    pub limit: i64,
}

impl EventFilter {
    pub fn recent(limit: i64) -> Self {
        Self {
            sensor_id: None,
            closed_only: false,
            limit,
        }
    }
}

/// Writes of a single ingestion call against one sensor
#[async_trait]
pub trait SensorTransaction: Send {
    /// Sensor state as read when the transaction began
    fn state(&self) -> &SensorState;

    /// Create an event row and return its identifier
    async fn open_event(&mut self, event: &NewEvent) -> Result<i64>;

    async fn record_sample(&mut self, sample: &Sample) -> Result<()>;

    async fn close_event(&mut self, event_id: i64, summary: &EventSummary) -> Result<()>;

    async fn save_state(&mut self, state: &SensorState) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// The three detection tables: sensor state, event log and sample timeline
#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Start a write group for a sensor. Fails with `Error::UnknownSensor` when it is not provisioned.
    async fn begin(&self, sensor_id: i64) -> Result<Box<dyn SensorTransaction>>;

    /// Provision a sensor in the idle state. Returns false if it already existed.
    async fn register_sensor(&self, sensor_id: i64) -> Result<bool>;

    async fn sensor_state(&self, sensor_id: i64) -> Result<Option<SensorState>>;

    /// Events newest first
    async fn recent_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>>;

    /// Samples of an event ordered by `recorded_at` ascending
    async fn event_samples(&self, event_id: i64) -> Result<Vec<Sample>>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
