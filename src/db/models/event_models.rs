use crate::db::models::iso_seconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One detected shaking event (`quake_logs` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub event_id: i64,
    pub sensor_id: i64,
    #[serde(with = "iso_seconds")]
    pub start_time: DateTime<Utc>,
    /// Equal to `start_time` until the event is closed
    #[serde(with = "iso_seconds")]
    pub end_time: DateTime<Utc>,
    pub duration_sec: f64,
    pub max_intensity: i32,
    pub avg_intensity: f64,
}

/// Values an event is created with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewEvent {
    pub sensor_id: i64,
    pub start_time: DateTime<Utc>,
    pub intensity: i32,
}

/// Final figures written when an event closes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSummary {
    pub end_time: DateTime<Utc>,
    pub duration_sec: f64,
    pub max_intensity: i32,
    pub avg_intensity: f64,
}

/// Raw reading recorded while an event is open (`quake_event_samples` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sample {
    pub event_id: i64,
    pub sensor_id: i64,
    pub intensity: i32,
    #[serde(with = "iso_seconds")]
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    #[serde(with = "iso_seconds")]
    pub recorded_at: DateTime<Utc>,
    pub intensity: i32,
}

/// Replay of an event's samples in recording order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTimeline {
    pub event_id: i64,
    pub samples: Vec<TimelinePoint>,
}

impl EventTimeline {
    pub fn from_samples(event_id: i64, samples: Vec<Sample>) -> Self {
        Self {
            event_id,
            samples: samples
                .into_iter()
                .map(|s| TimelinePoint {
                    recorded_at: s.recorded_at,
                    intensity: s.intensity,
                })
                .collect(),
        }
    }
}
