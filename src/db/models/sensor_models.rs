use crate::db::models::iso_seconds;
use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-sensor detection state, one `realtime_status` row per sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorState {
    pub sensor_id: i64,
    pub event_active: bool,
    pub current_event_id: Option<i64>,
    #[serde(with = "iso_seconds::option")]
    pub event_start_time: Option<DateTime<Utc>>,
    pub max_intensity: i32,
    pub sum_intensity: i64,
    pub sample_count: i64,
    #[serde(with = "iso_seconds::option")]
    pub last_below_threshold: Option<DateTime<Utc>>,
    // Last observed sample, refreshed on every ingestion
    pub shake: i16,
    pub intensity: i32,
    pub duration: f64,
    #[sqlx(rename = "observed_at")]
    #[serde(with = "iso_seconds::option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorState {
    /// A freshly provisioned sensor: idle and never observed
    pub fn new(sensor_id: i64) -> Self {
        Self {
            sensor_id,
            event_active: false,
            current_event_id: None,
            event_start_time: None,
            max_intensity: 0,
            sum_intensity: 0,
            sample_count: 0,
            last_below_threshold: None,
            shake: 0,
            intensity: 0,
            duration: 0.0,
            timestamp: None,
        }
    }

    /// Drop everything tied to the open event and go back to idle
    pub fn reset_event(&mut self) {
        self.event_active = false;
        self.current_event_id = None;
        self.event_start_time = None;
        self.last_below_threshold = None;
        self.max_intensity = 0;
        self.sum_intensity = 0;
        self.sample_count = 0;
    }

    /// `event_active`, `current_event_id` and `event_start_time` move together, and the
    /// debounce timer only runs inside an open event.
    pub fn check_invariants(&self) -> Result<()> {
        let linked = self.event_active == self.current_event_id.is_some()
            && self.event_active == self.event_start_time.is_some();
        if !linked {
            return Err(Error::Internal(format!(
                "sensor {} has inconsistent event fields (active={}, event_id={:?}, start={:?})",
                self.sensor_id, self.event_active, self.current_event_id, self.event_start_time
            ))
            .into());
        }

        if !self.event_active && (self.last_below_threshold.is_some() || self.sample_count != 0) {
            return Err(Error::Internal(format!(
                "sensor {} is idle but still carries event aggregates",
                self.sensor_id
            ))
            .into());
        }

        Ok(())
    }
}

/// A validated sample as accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor_id: i64,
    pub intensity: i32,
    pub duration: f64,
}

impl SensorReading {
    pub fn new(sensor_id: i64, intensity: i64, duration: f64) -> Result<Self> {
        if intensity < 0 {
            return Err(Error::InvalidInput(format!("intensity must be non-negative, got {}", intensity)).into());
        }
        let intensity = i32::try_from(intensity)
            .map_err(|_| Error::InvalidInput(format!("intensity out of range: {}", intensity)))?;

        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidInput(format!(
                "duration must be a non-negative number, got {}",
                duration
            ))
            .into());
        }

        Ok(Self {
            sensor_id,
            intensity,
            duration,
        })
    }
}

/// Current status of a sensor as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub sensor_id: i64,
    pub shake: i16,
    pub intensity: i32,
    pub duration: f64,
    #[serde(with = "iso_seconds::option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub event_active: bool,
    pub current_event_id: Option<i64>,
}

impl From<&SensorState> for SensorSnapshot {
    fn from(state: &SensorState) -> Self {
        Self {
            sensor_id: state.sensor_id,
            shake: state.shake,
            intensity: state.intensity,
            duration: state.duration,
            timestamp: state.timestamp,
            event_active: state.event_active,
            current_event_id: state.current_event_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn negative_intensity_is_invalid() {
        let err = SensorReading::new(1, -5, 0.0).unwrap_err();
        assert!(matches!(Error::find(&err), Some(Error::InvalidInput(_))));
    }

    #[test]
    fn non_finite_duration_is_invalid() {
        for duration in [f64::NAN, f64::INFINITY, -0.5] {
            let err = SensorReading::new(1, 10, duration).unwrap_err();
            assert!(matches!(Error::find(&err), Some(Error::InvalidInput(_))));
        }
    }

    #[test]
    fn oversized_intensity_is_invalid() {
        assert!(SensorReading::new(1, i64::from(i32::MAX) + 1, 0.0).is_err());
        assert!(SensorReading::new(1, i64::from(i32::MAX), 0.0).is_ok());
    }

    #[test]
    fn idle_state_with_event_id_breaks_invariants() {
        let mut state = SensorState::new(7);
        assert!(state.check_invariants().is_ok());

        state.current_event_id = Some(3);
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn debounce_timer_outside_event_breaks_invariants() {
        let mut state = SensorState::new(7);
        state.last_below_threshold = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn snapshot_serializes_second_precision_timestamp() {
        let mut state = SensorState::new(1);
        state.timestamp = Some(
            Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap() + chrono::Duration::milliseconds(250),
        );

        let json = serde_json::to_value(SensorSnapshot::from(&state)).unwrap();
        assert_eq!(json["timestamp"], "2024-03-09T12:30:05Z");
        assert_eq!(json["current_event_id"], serde_json::Value::Null);
        assert_eq!(json["event_active"], false);
    }
}
