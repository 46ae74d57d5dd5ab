use crate::config::DetectionConfig;
use crate::db::models::{EventSummary, NewEvent, SensorReading, SensorState};
use chrono::{DateTime, Duration, Utc};

/// Engine tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    /// Intensity at or above which a sample counts as shaking
    pub threshold: i32,
    /// Quiet time, anchored at the first quiet sample, after which an event closes
    pub quiet_period: Duration,
}

impl DetectionSettings {
    pub fn new(threshold: i32, quiet_seconds: u64) -> Self {
        Self {
            threshold,
            quiet_period: Duration::seconds(i64::from(u32::try_from(quiet_seconds).unwrap_or(u32::MAX))),
        }
    }

    pub fn is_shaking(&self, intensity: i32) -> bool {
        intensity >= self.threshold
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self::new(40, 3)
    }
}

impl From<&DetectionConfig> for DetectionSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self::new(config.threshold, config.quiet_seconds)
    }
}

/// Storage work a sample calls for
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Idle and quiet: only the snapshot fields change
    Idle,
    /// Create the event, then record the sample against it
    Open(NewEvent),
    /// Shaking continues inside the open event
    Continue { event_id: i64 },
    /// First quiet sample of the open event; the debounce timer starts here
    StartQuiet { event_id: i64 },
    /// Still quiet, but not for long enough to close
    HoldQuiet { event_id: i64, quiet: Duration },
    /// Record the sample, then finalize the event
    Close { event_id: i64, summary: EventSummary },
}

impl Action {
    /// Event the incoming sample belongs to, if it is already known
    pub fn event_id(&self) -> Option<i64> {
        match self {
            Action::Idle | Action::Open(_) => None,
            Action::Continue { event_id }
            | Action::StartQuiet { event_id }
            | Action::HoldQuiet { event_id, .. }
            | Action::Close { event_id, .. } => Some(*event_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub action: Action,
    /// State to persist. After `Action::Open` the caller fills in `current_event_id`.
    pub next: SensorState,
}

/// Classify one sample against the sensor's current state.
///
/// Rules are evaluated in order:
/// 1. active and shaking: extend the event and clear the debounce timer;
/// 2. active and quiet: extend the event, then start, hold or expire the debounce timer;
/// 3. idle and shaking: open an event seeded from this sample;
/// 4. idle and quiet: nothing but the snapshot.
///
/// The snapshot fields are refreshed from the sample in every case.
pub fn step(
    settings: &DetectionSettings,
    state: &SensorState,
    reading: &SensorReading,
    now: DateTime<Utc>,
) -> Step {
    let shaking = settings.is_shaking(reading.intensity);
    let mut next = state.clone();

    let action = match (state.event_active, state.current_event_id, state.event_start_time) {
        (true, Some(event_id), Some(start_time)) => {
            next.max_intensity = next.max_intensity.max(reading.intensity);
            next.sum_intensity += i64::from(reading.intensity);
            next.sample_count += 1;

            if shaking {
                next.last_below_threshold = None;
                Action::Continue { event_id }
            } else {
                match state.last_below_threshold {
                    None => {
                        next.last_below_threshold = Some(now);
                        Action::StartQuiet { event_id }
                    }
                    Some(since) => {
                        let quiet = now - since;
                        if quiet < settings.quiet_period {
                            Action::HoldQuiet { event_id, quiet }
                        } else {
                            let summary = summarize(&next, start_time, now);
                            next.reset_event();
                            Action::Close { event_id, summary }
                        }
                    }
                }
            }
        }
        _ if shaking => {
            next.event_active = true;
            next.current_event_id = None;
            next.event_start_time = Some(now);
            next.max_intensity = reading.intensity;
            next.sum_intensity = i64::from(reading.intensity);
            next.sample_count = 1;
            next.last_below_threshold = None;
            Action::Open(NewEvent {
                sensor_id: state.sensor_id,
                start_time: now,
                intensity: reading.intensity,
            })
        }
        _ => Action::Idle,
    };

    next.shake = i16::from(shaking);
    next.intensity = reading.intensity;
    next.duration = reading.duration;
    next.timestamp = Some(now);

    Step { action, next }
}

/// Closing figures over the whole event, including the closing sample
fn summarize(aggregates: &SensorState, start_time: DateTime<Utc>, now: DateTime<Utc>) -> EventSummary {
    let elapsed = (now - start_time).num_milliseconds().max(0);

    EventSummary {
        end_time: now,
        duration_sec: elapsed as f64 / 1000.0,
        max_intensity: aggregates.max_intensity,
        avg_intensity: aggregates.sum_intensity as f64 / aggregates.sample_count.max(1) as f64,
    }
}
