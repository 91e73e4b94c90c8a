//! Device-B locked status map, CALPPM-derived ignition state, and the
//! readings-stream selectivity gate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::events::StatusProperties;

use super::message::{Message, MessageType};

/// Well-known property names both engines emit. Device-B wire keys
/// are matched against this table case-insensitively; anything else is
/// stored under its wire spelling so forward-compatible keys aren't dropped.
pub const KNOWN_PROPERTIES: &[&str] = &[
    "PPM", "PicoAmps", "PaOffset", "HPH2", "LPH2", "SamplePressure", "SamplePPL",
    "CombustionPressure", "CombustionPPL", "Vacuum", "InternalTemp", "ExternalTemp",
    "CaseTemp", "NeedleValve", "Heater", "GlowPlug", "Solenoid", "BatteryStatus",
    "BatteryCharge", "Current", "IsIgnited", "P1Target", "P2Target", "H2Target",
    "Altimeter", "Volts", "Timestamp",
];

fn canonical_property(key: &str) -> String {
    KNOWN_PROPERTIES
        .iter()
        .find(|known| known.eq_ignore_ascii_case(key))
        .map(|known| known.to_string())
        .unwrap_or_else(|| key.to_string())
}

fn now_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{secs}")
}

/// The sentinel `CALPPM` value that means "not ignited".
const NOT_IGNITED_SENTINEL: &str = "-100.00";

/// The outcome of folding one readings-bearing message into the status map.
pub struct AppliedReading {
    pub properties: StatusProperties,
    pub ppm: Option<f64>,
    pub is_ignited: bool,
}

/// A mutex-protected key/value status map, mirroring the source's reflective
/// status object with a plain concurrent map instead.
#[derive(Default)]
pub struct LockedStatus {
    properties: Mutex<StatusProperties>,
}

impl LockedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusProperties {
        self.properties.lock().unwrap().clone()
    }

    /// Parses `msg`'s recognized keys into the status map. `CALPPM`, when
    /// present, both sets the `PPM` property and determines `IsIgnited`.
    pub fn apply(&self, msg: &Message) -> AppliedReading {
        let mut properties = self.properties.lock().unwrap();
        let mut is_ignited = true;
        let mut saw_calppm = false;

        for (key, value) in &msg.params {
            if key.eq_ignore_ascii_case("CALPPM") {
                saw_calppm = true;
                is_ignited = value != NOT_IGNITED_SENTINEL;
                properties.0.insert("PPM".to_string(), value.clone());
            } else {
                properties.0.insert(canonical_property(key), value.clone());
            }
        }
        if saw_calppm {
            properties.0.insert("IsIgnited".to_string(), is_ignited.to_string());
        }
        properties.0.insert("Timestamp".to_string(), now_timestamp());

        let ppm = properties.get("PPM").and_then(|v| v.parse::<f64>().ok());

        AppliedReading {
            properties: properties.clone(),
            ppm,
            is_ignited,
        }
    }
}

/// Tracks which of the four periodic readings streams are currently enabled,
/// and decides whether an arriving stream is the most selective enabled one
///.
#[derive(Default)]
pub struct StreamGate {
    enabled: Mutex<[bool; 4]>,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, msg_type: MessageType, is_enabled: bool) {
        if let Some(idx) = MessageType::READINGS_STREAMS.iter().position(|t| *t == msg_type) {
            self.enabled.lock().unwrap()[idx] = is_enabled;
        }
    }

    pub fn is_primary(&self, msg_type: MessageType) -> bool {
        let Some(idx) = MessageType::READINGS_STREAMS.iter().position(|t| *t == msg_type) else {
            return false;
        };
        let enabled = self.enabled.lock().unwrap();
        enabled[idx] && enabled[..idx].iter().all(|e| !e)
    }
}

/// Bounds the PPM history to a fixed capacity of 250 samples; averaging
/// itself is delegated to the firmware's `CALPPM`.
pub struct LastPpms {
    capacity: usize,
    samples: Mutex<VecDeque<f64>>,
}

impl LastPpms {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, samples: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    pub fn push(&self, ppm: f64) {
        let mut samples = self.samples.lock().unwrap();
        samples.push_back(ppm);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.lock().unwrap().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(msg_type: MessageType, params: &[(&str, &str)]) -> Message {
        Message {
            msg_type,
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            unparsed: None,
        }
    }

    #[test]
    fn calppm_sentinel_marks_not_ignited() {
        let status = LockedStatus::new();
        let applied = status.apply(&reading(MessageType::Fidr, &[("CALPPM", "-100.00")]));
        assert!(!applied.is_ignited);
        assert_eq!(status.snapshot().get("IsIgnited"), Some("false"));
    }

    #[test]
    fn calppm_value_marks_ignited_and_sets_ppm() {
        let status = LockedStatus::new();
        let applied = status.apply(&reading(MessageType::Fidr, &[("CALPPM", "12.50")]));
        assert!(applied.is_ignited);
        assert_eq!(applied.ppm, Some(12.50));
    }

    #[test]
    fn unknown_keys_are_preserved_under_their_wire_spelling() {
        let status = LockedStatus::new();
        status.apply(&reading(MessageType::Rdng, &[("FOOBAR", "1")]));
        assert_eq!(status.snapshot().get("FOOBAR"), Some("1"));
    }

    #[test]
    fn last_ppms_evicts_oldest_past_capacity() {
        let history = LastPpms::new(3);
        for ppm in [1.0, 2.0, 3.0, 4.0] {
            history.push(ppm);
        }
        assert_eq!(history.snapshot(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn stream_gate_picks_the_most_selective_enabled_stream() {
        let gate = StreamGate::new();
        gate.set_enabled(MessageType::Rdng, true);
        gate.set_enabled(MessageType::Bats, true);
        assert!(gate.is_primary(MessageType::Rdng));
        assert!(!gate.is_primary(MessageType::Bats));

        gate.set_enabled(MessageType::Fidr, true);
        assert!(gate.is_primary(MessageType::Fidr));
        assert!(!gate.is_primary(MessageType::Rdng));
    }
}
