//! Device-A status decode and control logic.

use std::collections::VecDeque;

use super::commands::{status_flags, RangeMode, RawStatusExtended};
use crate::error::EngineError;

/// A fully decoded `READ_DATA_EXTENDED` response plus the derived PPM
/// reporting fields exposed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct Phx21Status {
    pub air_pressure_hpsi: f64,
    pub tank_pressure_hpsi: f64,
    pub thermocouple_f: f64,
    pub chamber_outer_temp_f: f64,
    pub system_current_ma: u16,
    pub pump_power_pct: u8,
    pub fid_range: RangeMode,
    pub raw_ppm: f64,
    pub long_average_ppm: Option<f64>,
    pub short_average_ppm: Option<f64>,
    pub use_average: bool,
    pub is_ignited: bool,
    pub is_pump_a_on: bool,
    pub is_solenoid_a_on: bool,
    pub is_solenoid_b_on: bool,
    pub pico_amps_tenths: i32,
    pub battery_v: f64,
    /// `None` means "N/A" — not ignited.
    pub reported_ppm: Option<f64>,
}

/// Actions the caller (the polling worker) must take in response to a
/// decoded status, kept separate from the pure decode so this module stays
/// free of any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAction {
    None,
    SwitchTo(RangeMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwAverageAction {
    None,
    SetSamplesToAvg(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpSafetyAction {
    None,
    TripSafety,
}

pub struct DecodeOutcome {
    pub status: Phx21Status,
    pub range_action: RangeAction,
    pub hw_average_action: HwAverageAction,
    pub pump_safety_action: PumpSafetyAction,
}

fn tenths_k_to_f(tenths_k: u16) -> f64 {
    let kelvin = tenths_k as f64 / 10.0;
    round1((kelvin - 273.15) * 1.8 + 32.0)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// PPM rounding rule shared by raw and short-average values: clamp at 0,
/// round to an integer at/above 100, else round to one decimal.
fn round_ppm(v: f64) -> f64 {
    let v = v.max(0.0);
    if v >= 100.0 {
        v.round()
    } else {
        round1(v)
    }
}

/// Long-average rounding always keeps one decimal, even at/above 100 — a
/// divergence from [`round_ppm`] that the source system itself has.
/// Preserved deliberately; do not normalize it to match `round_ppm`.
fn round_long_avg(v: f64) -> f64 {
    round1(v.max(0.0))
}

pub struct ControlConfig {
    pub long_average_count: usize,
    pub short_average_count: usize,
    pub use_avg_percent: f64,
    pub past_ppm_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            long_average_count: 25,
            short_average_count: 5,
            use_avg_percent: 10.0,
            past_ppm_capacity: 50,
        }
    }
}

/// Mutable control-plane state carried across decodes: junk filter counter,
/// ignition hysteresis, zero-dithering streak, range-switch debounce,
/// hardware-averaging setting, and the PPM sliding window.
pub struct ControlState {
    config: ControlConfig,
    junk_count: u32,
    prev_ignited: Option<bool>,
    changed_count: u32,
    zero_streak: u32,
    range_change_count: u32,
    hw_avg_samples: u8,
    past_ppms: VecDeque<f64>,
}

impl ControlState {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            junk_count: 0,
            prev_ignited: None,
            changed_count: 0,
            zero_streak: 0,
            range_change_count: 0,
            hw_avg_samples: 10,
            past_ppms: VecDeque::new(),
        }
    }

    pub fn junk_count(&self) -> u32 {
        self.junk_count
    }

    /// Decodes a raw `READ_DATA_EXTENDED` payload, applies the junk filter,
    /// ignition hysteresis, range-switch and hardware-averaging checks, and
    /// PPM averaging, returning everything the caller needs to act on.
    ///
    /// Returns `Err(EngineError::SuspectData)` when the junk filter rejects
    /// the sample and the 10-consecutive-junk acceptance threshold has not
    /// yet been reached.
    pub fn ingest(&mut self, payload: &[u8]) -> Result<DecodeOutcome, EngineError> {
        let raw = RawStatusExtended::decode(payload).ok_or(EngineError::SuspectData)?;

        let battery_v = raw.battery_tenths_v as f64 / 10.0;
        let pico_amps = raw.pico_amps_tenths;
        let thermocouple_f = tenths_k_to_f(raw.thermocouple_tenths_k);
        let pump_power_pct = raw.pump_power_pct;

        let is_junk =
            battery_v > 15.0 || pico_amps < -10_000 || thermocouple_f < -400.0 || pump_power_pct > 100;
        if is_junk {
            self.junk_count += 1;
            if self.junk_count <= 10 {
                return Err(EngineError::SuspectData);
            }
            // After 10 consecutive junks, accept the sample anyway.
        } else {
            self.junk_count = 0;
        }

        let fid_range = RangeMode::from_byte(raw.fid_range).unwrap_or(RangeMode::Lo);
        let is_pump_a_on = raw.status_flags & status_flags::PUMP_A != 0;
        let is_solenoid_a_on = raw.status_flags & status_flags::SOL_A != 0;
        let is_solenoid_b_on = raw.status_flags & status_flags::SOL_B != 0;

        let candidate_ignited = thermocouple_f > 75.0 && is_solenoid_a_on && is_pump_a_on;
        let is_ignited = self.commit_ignition(candidate_ignited);

        let raw_ppm = round_ppm(raw.ppm_tenths as f64 * 0.1);
        self.push_ppm(raw_ppm);

        let long_average_ppm = self.long_average();
        let short_average_ppm = self.short_average();
        let use_average = self.use_average(long_average_ppm);

        let averaged_report = if use_average {
            match fid_range {
                RangeMode::Max => long_average_ppm,
                _ => short_average_ppm,
            }
        } else {
            Some(raw_ppm)
        };

        let reported_ppm = if is_ignited {
            averaged_report.map(|v| self.dither_zero(v))
        } else {
            None
        };

        let range_action = self.check_range_switch(fid_range, pico_amps);
        let hw_average_action = self.check_hw_average(pico_amps);
        let pump_safety_action = if is_ignited && pump_power_pct >= 85 {
            PumpSafetyAction::TripSafety
        } else {
            PumpSafetyAction::None
        };

        Ok(DecodeOutcome {
            status: Phx21Status {
                air_pressure_hpsi: raw.air_pressure_tenths_hpsi as f64 / 10.0,
                tank_pressure_hpsi: raw.tank_pressure_tenths_hpsi as f64 / 10.0,
                thermocouple_f,
                chamber_outer_temp_f: tenths_k_to_f(raw.chamber_outer_tenths_k),
                system_current_ma: raw.system_current_ma,
                pump_power_pct,
                fid_range,
                raw_ppm,
                long_average_ppm,
                short_average_ppm,
                use_average,
                is_ignited,
                is_pump_a_on,
                is_solenoid_a_on,
                is_solenoid_b_on,
                pico_amps_tenths: pico_amps,
                battery_v,
                reported_ppm,
            },
            range_action,
            hw_average_action,
            pump_safety_action,
        })
    }

    fn commit_ignition(&mut self, candidate: bool) -> bool {
        match self.prev_ignited {
            None => {
                self.prev_ignited = Some(candidate);
                self.changed_count = 0;
                candidate
            }
            Some(prev) => {
                if candidate != prev {
                    self.changed_count += 1;
                    if self.changed_count >= 3 {
                        self.prev_ignited = Some(candidate);
                        self.changed_count = 0;
                    }
                } else {
                    self.changed_count = 0;
                }
                self.prev_ignited.unwrap()
            }
        }
    }

    fn push_ppm(&mut self, ppm: f64) {
        self.past_ppms.push_back(ppm);
        while self.past_ppms.len() > self.config.past_ppm_capacity {
            self.past_ppms.pop_front();
        }
    }

    fn tail(&self, count: usize) -> Vec<f64> {
        let len = self.past_ppms.len();
        if len == 0 {
            return Vec::new();
        }
        let start = len.saturating_sub(count);
        self.past_ppms.iter().skip(start).copied().collect()
    }

    fn long_average(&self) -> Option<f64> {
        let tail = self.tail(self.config.long_average_count);
        if tail.is_empty() {
            return None;
        }
        let avg = tail.iter().sum::<f64>() / tail.len() as f64;
        Some(round_long_avg(avg))
    }

    fn short_average(&self) -> Option<f64> {
        let tail = self.tail(self.config.short_average_count);
        if tail.is_empty() {
            return None;
        }
        let avg = tail.iter().sum::<f64>() / tail.len() as f64;
        Some(round_ppm(avg))
    }

    fn use_average(&self, long_average: Option<f64>) -> bool {
        let Some(long_avg) = long_average else {
            return false;
        };
        let tail = self.tail(self.config.short_average_count);
        if tail.len() < self.config.short_average_count {
            return false;
        }
        let band = long_avg.abs() * (self.config.use_avg_percent / 100.0);
        tail.iter().all(|sample| (sample - long_avg).abs() <= band)
    }

    fn dither_zero(&mut self, ppm: f64) -> f64 {
        if ppm == 0.0 {
            self.zero_streak += 1;
            if self.zero_streak > 5 {
                0.1
            } else {
                ppm
            }
        } else {
            self.zero_streak = 0;
            ppm
        }
    }

    fn check_range_switch(&mut self, fid_range: RangeMode, pico_amps: i32) -> RangeAction {
        let trigger = match fid_range {
            RangeMode::Lo if pico_amps >= 6500 => Some(RangeMode::Max),
            RangeMode::Max if pico_amps <= 6000 => Some(RangeMode::Lo),
            _ => None,
        };
        match trigger {
            Some(target) => {
                // The switch-debounce counter is incremented then compared
                // against >= 1, so it fires on the first qualifying sample.
                // Kept for future tunability.
                self.range_change_count += 1;
                if self.range_change_count >= 1 {
                    self.range_change_count = 0;
                    RangeAction::SwitchTo(target)
                } else {
                    RangeAction::None
                }
            }
            None => {
                self.range_change_count = 0;
                RangeAction::None
            }
        }
    }

    fn check_hw_average(&mut self, pico_amps: i32) -> HwAverageAction {
        if pico_amps <= 100 && self.hw_avg_samples == 10 {
            self.hw_avg_samples = 50;
            HwAverageAction::SetSamplesToAvg(50)
        } else if pico_amps > 100 && self.hw_avg_samples == 50 {
            self.hw_avg_samples = 10;
            HwAverageAction::SetSamplesToAvg(10)
        } else {
            HwAverageAction::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_a::commands::STATUS_EXTENDED_LEN;

    fn status_payload(
        battery_tenths_v: u16,
        pico_amps_tenths: i32,
        thermocouple_tenths_k: u16,
        flags: u8,
        ppm_tenths: u32,
        fid_range: u8,
        pump_power_pct: u8,
    ) -> Vec<u8> {
        let mut buf = vec![0u8; STATUS_EXTENDED_LEN];
        buf[0..2].copy_from_slice(&battery_tenths_v.to_le_bytes());
        buf[2..6].copy_from_slice(&pico_amps_tenths.to_le_bytes());
        buf[6..8].copy_from_slice(&thermocouple_tenths_k.to_le_bytes());
        buf[16] = pump_power_pct;
        buf[17] = fid_range;
        buf[18] = flags;
        buf[20..24].copy_from_slice(&ppm_tenths.to_le_bytes());
        buf
    }

    fn ignited_payload(ppm_tenths: u32) -> Vec<u8> {
        // ThermoCouple=500F -> tenths-K for 500F: K = (500-32)/1.8+273.15
        let kelvin = (500.0 - 32.0) / 1.8 + 273.15;
        let tenths_k = (kelvin * 10.0).round() as u16;
        status_payload(
            120,
            1000,
            tenths_k,
            status_flags::PUMP_A | status_flags::SOL_A,
            ppm_tenths,
            RangeMode::Lo as u8,
            10,
        )
    }

    #[test]
    fn ignition_hysteresis_flips_only_on_third_candidate() {
        let mut state = ControlState::new(ControlConfig::default());
        // First decode establishes baseline (bypasses the counter).
        let outcome = state.ingest(&ignited_payload(100)).unwrap();
        assert!(outcome.status.is_ignited);

        // Three "not ignited" candidates (flags cleared) are needed to flip.
        let not_ignited = status_payload(120, 1000, 2000, 0, 0, RangeMode::Lo as u8, 10);
        let o1 = state.ingest(&not_ignited).unwrap();
        assert!(o1.status.is_ignited, "should not flip after 1 candidate");
        let o2 = state.ingest(&not_ignited).unwrap();
        assert!(o2.status.is_ignited, "should not flip after 2 candidates");
        let o3 = state.ingest(&not_ignited).unwrap();
        assert!(!o3.status.is_ignited, "should flip on the 3rd candidate");
    }

    #[test]
    fn junk_filter_resets_on_first_clean_sample() {
        let mut state = ControlState::new(ControlConfig::default());
        // BatteryV = 16.0V is junk.
        let junk = status_payload(160, 0, 2000, 0, 0, RangeMode::Lo as u8, 0);
        assert!(matches!(state.ingest(&junk), Err(EngineError::SuspectData)));
        assert_eq!(state.junk_count(), 1);

        let clean = status_payload(120, 0, 2000, 0, 0, RangeMode::Lo as u8, 0);
        let outcome = state.ingest(&clean).unwrap();
        assert_eq!(state.junk_count(), 0);
        assert_eq!(outcome.status.battery_v, 12.0);
    }

    #[test]
    fn ppm_averaging_reports_long_avg_when_flat_and_in_max_range() {
        let mut config = ControlConfig::default();
        config.long_average_count = 5;
        config.short_average_count = 5;
        let mut state = ControlState::new(config);
        for _ in 0..5 {
            let payload = {
                let kelvin = (500.0 - 32.0) / 1.8 + 273.15;
                let tenths_k = (kelvin * 10.0).round() as u16;
                status_payload(
                    120,
                    1000,
                    tenths_k,
                    status_flags::PUMP_A | status_flags::SOL_A,
                    500,
                    RangeMode::Max as u8,
                    10,
                )
            };
            state.ingest(&payload).unwrap();
        }
        let outcome = state.ingest(&{
            let kelvin = (500.0 - 32.0) / 1.8 + 273.15;
            let tenths_k = (kelvin * 10.0).round() as u16;
            status_payload(
                120,
                1000,
                tenths_k,
                status_flags::PUMP_A | status_flags::SOL_A,
                500,
                RangeMode::Max as u8,
                10,
            )
        }).unwrap();
        assert_eq!(outcome.status.long_average_ppm, Some(50.0));
        assert_eq!(outcome.status.short_average_ppm, Some(50.0));
        assert!(outcome.status.use_average);
        assert_eq!(outcome.status.reported_ppm, Some(50.0));
    }

    #[test]
    fn zero_dithering_substitutes_after_five_zeros() {
        let mut state = ControlState::new(ControlConfig::default());
        let mut last = None;
        for _ in 0..6 {
            let outcome = state.ingest(&ignited_payload(0)).unwrap();
            last = outcome.status.reported_ppm;
        }
        assert_eq!(last, Some(0.1));
    }

    #[test]
    fn range_switches_lo_to_max_on_first_qualifying_sample() {
        let mut state = ControlState::new(ControlConfig::default());
        let payload = status_payload(120, 6500, 2000, 0, 0, RangeMode::Lo as u8, 0);
        let outcome = state.ingest(&payload).unwrap();
        assert_eq!(outcome.range_action, RangeAction::SwitchTo(RangeMode::Max));
    }

    #[test]
    fn hw_average_bumps_to_50_when_pico_amps_low() {
        let mut state = ControlState::new(ControlConfig::default());
        let payload = status_payload(120, 50, 2000, 0, 0, RangeMode::Lo as u8, 0);
        let outcome = state.ingest(&payload).unwrap();
        assert_eq!(outcome.hw_average_action, HwAverageAction::SetSamplesToAvg(50));
    }

    #[test]
    fn pump_safety_trips_when_ignited_and_pump_power_high() {
        let mut state = ControlState::new(ControlConfig::default());
        let payload = ignited_payload(100);
        let mut payload = payload;
        payload[16] = 90; // pump power 90%
        let outcome = state.ingest(&payload).unwrap();
        assert_eq!(outcome.pump_safety_action, PumpSafetyAction::TripSafety);
    }
}
