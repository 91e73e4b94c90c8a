//! Device-A command identifiers and packed payload (de)serializers.
//!
//! Payloads are packed little-endian with no padding. We
//! reproduce each layout by hand with explicit, bound-checked byte reads
//! rather than relying on compiler struct layout.

/// Recognized `cmd_id`s.
pub mod cmd_id {
    pub const SET_SAMPLING_PARAMETERS: u8 = 0x04;
    pub const CONFIGURATION_READ: u8 = 0x0A;
    pub const INTEGRATION_CONTROL: u8 = 0x0C;
    pub const PUMP_AUX_1_CONTROL: u8 = 0x1B;
    pub const SET_PUMPA_CLOSED_LOOP: u8 = 0x1D;
    pub const SET_DEADHEAD_PARAMS: u8 = 0x1E;
    pub const AUTO_IGNITION_SEQUENCE: u8 = 0x20;
    pub const SET_CAL_H2PRES_COMPENSATION: u8 = 0x24;
    pub const READ_DATA_EXTENDED: u8 = 0x25;
    pub const GOODBYE: u8 = 0x26;
}

/// Status flag bits packed into the `FIDM_STATUS_EXTENDED` response.
pub mod status_flags {
    pub const PUMP_A: u8 = 0x01;
    pub const SOL_A: u8 = 0x04;
    pub const SOL_B: u8 = 0x08;
}

/// FID amplifier range modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RangeMode {
    Lo = 0,
    Mid = 1,
    Hi = 2,
    Max = 3,
}

impl RangeMode {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RangeMode::Lo),
            1 => Some(RangeMode::Mid),
            2 => Some(RangeMode::Hi),
            3 => Some(RangeMode::Max),
            _ => None,
        }
    }
}

/// `SET_SAMPLING_PARAMETERS` payload: a single range-mode byte.
pub struct SetSamplingParameters {
    pub range: RangeMode,
}

impl SetSamplingParameters {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.range as u8]
    }
}

/// `INTEGRATION_CONTROL` payload, sent during init and whenever adaptive
/// hardware averaging adjusts the charge multiplier.
pub struct IntegrationControl {
    pub mode: u8,
    pub charge_multiplier: u8,
    pub range: u8,
    pub integration_time_us: u32,
    pub samples_to_avg: u8,
    pub report_mode: u8,
}

impl IntegrationControl {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.push(self.mode);
        buf.push(self.charge_multiplier);
        buf.push(self.range);
        buf.extend_from_slice(&self.integration_time_us.to_le_bytes());
        buf.push(self.samples_to_avg);
        buf.push(self.report_mode);
        buf
    }
}

/// `SET_DEADHEAD_PARAMS` payload.
pub struct SetDeadheadParams {
    pub enable: bool,
    pub pressure_limit: u16,
    pub timeout_ms: u16,
}

impl SetDeadheadParams {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.push(self.enable as u8);
        buf.extend_from_slice(&self.pressure_limit.to_le_bytes());
        buf.extend_from_slice(&self.timeout_ms.to_le_bytes());
        buf
    }
}

/// `SET_CAL_H2PRES_COMPENSATION` payload.
pub struct SetCalH2PresCompensation {
    pub pos_per_thousand: i16,
    pub neg_per_thousand: i16,
}

impl SetCalH2PresCompensation {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        buf.extend_from_slice(&self.pos_per_thousand.to_le_bytes());
        buf.extend_from_slice(&self.neg_per_thousand.to_le_bytes());
        buf
    }
}

/// `SET_PUMPA_CLOSED_LOOP` payload.
pub struct SetPumpAClosedLoop {
    pub enable: bool,
    pub target: u16,
}

impl SetPumpAClosedLoop {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3);
        buf.push(self.enable as u8);
        buf.extend_from_slice(&self.target.to_le_bytes());
        buf
    }
}

/// `PUMP_AUX_1_CONTROL` payload.
pub struct PumpAux1Control {
    pub id: u8,
    pub power: u8,
    pub kick: u8,
}

impl PumpAux1Control {
    pub fn encode(&self) -> Vec<u8> {
        vec![self.id, self.power, self.kick]
    }
}

/// `AUTO_IGNITION_SEQUENCE` payload.
pub struct AutoIgnitionSequence {
    pub target_hpsi: u16,
    pub tolerance_hpsi: u16,
    pub min_temp_rise_tk: u16,
    pub max_pressure_wait_ms: u16,
    pub max_ignite_wait_ms: u16,
    pub sol_b_delay_ms: u16,
    pub pre_purge_pump_ms: u16,
    pub pre_purge_sol_a_ms: u16,
    pub start_stop: bool,
    pub use_glow_plug_b: bool,
}

impl AutoIgnitionSequence {
    /// The fixed ignition recipe, parameterized only by on/off.
    pub fn fixed_recipe(start_stop: bool) -> Self {
        Self {
            target_hpsi: 175,
            tolerance_hpsi: 5,
            min_temp_rise_tk: 10,
            max_pressure_wait_ms: 10_000,
            max_ignite_wait_ms: 5_000,
            sol_b_delay_ms: 1_000,
            pre_purge_pump_ms: 5_000,
            pre_purge_sol_a_ms: 5_000,
            start_stop,
            use_glow_plug_b: false,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(18);
        buf.extend_from_slice(&self.target_hpsi.to_le_bytes());
        buf.extend_from_slice(&self.tolerance_hpsi.to_le_bytes());
        buf.extend_from_slice(&self.min_temp_rise_tk.to_le_bytes());
        buf.extend_from_slice(&self.max_pressure_wait_ms.to_le_bytes());
        buf.extend_from_slice(&self.max_ignite_wait_ms.to_le_bytes());
        buf.extend_from_slice(&self.sol_b_delay_ms.to_le_bytes());
        buf.extend_from_slice(&self.pre_purge_pump_ms.to_le_bytes());
        buf.extend_from_slice(&self.pre_purge_sol_a_ms.to_le_bytes());
        buf.push(self.start_stop as u8);
        buf.push(self.use_glow_plug_b as u8);
        buf
    }
}

/// Raw `FIDM_STATUS_EXTENDED` layout, byte offsets documented here so the
/// unit tests can assert them directly rather than trusting struct layout.
///
/// | offset | width | field                         |
/// |-------:|------:|-------------------------------|
/// |      0 |     2 | battery volts, tenths-of-volt  |
/// |      2 |     4 | pico-amps, tenths-of-pA (i32)  |
/// |      6 |     2 | thermocouple, tenths-of-Kelvin |
/// |      8 |     2 | chamber outer temp, tenths-K   |
/// |     10 |     2 | air pressure, tenths-of-hPSI   |
/// |     12 |     2 | tank pressure, tenths-of-hPSI  |
/// |     14 |     2 | system current, mA             |
/// |     16 |     1 | pump power, percent            |
/// |     17 |     1 | FID range mode                 |
/// |     18 |     1 | status flag bits                |
/// |     19 |     1 | reserved                        |
/// |     20 |     4 | PPM, tenths (u32 LE)            |
pub const STATUS_EXTENDED_LEN: usize = 24;

#[derive(Debug, Clone)]
pub struct RawStatusExtended {
    pub battery_tenths_v: u16,
    pub pico_amps_tenths: i32,
    pub thermocouple_tenths_k: u16,
    pub chamber_outer_tenths_k: u16,
    pub air_pressure_tenths_hpsi: u16,
    pub tank_pressure_tenths_hpsi: u16,
    pub system_current_ma: u16,
    pub pump_power_pct: u8,
    pub fid_range: u8,
    pub status_flags: u8,
    pub ppm_tenths: u32,
}

impl RawStatusExtended {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < STATUS_EXTENDED_LEN {
            return None;
        }
        Some(Self {
            battery_tenths_v: u16::from_le_bytes([buf[0], buf[1]]),
            pico_amps_tenths: i32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]),
            thermocouple_tenths_k: u16::from_le_bytes([buf[6], buf[7]]),
            chamber_outer_tenths_k: u16::from_le_bytes([buf[8], buf[9]]),
            air_pressure_tenths_hpsi: u16::from_le_bytes([buf[10], buf[11]]),
            tank_pressure_tenths_hpsi: u16::from_le_bytes([buf[12], buf[13]]),
            system_current_ma: u16::from_le_bytes([buf[14], buf[15]]),
            pump_power_pct: buf[16],
            fid_range: buf[17],
            status_flags: buf[18],
            ppm_tenths: u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_control_encodes_fixed_width_fields() {
        let ic = IntegrationControl {
            mode: 0,
            charge_multiplier: 1,
            range: 7,
            integration_time_us: 50_000,
            samples_to_avg: 10,
            report_mode: 0,
        };
        let buf = ic.encode();
        assert_eq!(buf.len(), 9);
        assert_eq!(&buf[3..7], &50_000u32.to_le_bytes());
    }

    #[test]
    fn raw_status_extended_round_trips_offsets() {
        let mut buf = vec![0u8; STATUS_EXTENDED_LEN];
        buf[0..2].copy_from_slice(&120u16.to_le_bytes()); // 12.0V
        buf[2..6].copy_from_slice(&7000i32.to_le_bytes());
        buf[20..24].copy_from_slice(&1000u32.to_le_bytes());
        let decoded = RawStatusExtended::decode(&buf).unwrap();
        assert_eq!(decoded.battery_tenths_v, 120);
        assert_eq!(decoded.pico_amps_tenths, 7000);
        assert_eq!(decoded.ppm_tenths, 1000);
    }

    #[test]
    fn raw_status_extended_rejects_short_buffers() {
        assert!(RawStatusExtended::decode(&[0u8; STATUS_EXTENDED_LEN - 1]).is_none());
    }
}
