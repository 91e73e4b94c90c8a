//! Device-B error-code dictionary. Codes 5, 18, 19, 20, 21, 22, 24 have
//! fixed strings; code 21 includes the warmup time fetched via `WUTM`.
//!
//! Only code 22's text is known verbatim; the rest are written in the same
//! register but are not independently verifiable against source strings
//! (none were retrieved — see DESIGN.md).

/// Renders the human-readable message for a device-reported error code.
pub fn message_for(code: i32, warmup_time: Option<&str>) -> String {
    match code {
        5 => "Pressure sensor out of range.".to_string(),
        18 => "Ignition attempted without adequate hydrogen pressure.".to_string(),
        19 => "Ignition attempted without adequate combustion air pressure.".to_string(),
        20 => "Thermocouple reading is out of range.".to_string(),
        21 => format!(
            "Warming up, please wait {}.",
            warmup_time.unwrap_or("a moment")
        ),
        22 => "I can't run on H2 this low! Feed ME!".to_string(),
        24 => "Pump power safety cutoff tripped.".to_string(),
        other => format!("Unrecognized device error code {other}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_22_matches_the_documented_text_exactly() {
        assert_eq!(message_for(22, None), "I can't run on H2 this low! Feed ME!");
    }

    #[test]
    fn code_21_includes_the_warmup_time() {
        assert!(message_for(21, Some("45s")).contains("45s"));
    }
}
