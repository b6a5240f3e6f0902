//! Telemetry scaling for radio valve modules.
//!
//! The cloud reports raw RF strength and battery millivolts; the gateway wants
//! 0-100% values. Both transforms follow the vendor-documented breakpoints.

/// Raw RF reading considered nominally "good". Lower raw values are stronger.
const SIGNAL_GOOD: f64 = 90.0;
const SIGNAL_RANGE: f64 = 30.0;

/// Percent steps matching the five voltage breakpoints (empty..full).
const BATTERY_STEPS: [f64; 5] = [0.0, 20.0, 50.0, 80.0, 100.0];

/// Map a raw RF strength reading to 0-100%.
///
/// Linear in the raw value: the nominal good reference (90) maps to 10%, and
/// a full range step (30) below it maps to 100%. Readings better than the
/// reference clamp to 100 rather than exceeding it; far worse clamp to 0.
pub fn signal_to_percent(raw: i32) -> u8 {
    let pct = ((SIGNAL_GOOD - f64::from(raw)) / SIGNAL_RANGE) * 90.0 + 10.0;
    pct.clamp(0.0, 100.0) as u8
}

/// Voltage breakpoints (millivolts) for empty/low/medium/high/full per
/// module type. Unknown types are filtered out by the engine's allowlist
/// before telemetry reaches this table.
fn battery_levels(module_type: &str) -> Option<[i32; 5]> {
    match module_type {
        "NRV" => Some([2100, 2200, 2400, 2700, 3200]),
        _ => None,
    }
}

/// Map a battery reading in millivolts to 0-100%.
///
/// At or above the full breakpoint returns 100; at or below empty returns 0;
/// in between, linear interpolation within the bracketing segment, floored
/// to an integer percent.
pub fn battery_to_percent(millivolts: i32, module_type: &str) -> Option<u8> {
    let levels = battery_levels(module_type)?;
    if millivolts >= levels[4] {
        return Some(100);
    }
    if millivolts <= levels[0] {
        return Some(0);
    }
    let seg = (0..4)
        .find(|&i| millivolts < levels[i + 1])
        .expect("millivolts below full breakpoint");
    let span = f64::from(levels[seg + 1] - levels[seg]);
    let frac = f64::from(millivolts - levels[seg]) / span;
    let pct = BATTERY_STEPS[seg] + frac * (BATTERY_STEPS[seg + 1] - BATTERY_STEPS[seg]);
    Some(pct.floor() as u8)
}
