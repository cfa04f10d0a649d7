//! Unit conversions.
//!
//! All speeds are carried as `f32` metres per second with `_mps` field
//! suffixes; km/h appears only at the configuration and logging boundaries.

/// Convert a speed from km/h to m/s.
#[inline]
pub fn from_kph(speed_kph: f32) -> f32 {
    speed_kph / 3.6
}

/// Convert a speed from m/s to km/h.
#[inline]
pub fn to_kph(speed_mps: f32) -> f32 {
    speed_mps * 3.6
}

/// Round a speed in m/s to the nearest whole km/h.
///
/// Look-ahead section speeds are matched against whole-km/h rule constants,
/// so the rounding has to be stable against float noise from the provider.
#[inline]
pub fn to_kph_rounded(speed_mps: f32) -> u32 {
    let kph = to_kph(speed_mps);
    if kph <= 0.0 { 0 } else { (kph + 0.5) as u32 }
}
