//! Shared supervision constants.

/// Line speed above which the line counts as high-speed: the beacon
/// supervisor hands over to cab signaling at this boundary [km/h].
pub const HIGH_SPEED_LINE_THRESHOLD_KPH: f32 = 221.0;

/// Speed below which the train counts as stopped [m/s].
pub const STANDSTILL_SPEED_MPS: f32 = 0.1;

/// A signal's data is captured when the train is within this distance [m].
pub const SIGNAL_CAPTURE_DISTANCE_M: f32 = 5.0;

/// Number of warm-up cycles before the first full update, letting the
/// environment provider settle.
pub const WARMUP_CYCLES: u32 = 5;
