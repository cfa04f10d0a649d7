//! Per-cycle track snapshot.
//!
//! The orchestrator reads the environment exactly once per cycle into a
//! `TrackSnapshot`; the protection layers only ever see this read-only copy,
//! so there is a single, auditable place where external data enters the
//! decision path.

use atp_common::signal::Aspect;
use atp_common::traits::TrackEnvironment;

/// Signal look-ahead depth read into the snapshot. Twice the cab-signaling
/// block-section depth so skipped no-op sections cannot starve the build.
pub const SIGNAL_LOOK_AHEAD: usize = 20;

/// Range within which switch positions are queried [m].
const SWITCH_QUERY_RANGE_M: f32 = 500.0;

/// Read-only view of one control cycle's external data.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    /// Measured speed [m/s].
    pub speed_mps: f32,
    /// Cab direction is reverse.
    pub direction_reverse: bool,
    /// Consist length [m].
    pub train_length_m: f32,

    /// Upcoming main signal aspects, index 0 nearest.
    pub signal_aspects: [Option<Aspect>; SIGNAL_LOOK_AHEAD],
    /// Distances to the upcoming main signals [m].
    pub signal_distances_m: [f32; SIGNAL_LOOK_AHEAD],
    /// Speed limits announced by the upcoming main signals [m/s]; ≤ 0 = none.
    pub signal_speed_limits_mps: [f32; SIGNAL_LOOK_AHEAD],

    /// Next distant signal, if any.
    pub distant_signal_aspect: Option<Aspect>,
    /// Distance to the next distant signal [m].
    pub distant_signal_distance_m: f32,

    /// Current line speed limit [m/s].
    pub current_line_speed_mps: f32,
    /// Next line speed limit [m/s]; ≤ 0 = none.
    pub next_line_speed_mps: f32,
    /// Distance to the next line-speed post [m].
    pub next_line_speed_distance_m: f32,

    /// Front offset within the current track node [m].
    pub track_node_offset_m: f32,
    /// Distance to the next facing diverging switch [m].
    pub next_diverging_switch_distance_m: f32,
    /// Distance to the next trailing diverging switch [m].
    pub next_trailing_diverging_switch_distance_m: f32,

    /// Speed-supervision layers enabled.
    pub speed_control_enabled: bool,
    /// Vigilance layer enabled.
    pub alerter_enabled: bool,
}

impl TrackSnapshot {
    /// Capture one cycle's data from the environment.
    pub fn capture(env: &dyn TrackEnvironment) -> Self {
        let mut signal_aspects = [None; SIGNAL_LOOK_AHEAD];
        let mut signal_distances_m = [f32::INFINITY; SIGNAL_LOOK_AHEAD];
        let mut signal_speed_limits_mps = [0.0; SIGNAL_LOOK_AHEAD];
        for i in 0..SIGNAL_LOOK_AHEAD {
            signal_aspects[i] = env.next_signal_aspect(i);
            signal_distances_m[i] = env.next_signal_distance_m(i);
            signal_speed_limits_mps[i] = env.next_signal_speed_limit_mps(i);
        }

        Self {
            speed_mps: env.speed_mps(),
            direction_reverse: env.is_direction_reverse(),
            train_length_m: env.train_length_m(),
            signal_aspects,
            signal_distances_m,
            signal_speed_limits_mps,
            distant_signal_aspect: env.next_distant_signal_aspect(),
            distant_signal_distance_m: env.next_distant_signal_distance_m(),
            current_line_speed_mps: env.current_line_speed_limit_mps(),
            next_line_speed_mps: env.next_line_speed_limit_mps(),
            next_line_speed_distance_m: env.next_line_speed_distance_m(),
            track_node_offset_m: env.track_node_offset_m(),
            next_diverging_switch_distance_m: env
                .next_diverging_switch_distance_m(SWITCH_QUERY_RANGE_M),
            next_trailing_diverging_switch_distance_m: env
                .next_trailing_diverging_switch_distance_m(SWITCH_QUERY_RANGE_M),
            speed_control_enabled: env.is_speed_control_enabled(),
            alerter_enabled: env.is_alerter_enabled(),
        }
    }

    /// Next line speed limit with the "none" sentinel mapped to +∞ [m/s].
    #[inline]
    pub fn next_line_speed_or_unlimited_mps(&self) -> f32 {
        if self.next_line_speed_mps > 0.0 {
            self.next_line_speed_mps
        } else {
            f32::INFINITY
        }
    }
}
