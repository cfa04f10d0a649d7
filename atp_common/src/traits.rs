//! Collaborator interfaces.
//!
//! The supervisor never talks to the simulation directly: track data comes
//! in through [`TrackEnvironment`] (read once per cycle into a snapshot) and
//! stopping-distance evaluation through [`BrakingCurve`]. Both are supplied
//! by the host.

/// Read-only view of the track ahead, queried once per control cycle.
///
/// Look-ahead queries take a signal/post index (0 = nearest). Providers
/// signal "nothing known" with `None` aspects, infinite distances and
/// non-positive speed limits; the supervisor treats all three as "no
/// constraint from this source".
pub trait TrackEnvironment {
    /// Aspect of the index-th upcoming main signal.
    fn next_signal_aspect(&self, index: usize) -> Option<crate::signal::Aspect>;
    /// Distance to the index-th upcoming main signal [m].
    fn next_signal_distance_m(&self, index: usize) -> f32;
    /// Speed limit announced by the index-th upcoming main signal [m/s];
    /// non-positive = none.
    fn next_signal_speed_limit_mps(&self, index: usize) -> f32;

    /// Aspect of the next distant (warning) signal, if any.
    fn next_distant_signal_aspect(&self) -> Option<crate::signal::Aspect>;
    /// Distance to the next distant signal [m].
    fn next_distant_signal_distance_m(&self) -> f32;

    /// Speed limit of the current line section [m/s].
    fn current_line_speed_limit_mps(&self) -> f32;
    /// Speed limit of the next line section [m/s]; non-positive = none.
    fn next_line_speed_limit_mps(&self) -> f32;
    /// Distance to the next line-speed post [m].
    fn next_line_speed_distance_m(&self) -> f32;

    /// Measured train speed [m/s], always non-negative.
    fn speed_mps(&self) -> f32;
    /// Whether the cab drives the train in reverse.
    fn is_direction_reverse(&self) -> bool;
    /// Consist length [m].
    fn train_length_m(&self) -> f32;

    /// Offset of the train front within its current track node [m].
    fn track_node_offset_m(&self) -> f32;
    /// Distance to the next facing diverging switch within `range_m` [m];
    /// infinite if none.
    fn next_diverging_switch_distance_m(&self, range_m: f32) -> f32;
    /// Distance to the next trailing diverging switch within `range_m` [m];
    /// infinite if none.
    fn next_trailing_diverging_switch_distance_m(&self, range_m: f32) -> f32;

    /// Master switch for the whole supervisor.
    fn is_train_control_enabled(&self) -> bool;
    /// Speed-supervision layers enabled.
    fn is_speed_control_enabled(&self) -> bool;
    /// Vigilance layer enabled.
    fn is_alerter_enabled(&self) -> bool;
}

/// Kinematic braking-curve evaluator supplied by the host.
pub trait BrakingCurve {
    /// Maximum speed from which the train can still reach `target_speed_mps`
    /// at `target_distance_m`, given the slope, the reaction/establishment
    /// delay and the guaranteed deceleration [m/s].
    ///
    /// Callers rely on the result being non-increasing as the distance
    /// shrinks, and never below the target speed.
    fn max_speed(
        &self,
        target_distance_m: f32,
        target_speed_mps: f32,
        slope: f32,
        delay_s: f32,
        deceleration_mps2: f32,
    ) -> f32;
}
