//! Host-side collaborators for driving the supervisor outside a full
//! simulation: a scripted track environment and a reference braking-curve
//! evaluator. Used by the driver binary, the integration tests and the
//! benchmarks.

use atp_common::decode::{DecodeTable, TableError};
use atp_common::signal::Aspect;
use atp_common::traits::{BrakingCurve, TrackEnvironment};
use atp_common::units::from_kph;

/// One upcoming main signal of the scripted track.
#[derive(Debug, Clone, Copy)]
pub struct SignalAhead {
    pub aspect: Aspect,
    pub distance_m: f32,
    /// Announced speed limit [m/s]; ≤ 0 = none.
    pub speed_limit_mps: f32,
}

/// Programmable track environment.
///
/// Distances shrink as the train advances; a signal whose distance falls
/// below zero is dropped from the list, which makes the reported
/// nearest-signal distance jump — exactly the edge the supervisor's
/// signal-passed detection looks for.
#[derive(Debug, Clone)]
pub struct ScriptedEnvironment {
    pub speed_mps: f32,
    pub reverse: bool,
    pub train_length_m: f32,
    pub signals: Vec<SignalAhead>,
    pub current_line_speed_mps: f32,
    pub next_line_speed_mps: f32,
    pub next_line_speed_distance_m: f32,
    pub track_node_offset_m: f32,
    pub train_control_enabled: bool,
    pub speed_control_enabled: bool,
    pub alerter_enabled: bool,
}

impl ScriptedEnvironment {
    /// A quiet conventional line: 140 km/h, no signals ahead.
    pub fn conventional() -> Self {
        Self {
            speed_mps: 0.0,
            reverse: false,
            train_length_m: 200.0,
            signals: Vec::new(),
            current_line_speed_mps: from_kph(140.0),
            next_line_speed_mps: 0.0,
            next_line_speed_distance_m: f32::INFINITY,
            track_node_offset_m: 0.0,
            train_control_enabled: true,
            speed_control_enabled: true,
            alerter_enabled: true,
        }
    }

    /// A high-speed line at 300 km/h with uniform clear block sections.
    pub fn high_speed(section_limit_kph: f32, block_length_m: f32, blocks: usize) -> Self {
        let signals = (1..=blocks)
            .map(|i| SignalAhead {
                aspect: Aspect::Clear2,
                distance_m: block_length_m * i as f32,
                speed_limit_mps: from_kph(section_limit_kph),
            })
            .collect();
        Self {
            speed_mps: from_kph(300.0),
            signals,
            current_line_speed_mps: from_kph(300.0),
            track_node_offset_m: 1000.0,
            ..Self::conventional()
        }
    }

    /// Advance the train by one cycle; drops passed signals.
    pub fn advance(&mut self, dt_s: f32) {
        let travelled = self.speed_mps * dt_s;
        for signal in &mut self.signals {
            signal.distance_m -= travelled;
        }
        self.signals.retain(|s| s.distance_m > 0.0);
        self.next_line_speed_distance_m -= travelled;
        self.track_node_offset_m += travelled;
    }
}

impl TrackEnvironment for ScriptedEnvironment {
    fn next_signal_aspect(&self, index: usize) -> Option<Aspect> {
        self.signals.get(index).map(|s| s.aspect)
    }

    fn next_signal_distance_m(&self, index: usize) -> f32 {
        self.signals
            .get(index)
            .map_or(f32::INFINITY, |s| s.distance_m)
    }

    fn next_signal_speed_limit_mps(&self, index: usize) -> f32 {
        self.signals.get(index).map_or(0.0, |s| s.speed_limit_mps)
    }

    fn next_distant_signal_aspect(&self) -> Option<Aspect> {
        None
    }

    fn next_distant_signal_distance_m(&self) -> f32 {
        f32::INFINITY
    }

    fn current_line_speed_limit_mps(&self) -> f32 {
        self.current_line_speed_mps
    }

    fn next_line_speed_limit_mps(&self) -> f32 {
        self.next_line_speed_mps
    }

    fn next_line_speed_distance_m(&self) -> f32 {
        self.next_line_speed_distance_m
    }

    fn speed_mps(&self) -> f32 {
        self.speed_mps
    }

    fn is_direction_reverse(&self) -> bool {
        self.reverse
    }

    fn train_length_m(&self) -> f32 {
        self.train_length_m
    }

    fn track_node_offset_m(&self) -> f32 {
        self.track_node_offset_m
    }

    fn next_diverging_switch_distance_m(&self, _range_m: f32) -> f32 {
        f32::INFINITY
    }

    fn next_trailing_diverging_switch_distance_m(&self, _range_m: f32) -> f32 {
        f32::INFINITY
    }

    fn is_train_control_enabled(&self) -> bool {
        self.train_control_enabled
    }

    fn is_speed_control_enabled(&self) -> bool {
        self.speed_control_enabled
    }

    fn is_alerter_enabled(&self) -> bool {
        self.alerter_enabled
    }
}

/// Reference kinematic braking-curve evaluator.
///
/// `v = sqrt(target² + 2·a·d) − a·delay`, clamped to the target speed.
/// Non-increasing as the distance shrinks, which is the contract the
/// supervision layers rely on.
#[derive(Debug, Clone, Copy)]
pub struct KinematicCurve;

impl BrakingCurve for KinematicCurve {
    fn max_speed(
        &self,
        target_distance_m: f32,
        target_speed_mps: f32,
        _slope: f32,
        delay_s: f32,
        deceleration_mps2: f32,
    ) -> f32 {
        let braking = (target_speed_mps * target_speed_mps
            + 2.0 * deceleration_mps2 * target_distance_m.max(0.0))
        .sqrt();
        (braking - deceleration_mps2 * delay_s).max(target_speed_mps)
    }
}

/// Decode table covering the aspect chain of the demo high-speed line
/// (320 clear → 300 announce → 270 announce → 270 execute → fallback).
pub fn demo_decode_table() -> Result<DecodeTable, TableError> {
    DecodeTable::from_toml_str(
        r#"
        [[row]]
        ve = "320"
        vc = "320V"
        va = "320"
        aspect = "320V"
        blinking = false
        control_speed_kph = 320.0
        end_control_speed_kph = 320.0
        deceleration_mps2 = 0.42

        [[row]]
        ve = "320"
        vc = "320V"
        va = "---"
        aspect = "320V"
        blinking = false
        control_speed_kph = 320.0
        end_control_speed_kph = 320.0
        deceleration_mps2 = 0.42

        [[row]]
        ve = "320"
        vc = "300"
        va = "---"
        aspect = "300A"
        blinking = false
        control_speed_kph = 320.0
        end_control_speed_kph = 300.0
        deceleration_mps2 = 0.42

        [[row]]
        ve = "300"
        vc = "270"
        va = "---"
        aspect = "270A"
        blinking = false
        control_speed_kph = 300.0
        end_control_speed_kph = 270.0
        deceleration_mps2 = 0.42

        [[row]]
        ve = "270"
        vc = "270V"
        va = "---"
        aspect = "270V"
        blinking = false
        control_speed_kph = 270.0
        end_control_speed_kph = 270.0
        deceleration_mps2 = 0.42

        [[row]]
        ve = "000"
        vc = "RRR"
        va = "---"
        aspect = "RRR"
        blinking = false
        control_speed_kph = 35.0
        end_control_speed_kph = 35.0
        deceleration_mps2 = 0.42
        "#,
    )
}
