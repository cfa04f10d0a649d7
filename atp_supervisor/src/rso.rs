//! Signal-repetition reflex layer.
//!
//! When the train passes a closed (restrictive) signal the driver must
//! acknowledge within a fixed delay, otherwise the layer demands emergency
//! braking. The acknowledgment lamp blinks until acknowledged, then freezes
//! steady for the rest of the block section.

use atp_common::signal::Aspect;
use atp_common::timing::{Blinker, Timer};
use bitflags::bitflags;

use crate::consts::{SIGNAL_CAPTURE_DISTANCE_M, STANDSTILL_SPEED_MPS};
use crate::outputs::{CabControl, CycleOutput, SoundFlags};
use crate::snapshot::TrackSnapshot;

bitflags! {
    /// Conditions that suppress the reflex.
    ///
    /// The state machine still executes under inhibition; only the trigger
    /// paths are gated off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RsoInhibition: u8 {
        /// Running in reverse.
        const REVERSE = 0x01;
        /// Beacon supervisor active on an armed cab-signaled line: the
        /// optical trigger path is covered elsewhere.
        const CAB_SIGNALING_COVERED = 0x02;
        /// Continuous enforcement active (or no decoder fitted): the
        /// cab-signaling trigger path is covered elsewhere.
        const COVIT_COVERED = 0x04;
    }
}

/// Reflex acknowledgment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsoState {
    /// Power-up, never moved.
    Init,
    /// No pending acknowledgment.
    Off,
    /// Triggered while the button was already held.
    TriggeredPressed,
    /// Triggered, waiting for acknowledgment (lamp blinking).
    TriggeredBlinking,
    /// Acknowledged, lamp steady until the block section clears.
    TriggeredFixed,
}

/// Per-cycle inputs of the reflex layer.
pub struct RsoInput<'a> {
    pub snapshot: &'a TrackSnapshot,
    pub normal_signal_passed: bool,
    pub distant_signal_passed: bool,
    pub inhibition: RsoInhibition,
    /// Cab-signaling decoder armed (previous cycle).
    pub tvm_armed: bool,
    /// Cab-signaling closed/opened one-shot edges (previous cycle).
    pub tvm_closed_signal: bool,
    pub tvm_opened_signal: bool,
    pub rearm: bool,
}

/// Signal-repetition reflex.
#[derive(Debug)]
pub struct Rso {
    present: bool,
    state: RsoState,
    last_signal_aspect: Aspect,
    emergency: bool,
    pressed: bool,
    previous_pressed: bool,
    cancel_pressed: bool,
    closed_signal: bool,
    previous_closed_signal: bool,
    opened_signal: bool,
    blinker: Blinker,
    emergency_timer: Timer,
}

impl Rso {
    pub fn new(present: bool, delay_before_emergency_s: f32, blinker_frequency_hz: f32) -> Self {
        let mut blinker = Blinker::new(blinker_frequency_hz);
        blinker.start();
        Self {
            present,
            state: RsoState::Init,
            last_signal_aspect: Aspect::Clear1,
            // Latched until the mission starts or the driver rearms.
            emergency: true,
            pressed: false,
            previous_pressed: false,
            cancel_pressed: false,
            closed_signal: false,
            previous_closed_signal: false,
            opened_signal: false,
            blinker,
            emergency_timer: Timer::new(delay_before_emergency_s),
        }
    }

    /// Mission starts with the train already moving.
    pub fn init_moving(&mut self) {
        self.state = RsoState::Off;
        self.emergency = false;
    }

    #[inline]
    pub const fn emergency_braking(&self) -> bool {
        self.emergency
    }

    #[inline]
    pub const fn state(&self) -> RsoState {
        self.state
    }

    /// Acknowledge button.
    pub fn set_pressed(&mut self, pressed: bool) {
        self.pressed = pressed;
    }

    /// Lamp-cancel button.
    pub fn set_cancel_pressed(&mut self, pressed: bool) {
        self.cancel_pressed = pressed;
    }

    pub fn update(&mut self, dt_s: f32, input: &RsoInput<'_>, out: &mut CycleOutput) {
        if !(self.present && input.snapshot.speed_control_enabled) {
            return;
        }

        self.blinker.update(dt_s);
        self.emergency_timer.update(dt_s);

        let snap = input.snapshot;

        // Capture signal information when about to cross it.
        let normal_aspect = (snap.signal_distances_m[0] <= SIGNAL_CAPTURE_DISTANCE_M)
            .then_some(snap.signal_aspects[0])
            .flatten();
        // Distant signals only repeat approach information.
        let distant_aspect = (snap.distant_signal_distance_m <= SIGNAL_CAPTURE_DISTANCE_M)
            .then_some(snap.distant_signal_aspect)
            .flatten()
            .map(|aspect| aspect.min(Aspect::Approach1));

        if normal_aspect.is_some() || distant_aspect.is_some() {
            self.last_signal_aspect = normal_aspect
                .into_iter()
                .chain(distant_aspect)
                .max()
                .unwrap_or(self.last_signal_aspect);
        }

        self.closed_signal = false;
        self.opened_signal = false;

        if (input.normal_signal_passed || input.distant_signal_passed)
            && !input.inhibition.contains(RsoInhibition::REVERSE)
            && !input.tvm_armed
            && snap.speed_mps > STANDSTILL_SPEED_MPS
        {
            if self.last_signal_aspect.is_closed() {
                self.closed_signal = true;
            } else {
                self.opened_signal = true;
            }
        }

        let optical_trigger = self.closed_signal
            && !input.inhibition.contains(RsoInhibition::CAB_SIGNALING_COVERED);
        let cab_signal_trigger =
            input.tvm_closed_signal && !input.inhibition.contains(RsoInhibition::COVIT_COVERED);

        if optical_trigger || cab_signal_trigger {
            self.emergency_timer.start();
            self.state = if self.pressed {
                RsoState::TriggeredPressed
            } else {
                RsoState::TriggeredBlinking
            };
        }

        if self.opened_signal || input.tvm_opened_signal || self.cancel_pressed {
            self.emergency_timer.stop();
            self.state = RsoState::Off;
        }

        match self.state {
            RsoState::Init => {
                if !self.blinker.started() {
                    self.blinker.start();
                }
                out.set_display(
                    CabControl::ClosedSignalLamp,
                    (self.blinker.on() || self.pressed) as u8,
                );
            }

            RsoState::Off => {
                if self.blinker.started() {
                    self.blinker.stop();
                }
                out.set_display(CabControl::ClosedSignalLamp, self.pressed as u8);
            }

            RsoState::TriggeredPressed => {
                out.set_display(CabControl::ClosedSignalLamp, 0);
                if !self.pressed {
                    self.state = RsoState::TriggeredFixed;
                    self.emergency_timer.stop();
                }
            }

            RsoState::TriggeredBlinking => {
                if !self.blinker.started() {
                    self.blinker.start();
                }
                out.set_display(CabControl::ClosedSignalLamp, self.blinker.on() as u8);
                if !self.pressed && self.previous_pressed {
                    self.state = RsoState::TriggeredFixed;
                    self.emergency_timer.stop();
                }
            }

            RsoState::TriggeredFixed => {
                out.set_display(CabControl::ClosedSignalLamp, 1);
            }
        }

        if self.emergency_timer.triggered() {
            if !self.emergency {
                tracing::warn!("reflex emergency: closed signal not acknowledged");
            }
            self.emergency = true;
        } else if input.rearm {
            self.emergency = false;
        }

        out.set_display(CabControl::RsoEmergencyLamp, self.emergency as u8);

        if self.closed_signal
            && !self.previous_closed_signal
            && !input.inhibition.contains(RsoInhibition::REVERSE)
        {
            out.trigger(SoundFlags::INFO_1);
        }

        self.previous_closed_signal = self.closed_signal;
        self.previous_pressed = self.pressed;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use atp_common::units::from_kph;
    use crate::snapshot::SIGNAL_LOOK_AHEAD;

    fn snapshot(speed_kph: f32) -> TrackSnapshot {
        TrackSnapshot {
            speed_mps: from_kph(speed_kph),
            direction_reverse: false,
            train_length_m: 200.0,
            signal_aspects: [None; SIGNAL_LOOK_AHEAD],
            signal_distances_m: [f32::INFINITY; SIGNAL_LOOK_AHEAD],
            signal_speed_limits_mps: [0.0; SIGNAL_LOOK_AHEAD],
            distant_signal_aspect: None,
            distant_signal_distance_m: f32::INFINITY,
            current_line_speed_mps: from_kph(140.0),
            next_line_speed_mps: 0.0,
            next_line_speed_distance_m: f32::INFINITY,
            track_node_offset_m: 0.0,
            next_diverging_switch_distance_m: f32::INFINITY,
            next_trailing_diverging_switch_distance_m: f32::INFINITY,
            speed_control_enabled: true,
            alerter_enabled: true,
        }
    }

    fn rso() -> Rso {
        let mut rso = Rso::new(true, 4.0, 6.0);
        rso.init_moving();
        rso
    }

    fn input(snapshot: &TrackSnapshot) -> RsoInput<'_> {
        RsoInput {
            snapshot,
            normal_signal_passed: false,
            distant_signal_passed: false,
            inhibition: RsoInhibition::COVIT_COVERED,
            tvm_armed: false,
            tvm_closed_signal: false,
            tvm_opened_signal: false,
            rearm: false,
        }
    }

    fn pass_closed_signal(rso: &mut Rso, snap: &mut TrackSnapshot) {
        snap.signal_aspects[0] = Some(Aspect::Approach1);
        snap.signal_distances_m[0] = 2.0;
        let mut inp = input(snap);
        inp.normal_signal_passed = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert_eq!(rso.state(), RsoState::TriggeredBlinking);
        assert!(out.sounds.contains(SoundFlags::INFO_1));
    }

    #[test]
    fn emergency_exactly_once_without_acknowledgment() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        pass_closed_signal(&mut rso, &mut snap);

        // Ride out the 4 s acknowledgment window.
        snap.signal_distances_m[0] = f32::INFINITY;
        snap.signal_aspects[0] = None;
        let mut raised = 0;
        for _ in 0..50 {
            let was = rso.emergency_braking();
            let mut out = CycleOutput::default();
            rso.update(0.1, &input(&snap), &mut out);
            if rso.emergency_braking() && !was {
                raised += 1;
            }
        }
        assert!(rso.emergency_braking());
        assert_eq!(raised, 1);
    }

    #[test]
    fn acknowledgment_within_window_prevents_emergency() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        pass_closed_signal(&mut rso, &mut snap);

        snap.signal_distances_m[0] = f32::INFINITY;
        snap.signal_aspects[0] = None;

        // Press and release inside the window.
        rso.set_pressed(true);
        let mut out = CycleOutput::default();
        rso.update(0.1, &input(&snap), &mut out);
        rso.set_pressed(false);
        let mut out = CycleOutput::default();
        rso.update(0.1, &input(&snap), &mut out);
        assert_eq!(rso.state(), RsoState::TriggeredFixed);

        for _ in 0..100 {
            let mut out = CycleOutput::default();
            rso.update(0.1, &input(&snap), &mut out);
        }
        assert!(!rso.emergency_braking());
        // Lamp frozen steady after acknowledgment.
        let mut out = CycleOutput::default();
        rso.update(0.1, &input(&snap), &mut out);
        assert_eq!(out.display(CabControl::ClosedSignalLamp), Some(1));
    }

    #[test]
    fn open_signal_cancels_pending_alarm() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        pass_closed_signal(&mut rso, &mut snap);

        snap.signal_aspects[0] = Some(Aspect::Clear1);
        snap.signal_distances_m[0] = 2.0;
        let mut inp = input(&snap);
        inp.normal_signal_passed = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert_eq!(rso.state(), RsoState::Off);

        for _ in 0..100 {
            let mut out = CycleOutput::default();
            rso.update(0.1, &input(&snap), &mut out);
        }
        assert!(!rso.emergency_braking());
    }

    #[test]
    fn reverse_running_inhibits_trigger() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        snap.signal_aspects[0] = Some(Aspect::Stop);
        snap.signal_distances_m[0] = 2.0;
        let mut inp = input(&snap);
        inp.normal_signal_passed = true;
        inp.inhibition = RsoInhibition::REVERSE | RsoInhibition::COVIT_COVERED;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert_eq!(rso.state(), RsoState::Off);
        assert!(!out.sounds.contains(SoundFlags::INFO_1));
    }

    #[test]
    fn cab_signaling_closed_edge_triggers_when_enforcement_inhibited() {
        let mut rso = rso();
        let snap = snapshot(100.0);
        let mut inp = input(&snap);
        inp.inhibition = RsoInhibition::empty(); // enforcement inhibited on board
        inp.tvm_closed_signal = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert_eq!(rso.state(), RsoState::TriggeredBlinking);
    }

    #[test]
    fn distant_signal_clamped_to_approach() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        snap.distant_signal_aspect = Some(Aspect::Clear2);
        snap.distant_signal_distance_m = 2.0;
        let mut inp = input(&snap);
        inp.distant_signal_passed = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        // Clear on a distant signal still reads as an approach aspect.
        assert_eq!(rso.state(), RsoState::TriggeredBlinking);
    }

    #[test]
    fn rearm_clears_only_after_signal_opens() {
        let mut rso = rso();
        let mut snap = snapshot(100.0);
        pass_closed_signal(&mut rso, &mut snap);
        snap.signal_distances_m[0] = f32::INFINITY;
        snap.signal_aspects[0] = None;
        for _ in 0..50 {
            let mut out = CycleOutput::default();
            rso.update(0.1, &input(&snap), &mut out);
        }
        assert!(rso.emergency_braking());

        // Rearm while the closed-signal window is still latched: ignored.
        let mut inp = input(&snap);
        inp.rearm = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert!(rso.emergency_braking());

        // Pass an open signal, then rearm.
        snap.signal_aspects[0] = Some(Aspect::Clear1);
        snap.signal_distances_m[0] = 2.0;
        let mut inp = input(&snap);
        inp.normal_signal_passed = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert!(rso.emergency_braking(), "open signal alone must not clear");

        let mut inp = input(&snap);
        inp.rearm = true;
        let mut out = CycleOutput::default();
        rso.update(0.1, &inp, &mut out);
        assert!(!rso.emergency_braking());
    }
}
