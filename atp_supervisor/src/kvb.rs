//! Beacon overspeed supervisor layer.
//!
//! Tracks the nearest stop target and the nearest speed-restriction target
//! over a five-signal look-ahead, checks the measured speed against
//! braking-curve ceilings for every active constraint, and escalates
//! Normal → Alert → Emergency. Passing a stop signal is an immediate
//! emergency regardless of speed. On high-speed lines the layer stands down
//! and hands supervision over to the cab-signaling decoder, but keeps an
//! arming check: if the decoder is not armed shortly after the transition,
//! the layer brakes the train itself.

use atp_common::signal::Aspect;
use atp_common::timing::{Blinker, Odometer};
use atp_common::traits::BrakingCurve;
use atp_common::units::from_kph;

use crate::consts::{
    HIGH_SPEED_LINE_THRESHOLD_KPH, SIGNAL_CAPTURE_DISTANCE_M, STANDSTILL_SPEED_MPS,
};
use crate::outputs::{CabControl, CycleOutput, SoundFlags};
use crate::snapshot::TrackSnapshot;

/// Fixed delay between the alert and the emergency ceiling [s].
const EMERGENCY_DELAY_S: f32 = 5.0;
/// Look-ahead depth of the target searches [signals].
const SEARCH_DEPTH: usize = 5;
/// Distance over which targets stay unsupervised after power-up [m].
const INIT_DISTANCE_M: f32 = 4400.0;
/// Distance after the high-speed transition within which the decoder must
/// be armed [m].
const ARMING_CHECK_DISTANCE_M: f32 = 450.0;
/// Line speed at and below which pre-announce does not apply [km/h].
const PRE_ANNOUNCE_THRESHOLD_KPH: f32 = 160.0;
/// Distance to a line-speed drop that triggers pre-announce [m].
const PRE_ANNOUNCE_DISTANCE_M: f32 = 3000.0;
/// Proximity to a still-closed stop signal that downgrades the release
/// speed class [m].
const RELEASE_DOWNGRADE_DISTANCE_M: f32 = 200.0;
/// Last-signal speed cap while running on sight [km/h].
const ON_SIGHT_SPEED_KPH: f32 = 30.0;
/// Principal display blink frequency [Hz].
const PRINCIPAL_BLINK_HZ: f32 = 2.0;

/// Supervision escalation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KvbState {
    Normal,
    Alert,
    Emergency,
}

/// Pre-announce of an upcoming line-speed drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvbPreAnnounce {
    Deactivated,
    Armed,
    Triggered,
}

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvbMode {
    ConventionalLine,
    HighSpeedLine,
    /// Shunting movements; no transition enters it from line data.
    Shunting,
}

/// Release speed class of the stop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvbReleaseSpeed {
    V30,
    V10,
}

/// Line classification latched by the arming-check odometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Conventional,
    HighSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrincipalDisplay {
    Empty,
    Fu,
    V000,
    V00,
    L,
    B,
    P,
    Dashes3,
    Dashes9,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuxiliaryDisplay {
    Empty,
    V000,
    V00,
    L,
    P,
    Dashes3,
    Test,
}

/// Per-cycle inputs of the beacon supervisor.
pub struct KvbInput<'a> {
    pub snapshot: &'a TrackSnapshot,
    pub normal_signal_passed: bool,
    pub distant_signal_passed: bool,
    pub rearm: bool,
    /// A cab-signaling decoder is fitted.
    pub tvm_fitted: bool,
    /// Decoder armed (previous cycle).
    pub tvm_armed: bool,
    /// Line speed limit of the previous cycle [m/s].
    pub previous_line_speed_mps: f32,
    pub curve: &'a dyn BrakingCurve,
}

/// Beacon overspeed supervisor.
pub struct Kvb {
    present: bool,
    inhibited: bool,
    train_speed_limit_mps: f32,
    electro_pneumatic_brake: bool,
    heavy_freight: bool,
    safe_deceleration_mps2: f32,

    init: bool,
    spad_emergency: bool,
    overspeed_emergency: bool,
    state: KvbState,
    emergency_braking: bool,
    pre_announce: KvbPreAnnounce,
    mode: KvbMode,
    line_class: LineClass,
    arming_emergency: bool,

    principal_display: PrincipalDisplay,
    principal_blinking: bool,
    auxiliary_display: AuxiliaryDisplay,
    principal_blinker: Blinker,
    init_odometer: Odometer,
    arming_odometer: Odometer,

    last_signal_aspect: Aspect,
    last_signal_speed_limit_mps: f32,

    stop_target: Option<usize>,
    stop_target_distance_m: f32,
    release_speed: KvbReleaseSpeed,
    on_sight: bool,

    restriction_target: Option<usize>,
    restriction_distance_m: f32,
    restriction_speed_mps: f32,

    declivity: f32,

    current_line_speed_mps: f32,
    next_line_speed_mps: f32,
    next_line_speed_distance_m: f32,

    train_length_m: f32,
    braking_establishment_delay_s: f32,

    speed_too_high_light: bool,
    emergency_brake_light: bool,
}

impl Kvb {
    pub fn new(
        present: bool,
        inhibited: bool,
        train_speed_limit_mps: f32,
        electro_pneumatic_brake: bool,
        heavy_freight: bool,
        safe_deceleration_mps2: f32,
    ) -> Self {
        Self {
            present,
            inhibited,
            train_speed_limit_mps,
            electro_pneumatic_brake,
            heavy_freight,
            safe_deceleration_mps2,
            init: true,
            spad_emergency: false,
            overspeed_emergency: false,
            // Latched until the mission starts or the driver rearms.
            state: KvbState::Emergency,
            emergency_braking: true,
            pre_announce: KvbPreAnnounce::Deactivated,
            mode: KvbMode::ConventionalLine,
            line_class: LineClass::Conventional,
            arming_emergency: false,
            principal_display: PrincipalDisplay::Empty,
            principal_blinking: false,
            auxiliary_display: AuxiliaryDisplay::Empty,
            principal_blinker: Blinker::new(PRINCIPAL_BLINK_HZ),
            init_odometer: Odometer::new(INIT_DISTANCE_M),
            arming_odometer: Odometer::new(ARMING_CHECK_DISTANCE_M),
            last_signal_aspect: Aspect::Clear1,
            last_signal_speed_limit_mps: f32::INFINITY,
            stop_target: None,
            stop_target_distance_m: f32::INFINITY,
            release_speed: KvbReleaseSpeed::V30,
            on_sight: false,
            restriction_target: None,
            restriction_distance_m: f32::INFINITY,
            restriction_speed_mps: f32::INFINITY,
            declivity: 0.0,
            current_line_speed_mps: f32::INFINITY,
            next_line_speed_mps: f32::INFINITY,
            next_line_speed_distance_m: f32::INFINITY,
            train_length_m: 0.0,
            braking_establishment_delay_s: 2.0,
            speed_too_high_light: false,
            emergency_brake_light: false,
        }
    }

    /// Mission starts with the train already moving.
    pub fn init_moving(&mut self) {
        self.init = false;
        self.state = KvbState::Normal;
        self.emergency_braking = false;
    }

    /// Force high-speed-line mode (end-of-warm-up detection).
    pub fn force_high_speed_line(&mut self) {
        self.mode = KvbMode::HighSpeedLine;
    }

    /// Force the high-speed line classification (end-of-warm-up detection).
    pub fn force_high_speed_class(&mut self) {
        self.line_class = LineClass::HighSpeed;
    }

    #[inline]
    pub const fn emergency_braking(&self) -> bool {
        self.emergency_braking
    }

    /// Emergency raised by the decoder arming check.
    #[inline]
    pub const fn arming_emergency(&self) -> bool {
        self.arming_emergency
    }

    #[inline]
    pub const fn state(&self) -> KvbState {
        self.state
    }

    #[inline]
    pub const fn mode(&self) -> KvbMode {
        self.mode
    }

    #[inline]
    pub const fn pre_announce(&self) -> KvbPreAnnounce {
        self.pre_announce
    }

    #[inline]
    pub const fn on_sight(&self) -> bool {
        self.on_sight
    }

    #[inline]
    pub const fn release_speed(&self) -> KvbReleaseSpeed {
        self.release_speed
    }

    #[inline]
    pub const fn stop_target(&self) -> Option<usize> {
        self.stop_target
    }

    #[inline]
    pub const fn inhibited(&self) -> bool {
        self.inhibited
    }

    pub fn update(
        &mut self,
        dt_s: f32,
        distance_m: f32,
        input: &KvbInput<'_>,
        out: &mut CycleOutput,
    ) {
        if !(self.present && input.snapshot.speed_control_enabled) {
            self.emergency_braking = false;
            return;
        }

        self.principal_blinker.update(dt_s);
        self.init_odometer.update(distance_m);
        self.arming_odometer.update(distance_m);

        self.update_mode(input);
        self.update_arming_check(input);

        match self.mode {
            KvbMode::HighSpeedLine => {
                self.reset_targets();
                self.update_init();
                self.update_emergency(input);
                self.update_display(out);
            }

            KvbMode::ConventionalLine | KvbMode::Shunting => {
                self.update_parameters(input.snapshot);
                self.update_init();
                self.update_targets(input, out);
                self.update_speed_control(input, out);
                self.update_emergency(input);
                self.update_display(out);

                // Enforced limits fed back to the host.
                out.next_speed_limit_mps = Some(if self.stop_target == Some(0) {
                    0.0
                } else if self.restriction_target == Some(0) {
                    self.restriction_speed_mps
                } else {
                    self.next_line_speed_mps
                });
                out.current_speed_limit_mps =
                    Some(self.last_signal_speed_limit_mps.min(self.current_line_speed_mps));
            }
        }
    }

    fn update_mode(&mut self, input: &KvbInput<'_>) {
        let snap = input.snapshot;
        let high = from_kph(HIGH_SPEED_LINE_THRESHOLD_KPH);

        if snap.current_line_speed_mps > high
            && input.previous_line_speed_mps <= high
            && snap.speed_mps > 0.0
        {
            self.arming_odometer.start();
            self.spad_emergency = false;
            self.overspeed_emergency = false;
            self.speed_too_high_light = false;
            self.mode = KvbMode::HighSpeedLine;
            tracing::info!("beacon supervisor: entering high-speed line, standing down");
        } else if snap.next_line_speed_mps <= high
            && snap.next_line_speed_distance_m < SIGNAL_CAPTURE_DISTANCE_M
            && input.previous_line_speed_mps > high
            && snap.speed_mps > 0.0
        {
            self.mode = KvbMode::ConventionalLine;
            tracing::info!("beacon supervisor: back on conventional line");
        }
    }

    fn update_arming_check(&mut self, input: &KvbInput<'_>) {
        let snap = input.snapshot;
        let high = from_kph(HIGH_SPEED_LINE_THRESHOLD_KPH);

        if self.arming_odometer.triggered() {
            self.arming_odometer.stop();
            self.line_class = LineClass::HighSpeed;
        } else if snap.next_line_speed_mps <= high
            && snap.next_line_speed_distance_m < 60.0
            && input.previous_line_speed_mps > high
            && snap.speed_mps > 0.0
        {
            self.line_class = LineClass::Conventional;
        }

        if self.line_class == LineClass::HighSpeed && input.tvm_fitted {
            if !self.inhibited && !input.tvm_armed {
                if !self.arming_emergency {
                    tracing::warn!("cab signaling not armed on high-speed line");
                }
                self.arming_emergency = true;
            } else if input.rearm {
                self.arming_emergency = false;
            }
        } else {
            self.arming_emergency = false;
        }
    }

    fn update_parameters(&mut self, snap: &TrackSnapshot) {
        self.train_length_m = (snap.train_length_m / 100.0).ceil() * 100.0;
        self.braking_establishment_delay_s = if self.electro_pneumatic_brake {
            2.0
        } else if self.heavy_freight {
            12.0 + self.train_length_m / 200.0
        } else {
            2.0 + 2.0 * self.train_length_m * self.train_length_m * 1e-5
        };
    }

    fn update_init(&mut self) {
        if self.init {
            if !self.init_odometer.started() {
                self.init_odometer.start();
            }
            if self.init_odometer.triggered() {
                self.init = false;
            }
        }
    }

    fn update_targets(&mut self, input: &KvbInput<'_>, out: &mut CycleOutput) {
        let snap = input.snapshot;
        let threshold = from_kph(PRE_ANNOUNCE_THRESHOLD_KPH);

        // Line speed limits.
        self.current_line_speed_mps = snap.current_line_speed_mps;
        self.next_line_speed_mps = snap.next_line_speed_or_unlimited_mps();
        self.next_line_speed_distance_m = snap.next_line_speed_distance_m;

        // Capture signal data when about to cross.
        let next_signal_distance = snap.signal_distances_m[0];
        let normal_aspect = (next_signal_distance <= SIGNAL_CAPTURE_DISTANCE_M)
            .then_some(snap.signal_aspects[0])
            .flatten();
        if normal_aspect.is_some() {
            let limit = snap.signal_speed_limits_mps[0];
            self.last_signal_speed_limit_mps = if limit > 0.0 { limit } else { f32::INFINITY };
        }
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

        // Release the signal speed limit once the whole train has cleared
        // the node and no diverging switch lies before the next signal.
        if !self.on_sight
            && snap.track_node_offset_m > self.train_length_m
            && snap.next_diverging_switch_distance_m > next_signal_distance
            && snap.next_trailing_diverging_switch_distance_m > next_signal_distance
        {
            self.last_signal_speed_limit_mps = f32::INFINITY;
        }

        if (input.normal_signal_passed || input.distant_signal_passed)
            && snap.speed_mps > STANDSTILL_SPEED_MPS
        {
            if self.last_signal_aspect == Aspect::Stop {
                self.spad_emergency = true;
                out.trigger(SoundFlags::PENALTY_2);
                tracing::warn!("beacon supervisor: signal passed at danger");
            } else if self.last_signal_aspect == Aspect::StopAndProceed {
                self.on_sight = true;
                self.last_signal_speed_limit_mps = from_kph(ON_SIGHT_SPEED_KPH);
            } else {
                self.on_sight = false;

                // Search for the next stop target.
                let stop = (0..SEARCH_DEPTH).find(|&i| {
                    matches!(
                        snap.signal_aspects[i],
                        Some(Aspect::Stop | Aspect::StopAndProceed)
                    )
                });
                match stop {
                    Some(i) => {
                        self.stop_target = Some(i);
                        self.stop_target_distance_m = snap.signal_distances_m[i];
                    }
                    None => {
                        self.stop_target = None;
                        self.stop_target_distance_m = f32::INFINITY;
                    }
                }
                self.release_speed = KvbReleaseSpeed::V30;
            }

            // Search for the next speed-restriction target.
            let restriction = (0..SEARCH_DEPTH).find(|&i| {
                let speed = snap.signal_speed_limits_mps[i];
                speed > 0.0 && speed < self.train_speed_limit_mps
            });
            match restriction {
                Some(i) => {
                    self.restriction_target = Some(i);
                    self.restriction_distance_m = snap.signal_distances_m[i];
                    self.restriction_speed_mps = snap.signal_speed_limits_mps[i];
                }
                None => {
                    self.restriction_target = None;
                    self.restriction_distance_m = f32::INFINITY;
                    self.restriction_speed_mps = f32::INFINITY;
                }
            }
        }

        // Pre-announce of an upcoming line-speed drop.
        match self.pre_announce {
            KvbPreAnnounce::Deactivated => {
                if !self.init
                    && self.last_signal_speed_limit_mps > threshold
                    && (self.restriction_target != Some(0)
                        || self.restriction_speed_mps > threshold)
                    && self.current_line_speed_mps > threshold
                    && (self.next_line_speed_mps > threshold
                        || self.next_line_speed_distance_m > PRE_ANNOUNCE_DISTANCE_M)
                {
                    self.pre_announce = KvbPreAnnounce::Armed;
                }
            }

            KvbPreAnnounce::Armed => {
                if self.current_line_speed_mps <= threshold {
                    self.pre_announce = KvbPreAnnounce::Deactivated;
                }

                if input.normal_signal_passed
                    && self.last_signal_speed_limit_mps > threshold
                    && self.restriction_target == Some(0)
                    && self.restriction_speed_mps <= threshold
                {
                    self.pre_announce = KvbPreAnnounce::Triggered;
                    out.trigger(SoundFlags::INFO_2);
                } else if self.next_line_speed_mps <= threshold
                    && self.next_line_speed_distance_m <= PRE_ANNOUNCE_DISTANCE_M
                {
                    self.pre_announce = KvbPreAnnounce::Triggered;
                    out.trigger(SoundFlags::INFO_2);
                }
            }

            KvbPreAnnounce::Triggered => {
                if self.current_line_speed_mps <= threshold
                    || self.last_signal_speed_limit_mps <= threshold
                {
                    self.pre_announce = KvbPreAnnounce::Deactivated;
                }
            }
        }

        // Refresh target distances from this cycle's data.
        if let Some(i) = self.stop_target {
            self.stop_target_distance_m = snap.signal_distances_m[i];

            if self.stop_target_distance_m <= RELEASE_DOWNGRADE_DISTANCE_M
                && self.release_speed == KvbReleaseSpeed::V30
                && snap.signal_aspects[i] == Some(Aspect::Stop)
            {
                self.release_speed = KvbReleaseSpeed::V10;
            }
        }

        if let Some(i) = self.restriction_target {
            self.restriction_distance_m = snap.signal_distances_m[i];
        }
    }

    fn update_speed_control(&mut self, input: &KvbInput<'_>, out: &mut CycleOutput) {
        let snap = input.snapshot;
        let speed = snap.speed_mps;
        let threshold = from_kph(PRE_ANNOUNCE_THRESHOLD_KPH);

        let (stop_alert_margin, stop_emergency_margin, stop_release) = match self.release_speed {
            KvbReleaseSpeed::V30 => (from_kph(5.0), from_kph(10.0), from_kph(30.0)),
            KvbReleaseSpeed::V10 => (from_kph(2.5), from_kph(5.0), from_kph(10.0)),
        };

        let mut alert = false;
        let mut emergency = false;
        self.speed_too_high_light = false;

        // Fixed train speed ceiling.
        alert |= speed > self.train_speed_limit_mps + from_kph(5.0);
        emergency |= speed > self.train_speed_limit_mps + from_kph(10.0);

        // Stop target.
        if self.stop_target.is_some() {
            alert |= self.check_speed_curve(
                input.curve,
                speed,
                self.stop_target_distance_m,
                0.0,
                self.braking_establishment_delay_s + EMERGENCY_DELAY_S,
                stop_alert_margin,
                stop_release,
            );
            emergency |= self.check_speed_curve(
                input.curve,
                speed,
                self.stop_target_distance_m,
                0.0,
                self.braking_establishment_delay_s,
                stop_emergency_margin,
                stop_release,
            );
        }

        // Speed-restriction target.
        if self.restriction_target.is_some() {
            alert |= self.check_speed_curve(
                input.curve,
                speed,
                self.restriction_distance_m,
                self.restriction_speed_mps,
                self.braking_establishment_delay_s + EMERGENCY_DELAY_S,
                from_kph(5.0),
                self.restriction_speed_mps,
            );
            emergency |= self.check_speed_curve(
                input.curve,
                speed,
                self.restriction_distance_m,
                self.restriction_speed_mps,
                self.braking_establishment_delay_s,
                from_kph(10.0),
                self.restriction_speed_mps,
            );
        }

        // Current signal speed limit.
        alert |= speed > self.last_signal_speed_limit_mps + from_kph(5.0);
        self.speed_too_high_light |= speed > self.last_signal_speed_limit_mps + from_kph(5.0);
        emergency |= speed > self.last_signal_speed_limit_mps + from_kph(10.0);

        // Current line speed; the fixed ceiling applies unless pre-announce
        // has relaxed it.
        if self.current_line_speed_mps > threshold
            && self.pre_announce == KvbPreAnnounce::Deactivated
        {
            alert |= speed > threshold + from_kph(5.0);
            self.speed_too_high_light |= speed > threshold + from_kph(5.0);
            emergency |= speed > threshold + from_kph(10.0);
        } else {
            alert |= speed > self.current_line_speed_mps + from_kph(5.0);
            self.speed_too_high_light |= speed > self.current_line_speed_mps + from_kph(5.0);
            emergency |= speed > self.current_line_speed_mps + from_kph(10.0);
        }

        // Next line speed.
        if self.next_line_speed_mps < self.current_line_speed_mps {
            alert |= self.check_speed_curve(
                input.curve,
                speed,
                self.next_line_speed_distance_m,
                self.next_line_speed_mps,
                self.braking_establishment_delay_s + EMERGENCY_DELAY_S,
                from_kph(5.0),
                self.next_line_speed_mps,
            );
            emergency |= self.check_speed_curve(
                input.curve,
                speed,
                self.next_line_speed_distance_m,
                self.next_line_speed_mps,
                self.braking_establishment_delay_s,
                from_kph(10.0),
                self.next_line_speed_mps,
            );
        }

        match self.state {
            KvbState::Normal => {
                if alert {
                    out.trigger(SoundFlags::PENALTY_1);
                    self.state = KvbState::Alert;
                    tracing::warn!("beacon supervisor: overspeed");
                }
            }

            KvbState::Alert => {
                if !alert {
                    self.state = KvbState::Normal;
                } else if emergency {
                    out.trigger(SoundFlags::PENALTY_2);
                    self.state = KvbState::Emergency;
                    tracing::warn!("beacon supervisor: overspeed emergency");
                }
            }

            KvbState::Emergency => {
                if speed < STANDSTILL_SPEED_MPS {
                    self.state = KvbState::Normal;
                }
            }
        }

        self.overspeed_emergency = self.state == KvbState::Emergency;
    }

    fn check_speed_curve(
        &self,
        curve: &dyn BrakingCurve,
        speed_mps: f32,
        target_distance_m: f32,
        target_speed_mps: f32,
        delay_s: f32,
        margin_mps: f32,
        release_speed_mps: f32,
    ) -> bool {
        let ceiling = curve
            .max_speed(
                target_distance_m,
                target_speed_mps,
                self.declivity,
                delay_s,
                self.safe_deceleration_mps2,
            )
            .max(release_speed_mps + margin_mps);
        speed_mps > ceiling
    }

    fn update_emergency(&mut self, input: &KvbInput<'_>) {
        let speed = input.snapshot.speed_mps;

        if self.spad_emergency && speed < STANDSTILL_SPEED_MPS {
            self.spad_emergency = false;
        }
        if self.overspeed_emergency && speed < STANDSTILL_SPEED_MPS {
            self.overspeed_emergency = false;
        }

        if !self.emergency_braking {
            if self.spad_emergency || self.overspeed_emergency {
                self.emergency_braking = true;
            }
        } else if !self.spad_emergency && !self.overspeed_emergency && input.rearm {
            self.emergency_braking = false;

            // On sight until the end of the block section.
            self.on_sight = true;
            self.last_signal_speed_limit_mps = from_kph(ON_SIGHT_SPEED_KPH);
            self.release_speed = KvbReleaseSpeed::V30;
        }
    }

    fn update_display(&mut self, out: &mut CycleOutput) {
        out.overspeed_warning_display = self.state >= KvbState::Alert;

        // Legacy cab repeater.
        if self.mode != KvbMode::HighSpeedLine {
            out.next_signal_aspect = Some(if self.pre_announce == KvbPreAnnounce::Armed {
                Aspect::Clear2
            } else if self.release_speed == KvbReleaseSpeed::V10 {
                Aspect::Stop
            } else {
                Aspect::Clear1
            });
        }

        if self.mode == KvbMode::HighSpeedLine {
            out.set_display(CabControl::KvbPrincipal1, 0);
            out.set_display(CabControl::KvbPrincipal2, 0);
            out.set_display(CabControl::KvbAuxiliary, 0);
        } else {
            if self.emergency_brake_light {
                self.principal_display = PrincipalDisplay::Fu;
                self.principal_blinking = false;
                self.auxiliary_display = AuxiliaryDisplay::Empty;
            } else if self.init {
                self.principal_display = PrincipalDisplay::Empty;
                self.principal_blinking = false;
                self.auxiliary_display = AuxiliaryDisplay::Empty;
            } else if self.pre_announce == KvbPreAnnounce::Armed {
                self.principal_display = PrincipalDisplay::B;
                self.principal_blinking = false;
                self.auxiliary_display = AuxiliaryDisplay::Empty;
            } else if self.pre_announce == KvbPreAnnounce::Triggered {
                self.principal_display = PrincipalDisplay::Empty;
                self.principal_blinking = false;
                self.auxiliary_display = AuxiliaryDisplay::P;
            } else if self.on_sight {
                self.principal_display = PrincipalDisplay::V00;
                self.principal_blinking = self.state == KvbState::Alert;
                self.auxiliary_display = AuxiliaryDisplay::V00;
            } else if self.stop_target == Some(0) {
                if self.release_speed == KvbReleaseSpeed::V10 {
                    self.principal_display = PrincipalDisplay::Empty;
                    self.principal_blinking = false;
                    self.auxiliary_display = AuxiliaryDisplay::V000;
                } else {
                    if self.state == KvbState::Alert {
                        self.principal_display = PrincipalDisplay::V00;
                        self.principal_blinking = true;
                    } else {
                        self.principal_display = PrincipalDisplay::Empty;
                        self.principal_blinking = false;
                    }
                    self.auxiliary_display = AuxiliaryDisplay::V00;
                }
            } else {
                self.principal_display = PrincipalDisplay::Dashes3;
                self.principal_blinking = false;
                self.auxiliary_display = AuxiliaryDisplay::Dashes3;
            }

            if self.principal_blinking {
                if !self.principal_blinker.started() {
                    self.principal_blinker.start();
                }
            } else if self.principal_blinker.started() {
                self.principal_blinker.stop();
            }

            let gate = |value: u8, blinking: bool, blinker: &Blinker| -> u8 {
                if blinking && !blinker.on() { 0 } else { value }
            };

            let (p1, p2) = match self.principal_display {
                PrincipalDisplay::Empty => (0, 0),
                PrincipalDisplay::Fu => (0, 1),
                PrincipalDisplay::V000 => (
                    gate(1, self.principal_blinking, &self.principal_blinker),
                    0,
                ),
                PrincipalDisplay::V00 => (
                    gate(2, self.principal_blinking, &self.principal_blinker),
                    0,
                ),
                PrincipalDisplay::L => (
                    0,
                    gate(4, self.principal_blinking, &self.principal_blinker),
                ),
                PrincipalDisplay::B => (
                    gate(4, self.principal_blinking, &self.principal_blinker),
                    0,
                ),
                PrincipalDisplay::P => (
                    gate(5, self.principal_blinking, &self.principal_blinker),
                    0,
                ),
                PrincipalDisplay::Dashes3 => (
                    gate(6, self.principal_blinking, &self.principal_blinker),
                    0,
                ),
                PrincipalDisplay::Dashes9 => (7, 0),
                PrincipalDisplay::Test => (0, 7),
            };
            out.set_display(CabControl::KvbPrincipal1, p1);
            out.set_display(CabControl::KvbPrincipal2, p2);

            let aux = match self.auxiliary_display {
                AuxiliaryDisplay::Empty => 0,
                AuxiliaryDisplay::V000 => 1,
                AuxiliaryDisplay::V00 => 2,
                AuxiliaryDisplay::L => 4,
                AuxiliaryDisplay::P => 5,
                AuxiliaryDisplay::Dashes3 => 6,
                AuxiliaryDisplay::Test => 7,
            };
            out.set_display(CabControl::KvbAuxiliary, aux);
        }

        out.set_display(CabControl::KvbEmergencyLamp, self.emergency_braking as u8);
        out.set_display(CabControl::SpeedTooHighLamp, self.speed_too_high_light as u8);

        self.emergency_brake_light = self.spad_emergency || self.overspeed_emergency;
        out.set_display(CabControl::KvbBrakeLamp, self.emergency_brake_light as u8);
    }

    fn reset_targets(&mut self) {
        self.pre_announce = KvbPreAnnounce::Deactivated;

        self.last_signal_aspect = Aspect::Clear1;
        self.last_signal_speed_limit_mps = f32::INFINITY;

        self.stop_target = None;
        self.stop_target_distance_m = f32::INFINITY;
        self.release_speed = KvbReleaseSpeed::V30;
        self.on_sight = false;

        self.restriction_target = None;
        self.restriction_distance_m = f32::INFINITY;
        self.restriction_speed_mps = f32::INFINITY;

        self.current_line_speed_mps = f32::INFINITY;
        self.next_line_speed_mps = f32::INFINITY;
        self.next_line_speed_distance_m = f32::INFINITY;

        self.state = KvbState::Normal;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
