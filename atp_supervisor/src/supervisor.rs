//! Supervision orchestrator.
//!
//! Owns one instance of each protection layer and runs them in fixed order
//! every cycle: vigilance → reflex → beacon supervisor → cab-signaling
//! decoder. A flag raised by an earlier layer is visible to later layers
//! the same cycle, never the reverse. The layers' emergency flags are
//! OR-combined with the external emergency input; the rearm input can only
//! clear the combined flag, and each layer re-checks its own hazard before
//! honoring a clear.

use atp_common::config::{ConfigError, TrainConfig};
use atp_common::decode::DecodeTable;
use atp_common::traits::{BrakingCurve, TrackEnvironment};
use atp_common::units::from_kph;
use thiserror::Error;

use crate::consts::{HIGH_SPEED_LINE_THRESHOLD_KPH, WARMUP_CYCLES};
use crate::kvb::{Kvb, KvbInput};
use crate::outputs::CycleOutput;
use crate::rso::{Rso, RsoInhibition, RsoInput};
use crate::snapshot::TrackSnapshot;
use crate::tvm::{Tvm, TvmFitting, TvmInput};
use crate::vacma::{Vacma, VacmaInput};

/// Generic cab button numbers and their layer actions. The numbers double
/// as the buttons' display slots.
pub mod buttons {
    use crate::outputs::CabControl;

    /// Acknowledge (reflex).
    pub const ACKNOWLEDGE: u8 = CabControl::AcknowledgeButton as u8;
    /// Cancel the acknowledgment lamp.
    pub const CANCEL: u8 = CabControl::CancelButton as u8;
    /// Vigilance test switch.
    pub const ALERTER_TEST: u8 = CabControl::AlerterTestSwitch as u8;
    /// Manual cab-signaling arming, track 1.
    pub const ARM_TRACK_1: u8 = CabControl::ArmTrack1Button as u8;
    /// Manual cab-signaling arming, track 2.
    pub const ARM_TRACK_2: u8 = CabControl::ArmTrack2Button as u8;
    /// Manual cab-signaling disarming.
    pub const DISARM: u8 = CabControl::DisarmButton as u8;
}

/// Driver and cab input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcsEvent {
    AlerterPressed,
    AlerterReleased,
    /// Throttle moved (counts as vigilance).
    ThrottleChanged,
    /// Dynamic brake moved (counts as vigilance).
    DynamicBrakeChanged,
    /// Horn activated (counts as vigilance).
    HornActivated,
    /// Generic numbered cab button.
    ButtonPressed(u8),
    ButtonReleased(u8),
    /// Generic numbered cab switch.
    SwitchOn(u8),
    SwitchOff(u8),
    /// Emergency rearm input.
    RearmPressed,
    RearmReleased,
}

/// Supervisor construction error.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cab signaling fitted but no decode table supplied")]
    MissingDecodeTable,
}

/// The train protection supervisor.
pub struct Supervisor {
    curve: Box<dyn BrakingCurve>,

    vacma: Vacma,
    rso: Rso,
    kvb: Kvb,
    tvm: Tvm,

    rearming_button: bool,
    external_emergency: bool,
    emergency_braking: bool,

    init_count: u32,
    previous_normal_signal_distance_m: f32,
    previous_distant_signal_distance_m: f32,
    normal_signal_passed: bool,
    distant_signal_passed: bool,
    previous_line_speed_mps: f32,

    button_lamp_on: u64,
    button_lamp_known: u64,
}

impl Supervisor {
    /// Build a supervisor from a validated configuration, the decode table
    /// matching the fitted cab-signaling generation (if any) and the host's
    /// braking-curve evaluator.
    pub fn new(
        config: &TrainConfig,
        decode_table: Option<DecodeTable>,
        curve: Box<dyn BrakingCurve>,
    ) -> Result<Self, InitError> {
        config.validate()?;

        let fitting = match (config.tvm_model(), decode_table) {
            (Some(model), Some(table)) => Some(TvmFitting { model, table }),
            (Some(_), None) => return Err(InitError::MissingDecodeTable),
            (None, _) => None,
        };

        Ok(Self {
            curve,
            vacma: Vacma::new(config),
            rso: Rso::new(
                config.general.rso_present,
                config.rso.delay_before_emergency_braking_s,
                config.rso.blinker_frequency_hz,
            ),
            kvb: Kvb::new(
                config.general.kvb_present,
                config.kvb.inhibited,
                from_kph(config.kvb.train_speed_limit_kph),
                config.general.electro_pneumatic_brake,
                config.general.heavy_freight_train,
                config.general.safe_deceleration_mps2,
            ),
            tvm: Tvm::new(fitting, config.tvm.covit_inhibited),
            rearming_button: false,
            external_emergency: false,
            emergency_braking: false,
            init_count: 0,
            previous_normal_signal_distance_m: 0.0,
            previous_distant_signal_distance_m: 0.0,
            normal_signal_passed: false,
            distant_signal_passed: false,
            previous_line_speed_mps: 0.0,
            button_lamp_on: 0,
            button_lamp_known: 0,
        })
    }

    /// Mission starts with the train already moving: clear the power-up
    /// latches and arm the decoder if starting on a high-speed line.
    pub fn initialize_moving(&mut self, env: &dyn TrackEnvironment) {
        self.rso.init_moving();
        self.kvb.init_moving();
        self.vacma.init_moving();

        if env.current_line_speed_limit_mps() > from_kph(HIGH_SPEED_LINE_THRESHOLD_KPH) {
            self.kvb.force_high_speed_line();
            self.tvm.set_armed(true);
        }
    }

    /// Host-side emergency sources (brake pipe, coupled units).
    pub fn set_external_emergency(&mut self, emergency: bool) {
        self.external_emergency = emergency;
    }

    #[inline]
    pub const fn emergency_braking(&self) -> bool {
        self.emergency_braking
    }

    #[inline]
    pub const fn vacma(&self) -> &Vacma {
        &self.vacma
    }

    #[inline]
    pub const fn rso(&self) -> &Rso {
        &self.rso
    }

    #[inline]
    pub const fn kvb(&self) -> &Kvb {
        &self.kvb
    }

    #[inline]
    pub const fn tvm(&self) -> &Tvm {
        &self.tvm
    }

    /// Route a driver/cab input event to its layer.
    pub fn handle_event(&mut self, event: TcsEvent) {
        match event {
            TcsEvent::AlerterPressed => self.vacma.set_pressed(true),
            TcsEvent::AlerterReleased => self.vacma.set_pressed(false),

            TcsEvent::ThrottleChanged
            | TcsEvent::DynamicBrakeChanged
            | TcsEvent::HornActivated => self.vacma.notify_activity(),

            TcsEvent::ButtonPressed(button) => {
                self.set_button_lamp(button, true);
                match button {
                    buttons::ACKNOWLEDGE => self.rso.set_pressed(true),
                    buttons::CANCEL => self.rso.set_cancel_pressed(true),
                    _ => {}
                }
            }

            TcsEvent::ButtonReleased(button) => {
                self.set_button_lamp(button, false);
                match button {
                    buttons::ACKNOWLEDGE => self.rso.set_pressed(false),
                    buttons::CANCEL => self.rso.set_cancel_pressed(false),
                    buttons::ARM_TRACK_1 | buttons::ARM_TRACK_2 => self.tvm.set_armed(true),
                    buttons::DISARM => self.tvm.set_armed(false),
                    _ => {}
                }
            }

            TcsEvent::SwitchOn(switch) => {
                self.set_button_lamp(switch, true);
                if switch == buttons::ALERTER_TEST {
                    self.vacma.set_test(true);
                }
            }

            TcsEvent::SwitchOff(switch) => {
                self.set_button_lamp(switch, false);
                if switch == buttons::ALERTER_TEST {
                    self.vacma.set_test(false);
                }
            }

            TcsEvent::RearmPressed => self.rearming_button = true,
            TcsEvent::RearmReleased => self.rearming_button = false,
        }
    }

    /// One control cycle.
    pub fn update(&mut self, dt_s: f32, env: &dyn TrackEnvironment) -> CycleOutput {
        let mut out = CycleOutput::default();
        out.emergency_braking = self.emergency_braking;
        out.penalty_display = self.emergency_braking;
        out.power_authorization = !self.emergency_braking;

        if !env.is_train_control_enabled() {
            return out;
        }

        // Warm-up: let the environment provider settle before supervising.
        if self.init_count < WARMUP_CYCLES {
            self.init_count += 1;
            if self.init_count == WARMUP_CYCLES
                && env.current_line_speed_limit_mps() > from_kph(HIGH_SPEED_LINE_THRESHOLD_KPH)
            {
                self.kvb.force_high_speed_line();
                self.kvb.force_high_speed_class();
            }
            return out;
        }

        let snapshot = TrackSnapshot::capture(env);
        let distance_m = snapshot.speed_mps * dt_s;

        self.update_signal_passed(&snapshot);

        // Reflex inhibitions, evaluated once per cycle.
        let mut inhibition = RsoInhibition::empty();
        if snapshot.direction_reverse {
            inhibition |= RsoInhibition::REVERSE;
        }
        if !self.kvb.inhibited() && self.tvm.fitted() && self.tvm.armed() {
            inhibition |= RsoInhibition::CAB_SIGNALING_COVERED;
        }
        if !self.tvm.fitted() || !self.tvm.covit_inhibited() {
            inhibition |= RsoInhibition::COVIT_COVERED;
        }

        self.vacma.update(
            dt_s,
            &VacmaInput {
                speed_mps: snapshot.speed_mps,
                alerter_enabled: snapshot.alerter_enabled,
                rearm: self.rearming_button,
                emergency_braking: self.emergency_braking,
            },
            &mut out,
        );

        self.rso.update(
            dt_s,
            &RsoInput {
                snapshot: &snapshot,
                normal_signal_passed: self.normal_signal_passed,
                distant_signal_passed: self.distant_signal_passed,
                inhibition,
                tvm_armed: self.tvm.armed(),
                tvm_closed_signal: self.tvm.closed_signal(),
                tvm_opened_signal: self.tvm.opened_signal(),
                rearm: self.rearming_button,
            },
            &mut out,
        );

        self.kvb.update(
            dt_s,
            distance_m,
            &KvbInput {
                snapshot: &snapshot,
                normal_signal_passed: self.normal_signal_passed,
                distant_signal_passed: self.distant_signal_passed,
                rearm: self.rearming_button,
                tvm_fitted: self.tvm.fitted(),
                tvm_armed: self.tvm.armed(),
                previous_line_speed_mps: self.previous_line_speed_mps,
                curve: &*self.curve,
            },
            &mut out,
        );

        self.tvm.update(
            dt_s,
            &TvmInput {
                snapshot: &snapshot,
                normal_signal_passed: self.normal_signal_passed,
                previous_line_speed_mps: self.previous_line_speed_mps,
                arming_emergency: self.kvb.arming_emergency(),
                curve: &*self.curve,
            },
            &mut out,
        );

        if self.rso.emergency_braking()
            || self.kvb.emergency_braking()
            || self.kvb.arming_emergency()
            || self.tvm.emergency_braking()
            || self.vacma.emergency_braking()
            || self.external_emergency
        {
            if !self.emergency_braking {
                tracing::warn!("emergency braking demanded");
            }
            self.emergency_braking = true;
        } else if self.rearming_button {
            self.emergency_braking = false;
        }

        out.emergency_braking = self.emergency_braking;
        out.penalty_display = self.emergency_braking;
        out.power_authorization = !self.emergency_braking;

        self.flush_button_lamps(&mut out);

        self.previous_line_speed_mps = snapshot.current_line_speed_mps;

        out
    }

    /// A passed signal is detected when the reported distance increases or
    /// resets; layers additionally gate on the train moving.
    fn update_signal_passed(&mut self, snapshot: &TrackSnapshot) {
        let normal = snapshot.signal_distances_m[0];
        self.normal_signal_passed = normal > self.previous_normal_signal_distance_m;
        self.previous_normal_signal_distance_m = normal;

        let distant = snapshot.distant_signal_distance_m;
        self.distant_signal_passed = distant > self.previous_distant_signal_distance_m;
        self.previous_distant_signal_distance_m = distant;
    }

    fn set_button_lamp(&mut self, button: u8, on: bool) {
        if button >= 64 {
            return;
        }
        self.button_lamp_known |= 1 << button;
        if on {
            self.button_lamp_on |= 1 << button;
        } else {
            self.button_lamp_on &= !(1 << button);
        }
    }

    fn flush_button_lamps(&mut self, out: &mut CycleOutput) {
        for slot in 0..64u8 {
            if self.button_lamp_known & (1 << slot) != 0 {
                out.set_display_raw(slot, ((self.button_lamp_on >> slot) & 1) as u8);
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
