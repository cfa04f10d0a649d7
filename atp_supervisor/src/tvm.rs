//! Continuous cab-signaling decoder layer.
//!
//! While armed, reads the next ten block sections, reduces them into the
//! `Vcond`/`Vc`/`Ve`/`Va` code sequences, decodes the nearest section's
//! triple through the model's decode table and continuously enforces the
//! decoded control speed (COVIT). Arming follows the high-speed-line
//! boundary automatically and can be forced by the driver.
//!
//! The reduction runs in a fixed order: backward `Vcond` with a
//! first-match-wins rule list, a top-speed correction pass, then a single
//! forward `Vc`/`Ve`/`Va` pass seeded at the farthest section. The
//! intermediate triple is the decode key, so the passes are not merged.

use atp_common::codes::{CabAspect, SpeedCode, TvmModel};
use atp_common::decode::DecodeTable;
use atp_common::signal::Aspect;
use atp_common::timing::{Blinker, Timer};
use atp_common::traits::BrakingCurve;
use atp_common::units::{from_kph, to_kph_rounded};
use static_assertions::const_assert;

use crate::consts::{HIGH_SPEED_LINE_THRESHOLD_KPH, SIGNAL_CAPTURE_DISTANCE_M};
use crate::outputs::{CabControl, CycleOutput, SoundFlags};
use crate::snapshot::{TrackSnapshot, SIGNAL_LOOK_AHEAD};

/// Look-ahead depth of the block-section sequences.
pub const TVM_BLOCK_SECTIONS: usize = 10;

// Skipped no-op sections must never starve the build.
const_assert!(SIGNAL_LOOK_AHEAD >= 2 * TVM_BLOCK_SECTIONS);

/// Settle time before a newly decoded aspect is applied (newer generation) [s].
const ASPECT_CHANGE_SETTLE_S: f32 = 4.7;
/// Cab display blink frequency [Hz].
const CAB_BLINK_HZ: f32 = 1.0;

/// Model and decode table of a fitted decoder.
pub struct TvmFitting {
    pub model: TvmModel,
    pub table: DecodeTable,
}

/// Per-cycle inputs of the decoder layer.
pub struct TvmInput<'a> {
    pub snapshot: &'a TrackSnapshot,
    pub normal_signal_passed: bool,
    /// Line speed limit of the previous cycle [m/s].
    pub previous_line_speed_mps: f32,
    /// Arming-check emergency from the beacon supervisor (same cycle,
    /// shares the enforcement lamp).
    pub arming_emergency: bool,
    pub curve: &'a dyn BrakingCurve,
}

/// Continuous cab-signaling decoder.
pub struct Tvm {
    model: Option<TvmModel>,
    table: Option<DecodeTable>,
    covit_inhibited: bool,

    armed: bool,
    covit_emergency: bool,
    open_circuit_breaker: bool,
    open_circuit_breaker_automatic: bool,
    lower_pantograph: bool,

    speed_sequence: [u32; TVM_BLOCK_SECTIONS],
    aspect_sequence: [Option<Aspect>; TVM_BLOCK_SECTIONS],
    previous_section_speed: u32,
    previous_section_aspect: Option<Aspect>,
    previous_vcond: SpeedCode,

    vcond: [SpeedCode; TVM_BLOCK_SECTIONS],
    vc: [SpeedCode; TVM_BLOCK_SECTIONS],
    ve: [SpeedCode; TVM_BLOCK_SECTIONS],
    va: [SpeedCode; TVM_BLOCK_SECTIONS],

    aspect_command: Option<CabAspect>,
    aspect_current: Option<CabAspect>,
    aspect_previous_cycle: Option<CabAspect>,
    blinking_command: bool,
    blinking_current: bool,
    blinking_previous_cycle: bool,
    blinker: Blinker,

    start_control_speed_mps: f32,
    end_control_speed_mps: f32,
    deceleration_mps2: f32,

    closed_signal: bool,
    previous_closed_signal: bool,
    opened_signal: bool,
    previous_opened_signal: bool,

    aspect_change_timer: Timer,
}

impl Tvm {
    pub fn new(fitting: Option<TvmFitting>, covit_inhibited: bool) -> Self {
        let (model, table) = match fitting {
            Some(f) => (Some(f.model), Some(f.table)),
            None => (None, None),
        };
        Self {
            model,
            table,
            covit_inhibited,
            armed: false,
            covit_emergency: false,
            open_circuit_breaker: false,
            open_circuit_breaker_automatic: false,
            lower_pantograph: false,
            speed_sequence: [0; TVM_BLOCK_SECTIONS],
            aspect_sequence: [None; TVM_BLOCK_SECTIONS],
            previous_section_speed: 0,
            previous_section_aspect: None,
            previous_vcond: SpeedCode::Any,
            vcond: [SpeedCode::Any; TVM_BLOCK_SECTIONS],
            vc: [SpeedCode::Any; TVM_BLOCK_SECTIONS],
            ve: [SpeedCode::Any; TVM_BLOCK_SECTIONS],
            va: [SpeedCode::Any; TVM_BLOCK_SECTIONS],
            aspect_command: None,
            aspect_current: None,
            aspect_previous_cycle: None,
            blinking_command: false,
            blinking_current: false,
            blinking_previous_cycle: false,
            blinker: Blinker::new(CAB_BLINK_HZ),
            start_control_speed_mps: 0.0,
            end_control_speed_mps: 0.0,
            deceleration_mps2: 0.0,
            closed_signal: false,
            previous_closed_signal: false,
            opened_signal: false,
            previous_opened_signal: false,
            aspect_change_timer: Timer::new(ASPECT_CHANGE_SETTLE_S),
        }
    }

    #[inline]
    pub const fn fitted(&self) -> bool {
        self.model.is_some()
    }

    #[inline]
    pub const fn armed(&self) -> bool {
        self.armed
    }

    #[inline]
    pub const fn emergency_braking(&self) -> bool {
        self.covit_emergency
    }

    #[inline]
    pub const fn covit_inhibited(&self) -> bool {
        self.covit_inhibited
    }

    /// Cab-signaling closed/opened one-shot edges, consumed by the reflex.
    #[inline]
    pub const fn closed_signal(&self) -> bool {
        self.closed_signal
    }

    #[inline]
    pub const fn opened_signal(&self) -> bool {
        self.opened_signal
    }

    #[inline]
    pub const fn aspect_command(&self) -> Option<CabAspect> {
        self.aspect_command
    }

    #[inline]
    pub const fn aspect_current(&self) -> Option<CabAspect> {
        self.aspect_current
    }

    #[inline]
    pub const fn vcond(&self) -> &[SpeedCode; TVM_BLOCK_SECTIONS] {
        &self.vcond
    }

    #[inline]
    pub const fn vc(&self) -> &[SpeedCode; TVM_BLOCK_SECTIONS] {
        &self.vc
    }

    #[inline]
    pub const fn ve(&self) -> &[SpeedCode; TVM_BLOCK_SECTIONS] {
        &self.ve
    }

    #[inline]
    pub const fn va(&self) -> &[SpeedCode; TVM_BLOCK_SECTIONS] {
        &self.va
    }

    /// Manual arm/disarm from the cab buttons.
    pub fn set_armed(&mut self, armed: bool) {
        if self.fitted() {
            self.armed = armed;
        }
    }

    /// Power-supply orders relayed to the indicator lamps.
    pub fn set_power_orders(
        &mut self,
        open_circuit_breaker: bool,
        open_circuit_breaker_automatic: bool,
        lower_pantograph: bool,
    ) {
        self.open_circuit_breaker = open_circuit_breaker;
        self.open_circuit_breaker_automatic = open_circuit_breaker_automatic;
        self.lower_pantograph = lower_pantograph;
    }

    pub fn update(&mut self, dt_s: f32, input: &TvmInput<'_>, out: &mut CycleOutput) {
        let Some(model) = self.model else {
            return;
        };
        if !input.snapshot.speed_control_enabled {
            return;
        }

        self.blinker.update(dt_s);
        self.aspect_change_timer.update(dt_s);

        let snap = input.snapshot;
        let high = from_kph(HIGH_SPEED_LINE_THRESHOLD_KPH);

        // Automatic arming at the high-speed-line entry post.
        if snap.next_line_speed_mps > high
            && snap.next_line_speed_distance_m < SIGNAL_CAPTURE_DISTANCE_M
            && input.previous_line_speed_mps <= high
            && snap.speed_mps > 0.0
            && !self.armed
        {
            self.armed = true;
            self.previous_section_aspect = snap.signal_aspects[0];
            self.previous_section_speed = to_kph_rounded(snap.signal_speed_limits_mps[0]);
            tracing::info!("cab signaling armed");
        }

        // Automatic disarming when leaving the high-speed line.
        if snap.current_line_speed_mps <= high
            && input.previous_line_speed_mps > high
            && snap.speed_mps > 0.0
            && self.armed
        {
            self.armed = false;
            self.covit_emergency = false;
            self.aspect_change_timer.stop();
            tracing::info!("cab signaling disarmed");
        }

        if self.armed {
            self.calculate_sequence(model, input);
            self.determine_aspect(model);
            self.update_covit(model, input, out);
            self.update_display(model, input, out);
            self.update_sounds(out);

            self.aspect_previous_cycle = self.aspect_current;
            self.blinking_previous_cycle = self.blinking_current;
        } else {
            self.covit_emergency = false;

            self.aspect_command = None;
            self.aspect_current = None;
            self.aspect_previous_cycle = None;
            self.blinking_command = false;
            self.blinking_current = false;
            self.blinking_previous_cycle = false;

            self.start_control_speed_mps = 0.0;
            self.end_control_speed_mps = 0.0;
            self.deceleration_mps2 = 0.0;

            self.closed_signal = false;
            self.opened_signal = false;
            self.previous_closed_signal = false;
            self.previous_opened_signal = false;

            self.update_display(model, input, out);
        }
    }

    /// Build the block-section sequence and reduce it.
    fn calculate_sequence(&mut self, model: TvmModel, input: &TvmInput<'_>) {
        let snap = input.snapshot;

        // A passed signal shifts the window: the old nearest section becomes
        // the section behind the train and seeds the reduction.
        if input.normal_signal_passed {
            self.previous_section_speed = self.speed_sequence[0];
            self.previous_section_aspect = self.aspect_sequence[0];
            self.previous_vcond = self.vcond[0];
        }

        // Sections reporting "no speed, permissive aspect" are repeater-only
        // and do not consume a slot; beyond track knowledge the last known
        // section repeats.
        let mut sections: heapless::Vec<(u32, Option<Aspect>), SIGNAL_LOOK_AHEAD> =
            heapless::Vec::new();
        for i in 0..SIGNAL_LOOK_AHEAD {
            if sections.is_full() {
                break;
            }
            let speed = to_kph_rounded(snap.signal_speed_limits_mps[i]);
            let aspect = snap.signal_aspects[i];
            if aspect.is_none() && speed == 0 {
                break; // end of track knowledge
            }
            if speed == 0 && aspect.is_some_and(|a| a > Aspect::Stop) {
                continue;
            }
            let _ = sections.push((speed, aspect));
        }

        for i in 0..TVM_BLOCK_SECTIONS {
            let (speed, aspect) = sections
                .get(i)
                .or_else(|| sections.last())
                .copied()
                .unwrap_or((self.previous_section_speed, self.previous_section_aspect));
            self.speed_sequence[i] = speed;
            self.aspect_sequence[i] = aspect;
        }

        let tvm430 = model.is_tvm430();

        // Backward pass: per-section target code, most restrictive rule first.
        for i in (0..TVM_BLOCK_SECTIONS).rev() {
            let (cur_aspect, cur_speed) = if i == 0 {
                (self.previous_section_aspect, self.previous_section_speed)
            } else {
                (self.aspect_sequence[i - 1], self.speed_sequence[i - 1])
            };
            let next_aspect = self.aspect_sequence[i];
            let next_speed = self.speed_sequence[i];

            self.vcond[i] = if cur_aspect == Some(Aspect::Stop)
                || (cur_aspect == Some(Aspect::StopAndProceed) && tvm430)
            {
                SpeedCode::Rrr
            } else if next_speed == 30 && cur_speed == 30 {
                SpeedCode::Rrr
            } else if next_speed == 60 && cur_speed == 60 && tvm430 {
                SpeedCode::S60E
            } else if next_aspect == Some(Aspect::Stop) && (tvm430 || cur_speed == 80) {
                SpeedCode::S80E
            } else if next_speed == 80 && cur_speed == 80 {
                SpeedCode::S80E
            } else if next_speed == 130 && cur_speed == 130 && tvm430 {
                SpeedCode::S130E
            } else if next_speed == 130 && cur_speed == 170 {
                // 130 km/h high-speed-line exit
                SpeedCode::S130E
            } else if next_speed == 160 && cur_speed == 160 {
                SpeedCode::S160E
            } else if next_speed == 160 && cur_speed == 170 {
                // 160 km/h high-speed-line exit
                SpeedCode::S160E
            } else if !tvm430 && next_aspect == Some(Aspect::StopAndProceed) {
                SpeedCode::S160E
            } else if next_speed == 170 && cur_speed == 170 && tvm430 {
                SpeedCode::S170E
            } else if next_speed == 200 && cur_speed == 200 && tvm430 {
                SpeedCode::S200V
            } else if next_speed == 220 && cur_speed == 220 {
                SpeedCode::S220E
            } else if next_speed == 220 && cur_speed == 230 {
                // 220 km/h high-speed-line exit
                SpeedCode::S220E
            } else if !tvm430 && next_aspect == Some(Aspect::Approach1) {
                SpeedCode::S220E
            } else if next_speed == 230 && cur_speed == 230 && tvm430 {
                SpeedCode::S230E
            } else if next_speed == 270 && cur_speed == 270 {
                SpeedCode::S270V
            } else if (next_speed == 300 && cur_speed == 300) || !tvm430 {
                SpeedCode::S300V
            } else {
                SpeedCode::S320V
            };
        }

        // Correction pass: a top-speed code sandwiched behind a restrictive
        // predecessor inherits the follower's tier.
        for i in 0..TVM_BLOCK_SECTIONS - 1 {
            let prev = if i == 0 {
                self.previous_vcond
            } else {
                self.vcond[i - 1]
            };
            let cur = self.vcond[i];
            let next = self.vcond[i + 1];

            let top_speed = (cur == SpeedCode::S300V && !tvm430) || cur == SpeedCode::S320V;
            if top_speed && matches!(prev, SpeedCode::S230E | SpeedCode::S270V) {
                if next == SpeedCode::S270V {
                    self.vcond[i] = SpeedCode::S270V;
                } else if next == SpeedCode::S300V {
                    self.vcond[i] = SpeedCode::S300V;
                }
            }
        }

        // Forward pass, farthest section first.
        let last = TVM_BLOCK_SECTIONS - 1;
        self.vc[last] = self.vcond[last];
        self.ve[last] = model.tab2(self.vcond[last]).min(model.tab1(self.vc[last]));
        self.va[last] = model.tab2(self.vcond[last]);

        for i in (1..=last).rev() {
            self.vc[i - 1] = self.vcond[i - 1].min(self.ve[i]);
            self.ve[i - 1] = model
                .tab2(self.vcond[i - 1])
                .min(model.tab1(self.vc[i - 1]));
            self.va[i - 1] = model.tab2(self.vc[i]);
        }
    }

    /// Decode the nearest section's triple into the commanded aspect.
    fn determine_aspect(&mut self, model: TvmModel) {
        let Some(table) = &self.table else {
            return;
        };
        let command = table.lookup(self.ve[0], self.vc[0], self.va[0]);

        if model.is_tvm430() {
            // A new command is taken over only while no settle is pending.
            if (self.aspect_command != Some(command.aspect)
                || self.blinking_command != command.blinking)
                && !self.aspect_change_timer.started()
            {
                self.aspect_command = Some(command.aspect);
                self.blinking_command = command.blinking;
                self.start_control_speed_mps = command.start_control_speed_mps;
                self.end_control_speed_mps = command.end_control_speed_mps;
                self.deceleration_mps2 = command.deceleration_mps2;
            }
        } else {
            self.aspect_command = Some(command.aspect);
            self.blinking_command = command.blinking;
            self.start_control_speed_mps = command.start_control_speed_mps;
            self.end_control_speed_mps = command.end_control_speed_mps;
            self.deceleration_mps2 = 0.0;
        }
    }

    /// Continuous overspeed enforcement against the decoded control speed.
    fn update_covit(&mut self, model: TvmModel, input: &TvmInput<'_>, out: &mut CycleOutput) {
        if self.covit_inhibited {
            self.covit_emergency = false;
            return;
        }

        let snap = input.snapshot;
        out.current_speed_limit_mps = Some(self.start_control_speed_mps);
        out.next_speed_limit_mps = Some(self.end_control_speed_mps);

        let ceiling = if model.is_tvm430() {
            input
                .curve
                .max_speed(
                    snap.signal_distances_m[0],
                    self.end_control_speed_mps,
                    0.0,
                    0.0,
                    self.deceleration_mps2,
                )
                .min(self.start_control_speed_mps)
        } else {
            self.start_control_speed_mps
        };

        let overspeed = snap.speed_mps > ceiling;
        if overspeed && !self.covit_emergency {
            tracing::warn!("continuous enforcement emergency: overspeed");
        }
        self.covit_emergency = overspeed;
    }

    fn update_display(&mut self, model: TvmModel, input: &TvmInput<'_>, out: &mut CycleOutput) {
        if model.is_tvm430() {
            self.apply_cab_signal(out, self.aspect_current, self.blinking_current, false);

            if self.aspect_command != self.aspect_current
                || self.blinking_command != self.blinking_current
            {
                if !self.aspect_change_timer.started() {
                    self.aspect_change_timer.start();
                } else if self.aspect_change_timer.triggered() {
                    let reset = self.aspect_command != self.aspect_current;
                    self.apply_cab_signal(out, self.aspect_command, self.blinking_command, reset);
                    self.aspect_change_timer.stop();
                }
            }
        } else {
            let reset = self.aspect_command != self.aspect_previous_cycle;
            self.apply_cab_signal(out, self.aspect_command, self.blinking_command, reset);
        }

        out.set_display(CabControl::CabSignalMask, self.aspect_command.is_some() as u8);
        out.set_display(
            CabControl::CovitLamp,
            (self.covit_emergency || input.arming_emergency) as u8,
        );
        out.set_display(CabControl::SectionLamp, self.open_circuit_breaker as u8);
        out.set_display(
            CabControl::AutoSectionLamp,
            (model.is_tvm430() && self.open_circuit_breaker_automatic) as u8,
        );
        out.set_display(CabControl::LowerPantographLamp, self.lower_pantograph as u8);

        if self.armed {
            if let Some(aspect) = model.legacy_aspect(self.aspect_command) {
                out.next_signal_aspect = Some(aspect);
            }
        }
    }

    /// Drive the five cab-signal lamps for one aspect.
    fn apply_cab_signal(
        &mut self,
        out: &mut CycleOutput,
        aspect: Option<CabAspect>,
        blinking: bool,
        reset_blinking: bool,
    ) {
        self.aspect_current = aspect;
        self.blinking_current = blinking;

        let mut on = true;
        if blinking {
            if !self.blinker.started() {
                self.blinker.start();
            }
            if reset_blinking {
                self.blinker.stop();
                self.blinker.start();
            }
            on = self.blinker.on();
        } else {
            self.blinker.stop();
        }

        out.set_display(CabControl::CabSignalVl, 0);
        out.set_display(CabControl::CabSignalEx1, 0);
        out.set_display(CabControl::CabSignalEx2, 0);
        out.set_display(CabControl::CabSignalAn1, 0);
        out.set_display(CabControl::CabSignalAn2, 0);

        if let Some(aspect) = aspect {
            let (lamp, value, gated) = lamp_encoding(aspect);
            out.set_display(lamp, if gated && !on { 0 } else { value });
        }
    }

    /// Closed/opened one-shot edges from consecutive-cycle aspect comparison.
    fn update_sounds(&mut self, out: &mut CycleOutput) {
        if self.aspect_current.is_some() && self.aspect_previous_cycle.is_some() {
            self.closed_signal = self.aspect_previous_cycle > self.aspect_current
                || (self.blinking_current && !self.blinking_previous_cycle);
            self.opened_signal = self.aspect_previous_cycle < self.aspect_current
                || (!self.blinking_current && self.blinking_previous_cycle);
        }

        if self.closed_signal && !self.previous_closed_signal {
            out.trigger(SoundFlags::INFO_1);
        }
        if self.opened_signal && !self.previous_opened_signal {
            out.trigger(SoundFlags::INFO_1);
        }

        self.previous_closed_signal = self.closed_signal;
        self.previous_opened_signal = self.opened_signal;
    }
}

/// Lamp, value and blink-gating for one cab aspect. The stop and on-sight
/// aspects are always steady.
fn lamp_encoding(aspect: CabAspect) -> (CabControl, u8, bool) {
    use CabAspect as A;
    use CabControl as L;
    match aspect {
        A::Rrr => (L::CabSignalEx1, 1, false),
        A::S000 => (L::CabSignalAn1, 1, false),
        A::S30E => (L::CabSignalEx1, 2, true),
        A::S30A => (L::CabSignalAn1, 2, true),
        A::S60E => (L::CabSignalEx1, 3, true),
        A::S60A => (L::CabSignalAn1, 3, true),
        A::S80E => (L::CabSignalEx1, 4, true),
        A::S80A => (L::CabSignalAn1, 4, true),
        A::S100E => (L::CabSignalEx1, 5, true),
        A::S100A => (L::CabSignalAn1, 5, true),
        A::S130E => (L::CabSignalEx1, 6, true),
        A::S130A => (L::CabSignalAn1, 6, true),
        A::S160E => (L::CabSignalEx1, 7, true),
        A::S160A => (L::CabSignalAn1, 7, true),
        A::S170E => (L::CabSignalEx2, 1, true),
        A::S170A => (L::CabSignalAn2, 1, true),
        A::S200V => (L::CabSignalVl, 2, true),
        A::S200A => (L::CabSignalAn2, 2, true),
        A::S220E => (L::CabSignalEx2, 3, true),
        A::S220V => (L::CabSignalVl, 3, true),
        A::S220A => (L::CabSignalAn2, 3, true),
        A::S230E => (L::CabSignalEx2, 4, true),
        A::S230V => (L::CabSignalVl, 4, true),
        A::S230A => (L::CabSignalAn2, 4, true),
        A::S270V => (L::CabSignalVl, 5, true),
        A::S270A => (L::CabSignalAn2, 5, true),
        A::S300V => (L::CabSignalVl, 6, true),
        A::S300A => (L::CabSignalAn2, 6, true),
        A::S320V => (L::CabSignalVl, 7, true),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use atp_common::decode::DecodeRow;

    struct FlatCurve;

    impl BrakingCurve for FlatCurve {
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

    fn row(ve: &str, vc: &str, va: &str, aspect: &str, speed: f32, decel: f32) -> DecodeRow {
        DecodeRow {
            ve: ve.into(),
            vc: vc.into(),
            va: va.into(),
            aspect: aspect.into(),
            blinking: false,
            control_speed_kph: speed,
            end_control_speed_kph: Some(speed),
            deceleration_mps2: Some(decel),
        }
    }

    fn tvm430() -> Tvm {
        let table = DecodeTable::from_rows(&[
            row("320", "320V", "320", "320V", 320.0, 0.42),
            row("000", "RRR", "---", "RRR", 35.0, 0.42),
        ])
        .unwrap();
        Tvm::new(
            Some(TvmFitting {
                model: TvmModel::Tvm430V320,
                table,
            }),
            false,
        )
    }

    fn snapshot_uniform(speed_kph: f32, sections_kph: u32) -> TrackSnapshot {
        let mut snap = TrackSnapshot {
            speed_mps: from_kph(speed_kph),
            direction_reverse: false,
            train_length_m: 400.0,
            signal_aspects: [Some(Aspect::Clear2); SIGNAL_LOOK_AHEAD],
            signal_distances_m: [1500.0; SIGNAL_LOOK_AHEAD],
            signal_speed_limits_mps: [from_kph(sections_kph as f32); SIGNAL_LOOK_AHEAD],
            distant_signal_aspect: None,
            distant_signal_distance_m: f32::INFINITY,
            current_line_speed_mps: from_kph(300.0),
            next_line_speed_mps: 0.0,
            next_line_speed_distance_m: f32::INFINITY,
            track_node_offset_m: 500.0,
            next_diverging_switch_distance_m: f32::INFINITY,
            next_trailing_diverging_switch_distance_m: f32::INFINITY,
            speed_control_enabled: true,
            alerter_enabled: true,
        };
        for (i, d) in snap.signal_distances_m.iter_mut().enumerate() {
            *d = 1500.0 * (i + 1) as f32;
        }
        snap
    }

    fn input<'a>(snapshot: &'a TrackSnapshot, curve: &'a FlatCurve) -> TvmInput<'a> {
        TvmInput {
            snapshot,
            normal_signal_passed: false,
            previous_line_speed_mps: snapshot.current_line_speed_mps,
            arming_emergency: false,
            curve,
        }
    }

    #[test]
    fn uniform_permissive_sequence_is_stationary() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(300.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);

        for i in 0..TVM_BLOCK_SECTIONS {
            assert_eq!(tvm.vcond()[i], SpeedCode::S320V, "vcond[{i}]");
            assert_eq!(tvm.vc()[i], SpeedCode::S320V, "vc[{i}]");
            assert_eq!(tvm.ve()[i], SpeedCode::S320, "ve[{i}]");
            assert_eq!(tvm.va()[i], SpeedCode::S320, "va[{i}]");
        }
        assert_eq!(tvm.aspect_command(), Some(CabAspect::S320V));
        assert!(!tvm.emergency_braking());
    }

    #[test]
    fn unknown_triple_decodes_to_fallback() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        // 270 km/h everywhere: triple (270, 270V, 270) is not in the table.
        let snap = snapshot_uniform(100.0, 270);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);

        assert_eq!(tvm.aspect_command(), Some(CabAspect::Rrr));
        assert!((tvm.start_control_speed_mps - from_kph(35.0)).abs() < 1e-3);
    }

    #[test]
    fn covit_enforces_decoded_ceiling() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(330.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        // 330 km/h against a 320 km/h decoded ceiling.
        assert!(tvm.emergency_braking());

        let snap = snapshot_uniform(310.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        assert!(!tvm.emergency_braking());
    }

    #[test]
    fn covit_inhibition_suppresses_emergency() {
        let curve = FlatCurve;
        let table = DecodeTable::from_rows(&[row("320", "320V", "320", "320V", 320.0, 0.42)])
            .unwrap();
        let mut tvm = Tvm::new(
            Some(TvmFitting {
                model: TvmModel::Tvm430V320,
                table,
            }),
            true,
        );
        tvm.set_armed(true);
        let snap = snapshot_uniform(350.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        assert!(!tvm.emergency_braking());
    }

    #[test]
    fn no_op_sections_do_not_consume_slots() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let mut snap = snapshot_uniform(300.0, 320);
        // Section 3 is a repeater: permissive aspect, no speed.
        snap.signal_speed_limits_mps[3] = 0.0;
        snap.signal_aspects[3] = Some(Aspect::Clear1);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);

        // All ten slots still carry the 320 km/h sections.
        for i in 0..TVM_BLOCK_SECTIONS {
            assert_eq!(tvm.vcond()[i], SpeedCode::S320V, "vcond[{i}]");
        }
    }

    #[test]
    fn passed_signal_seeds_previous_section() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(300.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        assert_eq!(tvm.previous_vcond, SpeedCode::Any);

        let mut inp = input(&snap, &curve);
        inp.normal_signal_passed = true;
        let mut out = CycleOutput::default();
        tvm.update(0.1, &inp, &mut out);
        assert_eq!(tvm.previous_section_speed, 320);
        assert_eq!(tvm.previous_vcond, SpeedCode::S320V);
    }

    #[test]
    fn aspect_change_settles_before_display() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(200.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        // Command decoded, display still settling.
        assert_eq!(tvm.aspect_command(), Some(CabAspect::S320V));
        assert_eq!(tvm.aspect_current(), None);

        for _ in 0..50 {
            let mut out = CycleOutput::default();
            tvm.update(0.1, &input(&snap, &curve), &mut out);
        }
        assert_eq!(tvm.aspect_current(), Some(CabAspect::S320V));
    }

    #[test]
    fn disarm_clears_all_derived_state() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(330.0, 320);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        assert!(tvm.emergency_braking());

        tvm.set_armed(false);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &input(&snap, &curve), &mut out);
        assert!(!tvm.emergency_braking());
        assert_eq!(tvm.aspect_command(), None);
        assert_eq!(out.display(CabControl::CabSignalMask), Some(0));
    }

    #[test]
    fn automatic_arming_at_line_entry() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        let mut snap = snapshot_uniform(220.0, 320);
        snap.current_line_speed_mps = from_kph(220.0);
        snap.next_line_speed_mps = from_kph(300.0);
        snap.next_line_speed_distance_m = 3.0;
        let mut inp = input(&snap, &curve);
        inp.previous_line_speed_mps = from_kph(220.0);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &inp, &mut out);
        assert!(tvm.armed());

        // Leaving the high-speed line disarms.
        let mut snap = snapshot_uniform(220.0, 320);
        snap.current_line_speed_mps = from_kph(160.0);
        let mut inp = input(&snap, &curve);
        inp.previous_line_speed_mps = from_kph(300.0);
        let mut out = CycleOutput::default();
        tvm.update(0.1, &inp, &mut out);
        assert!(!tvm.armed());
    }

    #[test]
    fn downgrade_edge_fires_closed_signal_once() {
        let curve = FlatCurve;
        let mut tvm = tvm430();
        tvm.set_armed(true);
        let snap = snapshot_uniform(200.0, 320);
        // Settle until 320V is displayed.
        for _ in 0..60 {
            let mut out = CycleOutput::default();
            tvm.update(0.1, &input(&snap, &curve), &mut out);
        }
        assert_eq!(tvm.aspect_current(), Some(CabAspect::S320V));

        // The line drops to a restrictive command.
        let snap_drop = snapshot_uniform(200.0, 270);
        let mut fired = 0;
        for _ in 0..120 {
            let mut out = CycleOutput::default();
            tvm.update(0.1, &input(&snap_drop, &curve), &mut out);
            if tvm.closed_signal() && out.sounds.contains(SoundFlags::INFO_1) {
                fired += 1;
            }
        }
        assert_eq!(tvm.aspect_current(), Some(CabAspect::Rrr));
        assert_eq!(fired, 1);
    }
}
