//! Vigilance (alerter) layer.
//!
//! Above the activation speed the driver must keep cycling the vigilance
//! control: holding it too long or releasing it too long each run their own
//! alert/emergency timer pair. Throttle, dynamic-brake and horn activity
//! counts as vigilance while the control is held.

use atp_common::config::TrainConfig;
use atp_common::timing::Timer;
use atp_common::units::from_kph;

use crate::outputs::{CabControl, CycleOutput, SoundFlags};

/// Per-cycle inputs of the vigilance layer.
#[derive(Debug, Clone, Copy)]
pub struct VacmaInput {
    /// Measured speed [m/s].
    pub speed_mps: f32,
    /// Layer enabled by the host.
    pub alerter_enabled: bool,
    /// Rearm input held.
    pub rearm: bool,
    /// Combined emergency decision (drives the test lamp).
    pub emergency_braking: bool,
}

/// Vigilance layer state.
#[derive(Debug)]
pub struct Vacma {
    present: bool,
    activation_speed_mps: f32,
    pressed: bool,
    test: bool,
    emergency: bool,
    pressed_alert: Timer,
    pressed_emergency: Timer,
    released_alert: Timer,
    released_emergency: Timer,
}

impl Vacma {
    pub fn new(config: &TrainConfig) -> Self {
        Self {
            present: config.general.vacma_present,
            activation_speed_mps: from_kph(config.vacma.activation_speed_kph),
            pressed: false,
            test: false,
            // Latched until the mission starts or the driver rearms.
            emergency: true,
            pressed_alert: Timer::new(config.vacma.pressed_alert_delay_s),
            pressed_emergency: Timer::new(config.vacma.pressed_emergency_delay_s),
            released_alert: Timer::new(config.vacma.released_alert_delay_s),
            released_emergency: Timer::new(config.vacma.released_emergency_delay_s),
        }
    }

    /// Mission starts with the train already moving: no latched emergency.
    pub fn init_moving(&mut self) {
        self.emergency = false;
    }

    #[inline]
    pub const fn emergency_braking(&self) -> bool {
        self.emergency
    }

    /// Vigilance control pressed/released.
    pub fn set_pressed(&mut self, pressed: bool) {
        self.pressed = pressed;
    }

    /// Vigilance test switch.
    pub fn set_test(&mut self, on: bool) {
        self.test = on;
    }

    /// Throttle/dynamic-brake/horn activity counts as vigilance while the
    /// control is held: restart the held-control timer pair.
    pub fn notify_activity(&mut self) {
        if self.pressed_alert.started() || self.pressed_emergency.started() {
            self.pressed_alert.start();
            self.pressed_emergency.start();
        }
    }

    pub fn update(&mut self, dt_s: f32, input: &VacmaInput, out: &mut CycleOutput) {
        if !(self.present && input.alerter_enabled) {
            self.reset();
            out.vigilance_emergency_display = false;
            out.trigger(SoundFlags::WARNING_2 | SoundFlags::ALERT_2);
            return;
        }

        self.pressed_alert.update(dt_s);
        self.pressed_emergency.update(dt_s);
        self.released_alert.update(dt_s);
        self.released_emergency.update(dt_s);

        if input.speed_mps >= self.activation_speed_mps || self.test {
            if self.pressed
                && (!self.pressed_alert.started() || !self.pressed_emergency.started())
            {
                self.released_alert.stop();
                self.released_emergency.stop();
                self.pressed_alert.start();
                self.pressed_emergency.start();
            }
            if !self.pressed
                && (!self.released_alert.started() || !self.released_emergency.started())
            {
                self.released_alert.start();
                self.released_emergency.start();
                self.pressed_alert.stop();
                self.pressed_emergency.stop();
            }
        } else {
            self.released_alert.stop();
            self.released_emergency.stop();
            self.pressed_alert.stop();
            self.pressed_emergency.stop();
        }

        if self.released_alert.triggered() {
            out.trigger(SoundFlags::WARNING_1);
        } else {
            out.trigger(SoundFlags::WARNING_2);
        }

        if self.pressed_alert.triggered() {
            out.trigger(SoundFlags::ALERT_1);
        } else {
            out.trigger(SoundFlags::ALERT_2);
        }

        if !self.emergency
            && (self.pressed_emergency.triggered() || self.released_emergency.triggered())
        {
            self.emergency = true;
            tracing::warn!("vigilance emergency: no driver acknowledgment");
        }

        if self.emergency && input.speed_mps < self.activation_speed_mps && input.rearm {
            self.emergency = false;
        }

        out.vigilance_emergency_display = self.emergency;
        out.set_display(
            CabControl::VigilanceEmergencyLamp,
            self.emergency as u8,
        );
        out.set_display(
            CabControl::EmergencyTestLamp,
            (self.test && input.emergency_braking) as u8,
        );
    }

    fn reset(&mut self) {
        self.released_alert.stop();
        self.released_emergency.stop();
        self.pressed_alert.stop();
        self.pressed_emergency.stop();
        self.emergency = false;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vacma() -> Vacma {
        let mut v = Vacma::new(&TrainConfig::default());
        v.init_moving();
        v
    }

    fn input(speed_kph: f32) -> VacmaInput {
        VacmaInput {
            speed_mps: from_kph(speed_kph),
            alerter_enabled: true,
            rearm: false,
            emergency_braking: false,
        }
    }

    #[test]
    fn released_too_long_raises_emergency() {
        let mut v = vacma();
        let mut out = CycleOutput::default();
        // Default released emergency delay is 5 s.
        for _ in 0..11 {
            out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        assert!(v.emergency_braking());
        assert!(out.vigilance_emergency_display);
    }

    #[test]
    fn alert_sounds_before_emergency() {
        let mut v = vacma();
        let mut out = CycleOutput::default();
        for _ in 0..6 {
            out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        // 3 s elapsed: released alert (2.5 s) fired, emergency (5 s) not yet.
        assert!(out.sounds.contains(SoundFlags::WARNING_1));
        assert!(!v.emergency_braking());
    }

    #[test]
    fn cycling_the_control_prevents_emergency() {
        let mut v = vacma();
        for i in 0..40 {
            v.set_pressed(i % 4 < 2); // press/release every second
            let mut out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        assert!(!v.emergency_braking());
    }

    #[test]
    fn held_too_long_raises_emergency() {
        let mut v = vacma();
        v.set_pressed(true);
        for _ in 0..125 {
            let mut out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        // 62.5 s held > 60 s pressed emergency delay.
        assert!(v.emergency_braking());
    }

    #[test]
    fn activity_restarts_held_timers() {
        let mut v = vacma();
        v.set_pressed(true);
        for i in 0..200 {
            if i % 100 == 99 {
                v.notify_activity();
            }
            let mut out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        assert!(!v.emergency_braking());
    }

    #[test]
    fn below_activation_speed_no_supervision() {
        let mut v = vacma();
        for _ in 0..100 {
            let mut out = CycleOutput::default();
            v.update(0.5, &input(1.0), &mut out);
        }
        assert!(!v.emergency_braking());
    }

    #[test]
    fn clearing_requires_standstill_and_rearm() {
        let mut v = vacma();
        for _ in 0..11 {
            let mut out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        assert!(v.emergency_braking());

        // Rearm while still moving: ignored.
        let mut moving = input(100.0);
        moving.rearm = true;
        let mut out = CycleOutput::default();
        v.update(0.5, &moving, &mut out);
        assert!(v.emergency_braking());

        // Rearm once below activation speed: cleared.
        let mut stopped = input(0.0);
        stopped.rearm = true;
        let mut out = CycleOutput::default();
        v.update(0.5, &stopped, &mut out);
        assert!(!v.emergency_braking());
    }

    #[test]
    fn disabled_layer_resets_and_silences() {
        let mut v = vacma();
        for _ in 0..11 {
            let mut out = CycleOutput::default();
            v.update(0.5, &input(100.0), &mut out);
        }
        let mut off = input(100.0);
        off.alerter_enabled = false;
        let mut out = CycleOutput::default();
        v.update(0.5, &off, &mut out);
        assert!(!v.emergency_braking());
        assert!(out.sounds.contains(SoundFlags::WARNING_2 | SoundFlags::ALERT_2));
    }
}
