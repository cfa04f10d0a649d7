//! Per-cycle supervision outputs.
//!
//! A fresh `CycleOutput` is built every cycle and handed to the host. All
//! writes are idempotent per-cycle state, not queued events: a display slot
//! holds the last value written this cycle, a sound flag means "this sound
//! fires/continues this cycle".

use atp_common::signal::Aspect;
use bitflags::bitflags;

/// Number of addressable cab display slots.
pub const CAB_CONTROL_SLOTS: usize = 48;

/// Named cab display controls (slot indices are part of the cab interface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CabControl {
    /// Acknowledge push button.
    AcknowledgeButton = 0,
    /// Acknowledgment-lamp cancel push button.
    CancelButton = 2,
    /// Vigilance test switch.
    AlerterTestSwitch = 3,
    /// Manual cab-signaling arming, track 1.
    ArmTrack1Button = 9,
    /// Manual cab-signaling arming, track 2.
    ArmTrack2Button = 10,
    /// Manual cab-signaling disarming.
    DisarmButton = 11,
    /// Continuous-enforcement emergency lamp.
    CovitLamp = 23,
    /// Open-circuit-breaker order lamp.
    SectionLamp = 24,
    /// Automatic circuit-breaker opening lamp.
    AutoSectionLamp = 25,
    /// Lower-pantograph order lamp.
    LowerPantographLamp = 26,
    /// Cab-signal display, full-speed row.
    CabSignalVl = 27,
    /// Cab-signal display, execution row 1.
    CabSignalEx1 = 28,
    /// Cab-signal display, execution row 2.
    CabSignalEx2 = 29,
    /// Cab-signal display, announce row 1.
    CabSignalAn1 = 30,
    /// Cab-signal display, announce row 2.
    CabSignalAn2 = 31,
    /// Closed-signal acknowledgment lamp.
    ClosedSignalLamp = 32,
    /// Reflex emergency lamp.
    RsoEmergencyLamp = 33,
    /// Vigilance emergency lamp.
    VigilanceEmergencyLamp = 34,
    /// Emergency-brake test lamp.
    EmergencyTestLamp = 35,
    /// Beacon-supervisor emergency lamp.
    KvbEmergencyLamp = 36,
    /// Speed-too-high lamp.
    SpeedTooHighLamp = 37,
    /// Beacon-supervisor brake lamp.
    KvbBrakeLamp = 38,
    /// Beacon-supervisor principal display, left half.
    KvbPrincipal1 = 41,
    /// Beacon-supervisor principal display, right half.
    KvbPrincipal2 = 42,
    /// Beacon-supervisor auxiliary display.
    KvbAuxiliary = 43,
    /// Cab-signal display mask.
    CabSignalMask = 47,
}

bitflags! {
    /// Sounds triggered this cycle.
    ///
    /// The paired `…_OFF` intents stop a continuous sound; the layers emit
    /// one of each pair every cycle so playback is stateless for the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SoundFlags: u16 {
        /// One-shot information gong (signal passage).
        const INFO_1 = 0x0001;
        /// One-shot information chime (pre-announce).
        const INFO_2 = 0x0002;
        /// Overspeed alert tone.
        const PENALTY_1 = 0x0004;
        /// Emergency tone.
        const PENALTY_2 = 0x0008;
        /// Vigilance warning on.
        const WARNING_1 = 0x0010;
        /// Vigilance warning off.
        const WARNING_2 = 0x0020;
        /// Vigilance alert on.
        const ALERT_1 = 0x0040;
        /// Vigilance alert off.
        const ALERT_2 = 0x0080;
    }
}

/// All outputs of one control cycle.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    /// Emergency brake demand.
    pub emergency_braking: bool,
    /// Traction authorization (inverse of the emergency decision).
    pub power_authorization: bool,
    /// Penalty-application indicator.
    pub penalty_display: bool,
    /// Vigilance emergency indicator.
    pub vigilance_emergency_display: bool,
    /// Overspeed warning indicator.
    pub overspeed_warning_display: bool,
    /// Legacy cab repeater aspect.
    pub next_signal_aspect: Option<Aspect>,
    /// Speed limit enforced for the current section [m/s].
    pub current_speed_limit_mps: Option<f32>,
    /// Speed limit enforced at the next target [m/s].
    pub next_speed_limit_mps: Option<f32>,
    /// Display slot writes (slot index → integer state).
    pub displays: [Option<u8>; CAB_CONTROL_SLOTS],
    /// Sounds fired this cycle.
    pub sounds: SoundFlags,
}

impl Default for CycleOutput {
    fn default() -> Self {
        Self {
            emergency_braking: false,
            power_authorization: true,
            penalty_display: false,
            vigilance_emergency_display: false,
            overspeed_warning_display: false,
            next_signal_aspect: None,
            current_speed_limit_mps: None,
            next_speed_limit_mps: None,
            displays: [None; CAB_CONTROL_SLOTS],
            sounds: SoundFlags::empty(),
        }
    }
}

impl CycleOutput {
    /// Write a named display slot.
    #[inline]
    pub fn set_display(&mut self, control: CabControl, state: u8) {
        self.displays[control as usize] = Some(state);
    }

    /// Write a raw display slot (generic numbered buttons). Out-of-range
    /// slots are ignored.
    #[inline]
    pub fn set_display_raw(&mut self, slot: u8, state: u8) {
        if let Some(entry) = self.displays.get_mut(slot as usize) {
            *entry = Some(state);
        }
    }

    /// Read back a named display slot (test support).
    #[inline]
    pub fn display(&self, control: CabControl) -> Option<u8> {
        self.displays[control as usize]
    }

    /// Fire a sound this cycle.
    #[inline]
    pub fn trigger(&mut self, sounds: SoundFlags) {
        self.sounds |= sounds;
    }
}
