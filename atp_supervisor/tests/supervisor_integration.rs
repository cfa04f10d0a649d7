//! End-to-end supervision scenarios: full supervisor driven by the
//! scripted environment, exercising multiple layers together over whole
//! approach sequences.

use atp_common::config::TrainConfig;
use atp_common::signal::Aspect;
use atp_common::units::{from_kph, to_kph};
use atp_supervisor::kvb::KvbMode;
use atp_supervisor::outputs::CabControl;
use atp_supervisor::sim::{demo_decode_table, KinematicCurve, ScriptedEnvironment, SignalAhead};
use atp_supervisor::supervisor::{buttons, Supervisor, TcsEvent};

const DT_S: f32 = 0.1;
/// Host brake model under emergency [m/s²].
const EMERGENCY_DECEL_MPS2: f32 = 1.2;

fn kvb_only_config() -> TrainConfig {
    TrainConfig::from_toml_str(
        "[general]\nkvb_present = true\nrso_present = false\nvacma_present = false\n",
    )
    .unwrap()
}

fn rso_only_config() -> TrainConfig {
    TrainConfig::from_toml_str("[general]\nvacma_present = false\n").unwrap()
}

fn high_speed_config() -> TrainConfig {
    TrainConfig::from_toml_str(
        "[general]\nkvb_present = true\nrso_present = false\nvacma_present = false\ntvm430_present = true\n",
    )
    .unwrap()
}

/// One cycle of the closed loop: supervise, brake if demanded, advance.
fn step(sup: &mut Supervisor, env: &mut ScriptedEnvironment) -> atp_supervisor::outputs::CycleOutput {
    let out = sup.update(DT_S, env);
    if out.emergency_braking {
        env.speed_mps = (env.speed_mps - EMERGENCY_DECEL_MPS2 * DT_S).max(0.0);
    }
    env.advance(DT_S);
    out
}

#[test]
fn stop_target_approach_alert_then_emergency_then_rearm() {
    let config = kvb_only_config();
    let mut sup = Supervisor::new(&config, None, Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::conventional();
    env.speed_mps = from_kph(90.0);
    env.signals = vec![
        SignalAhead {
            aspect: Aspect::Approach1,
            distance_m: 400.0,
            speed_limit_mps: 0.0,
        },
        SignalAhead {
            aspect: Aspect::Stop,
            distance_m: 1900.0,
            speed_limit_mps: 0.0,
        },
    ];
    sup.initialize_moving(&env);

    let mut saw_alert_before_emergency = false;
    let mut emergency_cycle = None;

    for cycle in 0..2000 {
        let out = step(&mut sup, &mut env);
        if out.overspeed_warning_display && !out.emergency_braking {
            saw_alert_before_emergency = true;
        }
        if out.emergency_braking && emergency_cycle.is_none() {
            emergency_cycle = Some(cycle);
        }
        if env.speed_mps == 0.0 {
            break;
        }
    }

    assert!(saw_alert_before_emergency, "alert must precede emergency");
    assert!(emergency_cycle.is_some(), "curve emergency must fire");
    assert!(
        !env.signals.is_empty(),
        "train must stop before the stop signal, still had {:.1} km/h",
        to_kph(env.speed_mps),
    );
    assert!(sup.emergency_braking());

    // Standstill alone does not release the brakes.
    for _ in 0..20 {
        let out = step(&mut sup, &mut env);
        assert!(out.emergency_braking);
    }

    // Explicit rearm does, and the supervisor re-enters on-sight running.
    sup.handle_event(TcsEvent::RearmPressed);
    let out = step(&mut sup, &mut env);
    sup.handle_event(TcsEvent::RearmReleased);
    assert!(!out.emergency_braking);
    assert!(out.power_authorization);
    assert!(sup.kvb().on_sight());
}

#[test]
fn high_speed_clear_line_is_most_permissive_without_emergency() {
    let config = high_speed_config();
    let table = demo_decode_table().unwrap();
    let mut sup = Supervisor::new(&config, Some(table), Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::high_speed(320.0, 1500.0, 24);
    sup.initialize_moving(&env);

    let mut last = None;
    for _ in 0..40 {
        last = Some(step(&mut sup, &mut env));
    }
    let out = last.unwrap();

    assert_eq!(sup.kvb().mode(), KvbMode::HighSpeedLine);
    assert!(sup.tvm().armed());
    assert!(!out.emergency_braking);
    assert!(out.power_authorization);
    // Most permissive table entry decoded and repeated to the cab.
    assert_eq!(out.next_signal_aspect, Some(Aspect::Clear2));
    assert_eq!(
        out.current_speed_limit_mps.map(to_kph).map(f32::round),
        Some(320.0)
    );
}

#[test]
fn high_speed_restriction_decodes_downgrade_chain() {
    let config = high_speed_config();
    let table = demo_decode_table().unwrap();
    let mut sup = Supervisor::new(&config, Some(table), Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::high_speed(320.0, 1500.0, 24);
    for signal in env.signals.iter_mut().skip(6) {
        signal.speed_limit_mps = from_kph(270.0);
    }
    sup.initialize_moving(&env);

    // The restriction sits far outside the announce horizon at first.
    let mut aspects_seen = Vec::new();
    for _ in 0..4000 {
        let out = step(&mut sup, &mut env);
        if out.emergency_braking {
            break;
        }
        let aspect = sup.tvm().aspect_current();
        if aspects_seen.last() != Some(&aspect) {
            aspects_seen.push(aspect);
        }
        if env.signals.len() < 12 {
            break;
        }
    }

    use atp_common::codes::CabAspect;
    assert!(
        aspects_seen.contains(&Some(CabAspect::S320V)),
        "clear aspect first, saw {aspects_seen:?}"
    );
    assert!(
        aspects_seen.contains(&Some(CabAspect::S300A))
            || aspects_seen.contains(&Some(CabAspect::S270A)),
        "announce aspect on approach, saw {aspects_seen:?}"
    );
}

#[test]
fn unacknowledged_closed_signal_brakes_acknowledged_does_not() {
    // Without acknowledgment.
    let config = rso_only_config();
    let mut sup = Supervisor::new(&config, None, Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::conventional();
    env.speed_mps = from_kph(100.0);
    env.signals = vec![SignalAhead {
        aspect: Aspect::Approach2,
        distance_m: 60.0,
        speed_limit_mps: 0.0,
    }];
    sup.initialize_moving(&env);

    let mut emergencies = 0;
    let mut was = false;
    for _ in 0..150 {
        let out = step(&mut sup, &mut env);
        if out.emergency_braking && !was {
            emergencies += 1;
        }
        was = out.emergency_braking;
    }
    assert_eq!(emergencies, 1, "exactly one reflex emergency");

    // With timely acknowledgment.
    let mut sup = Supervisor::new(&config, None, Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::conventional();
    env.speed_mps = from_kph(100.0);
    env.signals = vec![SignalAhead {
        aspect: Aspect::Approach2,
        distance_m: 60.0,
        speed_limit_mps: 0.0,
    }];
    sup.initialize_moving(&env);

    for cycle in 0..150 {
        if cycle == 40 {
            sup.handle_event(TcsEvent::ButtonPressed(buttons::ACKNOWLEDGE));
        }
        if cycle == 45 {
            sup.handle_event(TcsEvent::ButtonReleased(buttons::ACKNOWLEDGE));
        }
        let out = step(&mut sup, &mut env);
        assert!(!out.emergency_braking, "acknowledged in time at cycle {cycle}");
    }
}

#[test]
fn spad_latches_until_standstill_and_rearm() {
    let config = kvb_only_config();
    let mut sup = Supervisor::new(&config, None, Box::new(KinematicCurve)).unwrap();
    let mut env = ScriptedEnvironment::conventional();
    // Slow enough that the approach curve tolerates it up to the signal.
    env.speed_mps = from_kph(10.0);
    env.signals = vec![
        SignalAhead {
            aspect: Aspect::Stop,
            distance_m: 40.0,
            speed_limit_mps: 0.0,
        },
        SignalAhead {
            aspect: Aspect::Stop,
            distance_m: 1540.0,
            speed_limit_mps: 0.0,
        },
    ];
    sup.initialize_moving(&env);

    let mut braked = false;
    for _ in 0..400 {
        let out = step(&mut sup, &mut env);
        if out.emergency_braking {
            braked = true;
        }
        if braked && env.speed_mps == 0.0 {
            break;
        }
    }
    assert!(braked, "signal passed at danger must brake");
    assert!(sup.emergency_braking());
    let out = sup.update(DT_S, &env);
    assert_eq!(out.display(CabControl::KvbEmergencyLamp), Some(1));

    sup.handle_event(TcsEvent::RearmPressed);
    let out = sup.update(DT_S, &env);
    sup.handle_event(TcsEvent::RearmReleased);
    assert!(!out.emergency_braking);
    assert!(sup.kvb().on_sight());
}
