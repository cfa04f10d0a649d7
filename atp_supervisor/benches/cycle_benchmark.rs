//! Full supervision cycle benchmark.
//!
//! High-speed scenario: the sequence build, reduction and decode dominate
//! the cycle cost, so this tracks the worst-case per-tick work.

use atp_common::config::TrainConfig;
use atp_supervisor::sim::{demo_decode_table, KinematicCurve, ScriptedEnvironment};
use atp_supervisor::supervisor::Supervisor;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_high_speed_cycle(c: &mut Criterion) {
    let config = TrainConfig::from_toml_str(
        "[general]\nkvb_present = true\ntvm430_present = true\n",
    )
    .unwrap();
    let table = demo_decode_table().unwrap();
    let mut supervisor = Supervisor::new(&config, Some(table), Box::new(KinematicCurve)).unwrap();
    let env = ScriptedEnvironment::high_speed(320.0, 1500.0, 24);
    supervisor.initialize_moving(&env);

    // Burn through the warm-up cycles.
    for _ in 0..10 {
        supervisor.update(0.1, &env);
    }

    c.bench_function("supervisor_cycle_high_speed", |b| {
        b.iter(|| black_box(supervisor.update(0.1, &env)))
    });
}

fn bench_conventional_cycle(c: &mut Criterion) {
    let config = TrainConfig::from_toml_str("[general]\nkvb_present = true\n").unwrap();
    let mut supervisor = Supervisor::new(&config, None, Box::new(KinematicCurve)).unwrap();
    let env = ScriptedEnvironment::conventional();
    supervisor.initialize_moving(&env);
    for _ in 0..10 {
        supervisor.update(0.1, &env);
    }

    c.bench_function("supervisor_cycle_conventional", |b| {
        b.iter(|| black_box(supervisor.update(0.1, &env)))
    });
}

criterion_group!(benches, bench_high_speed_cycle, bench_conventional_cycle);
criterion_main!(benches);
