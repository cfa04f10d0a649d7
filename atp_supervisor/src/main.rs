//! # ATP Supervisor driver
//!
//! Replays a scripted approach scenario through the supervisor and logs the
//! per-cycle decisions. Two scenarios are built in:
//!
//! - **conventional**: 90 km/h approach to a stop signal under beacon
//!   supervision; the driver never brakes, the supervisor must.
//! - **high-speed**: 300 km/h under cab signaling with a speed restriction
//!   appearing mid-run.
//!
//! The host-side collaborators (track data, braking curve) come from the
//! [`atp_supervisor::sim`] module; train parameters load from a TOML file.

use std::path::PathBuf;
use std::process;

use atp_common::config::TrainConfig;
use atp_common::decode::DecodeTable;
use atp_common::signal::Aspect;
use atp_common::units::{from_kph, to_kph};
use atp_supervisor::sim::{KinematicCurve, ScriptedEnvironment, SignalAhead};
use atp_supervisor::supervisor::Supervisor;
use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// ATP Supervisor — scripted train-protection scenarios
#[derive(Parser, Debug)]
#[command(name = "atp_supervisor")]
#[command(version)]
#[command(about = "Cycle-driven train protection supervisor, scripted driver")]
struct Args {
    /// Path to the train configuration TOML. Defaults apply if omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the decode-table TOML (required for cab-signaling fittings).
    #[arg(long, value_name = "FILE")]
    decode_table: Option<PathBuf>,

    /// Scenario to replay.
    #[arg(long, value_enum, default_value_t = Scenario::Conventional)]
    scenario: Scenario,

    /// Number of control cycles to run.
    #[arg(long, default_value_t = 1200)]
    cycles: u32,

    /// Cycle time [ms].
    #[arg(long, default_value_t = 100)]
    cycle_time_ms: u32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Beacon supervision, stop signal ahead.
    Conventional,
    /// Cab signaling on a high-speed line.
    HighSpeed,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("ATP supervisor v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => TrainConfig::load(path)?,
        None => default_config(args.scenario)?,
    };

    let decode_table = match &args.decode_table {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Some(DecodeTable::from_toml_str(&text)?)
        }
        None if args.scenario == Scenario::HighSpeed => {
            Some(atp_supervisor::sim::demo_decode_table()?)
        }
        None => None,
    };

    info!(
        "config OK: kvb={}, tvm={:?}, cycle_time={}ms",
        config.general.kvb_present,
        config.tvm_model(),
        args.cycle_time_ms,
    );

    let mut supervisor = Supervisor::new(&config, decode_table, Box::new(KinematicCurve))?;
    let mut env = build_environment(args.scenario);
    supervisor.initialize_moving(&env);

    let dt_s = args.cycle_time_ms as f32 / 1000.0;
    let mut emergency_cycles = 0u32;

    for cycle in 0..args.cycles {
        let out = supervisor.update(dt_s, &env);

        if out.emergency_braking {
            emergency_cycles += 1;
            // The host brake model: full service deceleration under emergency.
            env.speed_mps = (env.speed_mps - 1.2 * dt_s).max(0.0);
        }
        env.advance(dt_s);

        if cycle % 50 == 0 {
            info!(
                cycle,
                speed_kph = %format!("{:.1}", to_kph(env.speed_mps)),
                emergency = out.emergency_braking,
                aspect = ?out.next_signal_aspect,
                "tick"
            );
        }
    }

    info!(
        "scenario complete: {} cycles, {} under emergency braking, final speed {:.1} km/h",
        args.cycles,
        emergency_cycles,
        to_kph(env.speed_mps),
    );

    Ok(())
}

fn default_config(scenario: Scenario) -> Result<TrainConfig, atp_common::config::ConfigError> {
    let toml = match scenario {
        Scenario::Conventional => "[general]\nkvb_present = true\n",
        Scenario::HighSpeed => "[general]\nkvb_present = true\ntvm430_present = true\n",
    };
    TrainConfig::from_toml_str(toml)
}

fn build_environment(scenario: Scenario) -> ScriptedEnvironment {
    match scenario {
        Scenario::Conventional => {
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
            env
        }
        Scenario::HighSpeed => {
            let mut env = ScriptedEnvironment::high_speed(320.0, 1500.0, 24);
            // A 270 km/h restriction a few blocks in.
            for signal in env.signals.iter_mut().skip(6) {
                signal.speed_limit_mps = from_kph(270.0);
            }
            env
        }
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
