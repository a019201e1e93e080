use std::{path::Path, time::Duration};

use anyhow::Result;
use clap::Parser;
use log::info;
use pat_pipeline::{
    RunRecorder, SerialStore, StationConfig, StationRunner, TestSession, TestStateMachine,
};

mod sim;

use sim::SimulatedStand;

/// Control loop for the PPE analysis test stand.
#[derive(Debug, Parser)]
#[command(author, version, about = "PPE analysis test stand (PAT) control loop")]
struct Args {
    /// Optional path to a JSON StationConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Stop after this many unit reports. Runs until interrupted if omitted.
    #[arg(long)]
    units: Option<u64>,

    /// Seed for the simulated stand. Random if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Free-text note stored in every unit summary of this session.
    #[arg(long)]
    description: Option<String>,
}

fn load_config(config_path: Option<&str>) -> Result<StationConfig> {
    match config_path {
        Some(cfg_path) => StationConfig::load(Path::new(cfg_path)),
        None => Ok(StationConfig::default()),
    }
}

/// Bootstrap a session and run the station until `units` reports are done.
/// Returns the calibration serial and the number of completed units.
fn run_station<S: pat_pipeline::TestStand>(
    config: StationConfig,
    stand: S,
    units: Option<u64>,
    description: Option<String>,
) -> Result<(u64, u64)> {
    let serial = SerialStore::new(&config.serial_file).next_calibration_serial()?;
    let recorder = RunRecorder::new(&config.output_dir);
    let dir = recorder.prepare(serial)?;
    info!("calibration serial {serial}, writing to {}", dir.display());

    let interval = Duration::from_millis(config.tick_interval_ms);
    let session = match description {
        Some(text) => TestSession::with_description(serial, text),
        None => TestSession::new(serial),
    };
    let machine = TestStateMachine::new(config, session, recorder)?;
    let mut runner = StationRunner::new(machine, stand);
    runner.run_paced(None, interval, |m| {
        units.is_some_and(|n| m.session().units_completed() >= n)
    })?;

    let completed = runner.machine().session().units_completed();
    info!("{completed} unit(s) tested in {} ticks", runner.ticks());
    Ok((serial, completed))
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let seed = args.seed.unwrap_or_else(rand::random);
    info!("simulated stand, seed {seed}");
    run_station(config, SimulatedStand::new(seed), args.units, args.description)?;
    Ok(())
}
