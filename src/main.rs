//! spike-sim - run a scenario from the command line
//!
//! Loads a scenario and a robot, optionally drives the robot with a pair
//! command, advances time and prints the final status as JSON.
//!
//! ```text
//! spike-sim --scenario scenario.json --robot robot.json --steps 10 --speed 50
//! ```

use clap::Parser;
use serde::Serialize;
use spike_sim::dynamics::DynamicsStatus;
use spike_sim::hub::HubStatus;
use spike_sim::{
    Args, ClockMode, ComponentKind, Error, Port, Result, Scenario, SimComponent, Value,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "spike-sim", version, about = "Hardware-free SPIKE hub simulation")]
struct Cli {
    /// Scenario configuration file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Robot configuration file
    #[arg(short, long)]
    robot: PathBuf,

    /// Controlled-clock steps to run
    #[arg(long, default_value_t = 10)]
    steps: u64,

    /// Realtime duration in seconds
    #[arg(long, default_value_t = 1.0)]
    seconds: f64,

    /// Left and right motor ports of the drive pair
    #[arg(long, num_args = 2, value_names = ["LEFT", "RIGHT"])]
    pair: Option<Vec<String>>,

    /// Pair speed in percent
    #[arg(long, default_value_t = 50.0, allow_hyphen_values = true)]
    speed: f64,

    /// Pair steering in percent
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    steering: f64,
}

#[derive(Serialize)]
struct Report {
    robot: DynamicsStatus,
    hub: HubStatus,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    log::info!("spike-sim v{} starting...", env!("CARGO_PKG_VERSION"));
    let scenario = Scenario::load(&cli.scenario, &cli.robot)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    scenario.start()?;

    if let Some(ports) = &cli.pair {
        drive(&scenario, ports, cli.steering, cli.speed)?;
    }

    match scenario.clock_mode()? {
        ClockMode::Controlled => {
            for _ in 0..cli.steps {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                scenario.step()?;
            }
        }
        ClockMode::Realtime => {
            let until = Instant::now() + Duration::from_secs_f64(cli.seconds.max(0.0));
            while running.load(Ordering::Relaxed) && Instant::now() < until {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    let report = Report {
        robot: scenario.status()?,
        hub: scenario.hub_status()?,
    };
    scenario.stop()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Register both motors and the pair, then start driving
fn drive(scenario: &Scenario, ports: &[String], steering: f64, speed: f64) -> Result<()> {
    let [left, right] = ports else {
        return Err(Error::InvalidParameter(
            "--pair takes exactly two ports".to_string(),
        ));
    };
    for port in [left, right] {
        port.parse::<Port>()?;
        scenario.register(SimComponent::new(ComponentKind::Motor), Some(port.as_str()), None)?;
    }
    let pair = scenario.register(
        SimComponent::new(ComponentKind::MotorPair),
        Some(left.as_str()),
        Some(right.as_str()),
    )?;

    let mut args = Args::new();
    args.insert("steering".to_string(), Value::Float(steering));
    args.insert("speed".to_string(), Value::Float(speed));
    scenario.run(&pair, "start", &args)?;
    log::info!(
        "Driving pair {}{} at speed {} steering {}",
        left,
        right,
        speed,
        steering
    );
    Ok(())
}
