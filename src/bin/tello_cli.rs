//! Tello CLI
//!
//! Thin command-line harness over the control library: print a full status
//! report, or fly a sequence of raw SDK commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tello_control::{Command, CommandId, Config, DroneController, MockTransport, Reply, Transport};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tello_cli")]
#[command(about = "Control a Tello drone over its UDP SDK")]
#[command(version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Show wire traffic and loop activity
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Talk to an in-process mock drone instead of the network
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query every value the drone reports and print them as JSON
    Status,
    /// Execute SDK commands in order, e.g. `run takeoff "forward 100" land`
    Run {
        /// Commands as wire text
        #[arg(required = true)]
        commands: Vec<String>,

        /// Feed telemetry into the state while flying
        #[arg(long)]
        telemetry: bool,

        /// Keep the drone from auto-landing between commands
        #[arg(long)]
        keep_alive: bool,
    },
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path)),
            None => Ok(Config::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "tello_control=debug,tello_cli=debug"
    } else {
        "tello_control=info,tello_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    let drone = if args.mock {
        info!("Using mock drone");
        let transport: Arc<dyn Transport> = Arc::new(mock_drone());
        DroneController::with_transport(config, transport)
    } else {
        DroneController::new(config)
    }
    .context("Failed to create drone controller")?;

    drone.connect().await.context("Failed to connect to drone")?;
    let outcome = match &args.command {
        Commands::Status => print_status(&drone).await,
        Commands::Run {
            commands,
            telemetry,
            keep_alive,
        } => {
            let telemetry = *telemetry || drone.config().telemetry.enabled;
            let keep_alive = *keep_alive || drone.config().keep_alive.enabled;
            run_commands(&drone, commands, telemetry, keep_alive).await
        }
    };

    // Always land and release the sockets, even after a failed command
    drone.disconnect().await.context("Failed to disconnect")?;

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn mock_drone() -> MockTransport {
    let mock = MockTransport::new();
    mock.set_reply(CommandId::Battery, "87");
    mock.set_reply(CommandId::Speed, "10.0");
    mock.set_reply(CommandId::FlightTime, "0s");
    mock.set_reply(CommandId::Height, "0dm");
    mock.set_reply(CommandId::Temperature, "63~65C");
    mock.set_reply(CommandId::Barometer, "122.34");
    mock.set_reply(CommandId::Tof, "100mm");
    mock.set_reply(CommandId::Attitude, "pitch:0;roll:0;yaw:0;");
    mock.set_reply(CommandId::Acceleration, "agx:0.00;agy:0.00;agz:-1000.00;");
    mock.set_reply(CommandId::SerialNumber, "MOCK00000000");
    mock.set_reply(CommandId::Sdk, "30");
    mock
}

async fn print_status(drone: &DroneController) -> Result<()> {
    drone.enter_command_mode().await.context("Drone refused command mode")?;

    drone.battery().await.context("battery query failed")?;
    drone.speed().await.context("speed query failed")?;
    drone.flight_time().await.context("flight time query failed")?;
    drone.height().await.context("height query failed")?;
    drone.temperature().await.context("temperature query failed")?;
    drone.barometer().await.context("barometer query failed")?;
    drone.tof().await.context("tof query failed")?;
    drone.attitude().await.context("attitude query failed")?;
    drone.acceleration().await.context("acceleration query failed")?;
    drone.serial_number().await.context("serial number query failed")?;
    drone.sdk_version().await.context("sdk version query failed")?;

    println!("{}", serde_json::to_string_pretty(&drone.snapshot())?);
    Ok(())
}

async fn run_commands(
    drone: &DroneController,
    commands: &[String],
    telemetry: bool,
    keep_alive: bool,
) -> Result<()> {
    let commands = commands
        .iter()
        .map(|text| text.parse::<Command>().with_context(|| format!("Invalid command '{}'", text)))
        .collect::<Result<Vec<_>>>()?;

    drone.enter_command_mode().await.context("Drone refused command mode")?;
    if telemetry {
        drone.start_telemetry_monitor();
    }
    if keep_alive {
        drone.start_keep_alive();
    }

    for command in &commands {
        let reply = drone
            .execute(command)
            .await
            .with_context(|| format!("'{}' failed", command))?;
        match reply {
            Reply::Value(value) => println!("{} => {}", command, value.trim()),
            Reply::NoData => println!("{} => (no data)", command),
            Reply::Ok => info!("{} => ok", command),
        }
    }

    if telemetry {
        println!("{}", serde_json::to_string_pretty(&drone.snapshot())?);
    }
    Ok(())
}
