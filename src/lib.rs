//! Tello Control - client library for the Tello quadcopter SDK
//!
//! Speaks the drone's text command protocol over UDP: composes commands,
//! correlates each command with its reply under a bounded timeout, ingests
//! the unsolicited telemetry stream and keeps an idle drone from auto-landing.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tello_control::{Config, DroneController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let drone = DroneController::new(Config::default())?;
//!
//!     drone.connect().await?;
//!     drone.enter_command_mode().await?;
//!     drone.start_telemetry_monitor();
//!
//!     println!("Battery: {}%", drone.battery().await?);
//!     drone.take_off().await?;
//!     drone.forward(100).await?;
//!     drone.land().await?;
//!
//!     drone.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Command**: one instruction and its wire text
//! - **Transport**: command and telemetry UDP channels
//! - **CommandExecutor**: send, await and classify replies
//! - **TelemetryMonitor**: background decoding of status datagrams
//! - **KeepAlive**: background liveness probe
//! - **DroneState**: per-field atomic snapshot of the drone
//! - **DroneController**: the public control surface tying them together

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod keep_alive;
pub mod mock;
pub mod reply;
pub mod state;
pub mod telemetry;
pub mod transport;
mod worker;

pub use command::{Command, CommandId, FlipDirection, Param};
pub use config::Config;
pub use controller::DroneController;
pub use error::{Result, TelloError};
pub use executor::{classify_reply, CommandExecutor, CommandKind, Reply};
pub use keep_alive::KeepAlive;
pub use mock::MockTransport;
pub use state::{Attitude, ConnectionState, DroneSnapshot, DroneState, Vector3};
pub use telemetry::{TelemetryMonitor, TelemetryRecord};
pub use transport::{Transport, UdpTransport};
