//! Telemetry ingestion
//!
//! The drone pushes `key:value;key:value;...;` status datagrams to the
//! telemetry port at its own cadence. The monitor decodes each one into a
//! [`TelemetryRecord`] and applies it to the shared [`DroneState`].

use crate::{
    state::{Attitude, DroneState, Vector3},
    transport::Transport,
    worker::{raised, LoopSlot},
    Result, TelloError,
};
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Decoded key/value pairs of one telemetry datagram, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryRecord {
    fields: Vec<(String, String)>,
}

impl TelemetryRecord {
    /// Split on `;` then on the first `:`. Empty fields and fields without a
    /// separator are dropped.
    pub fn parse(datagram: &str) -> Self {
        let fields = datagram
            .split(';')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .filter_map(|field| field.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Write every recognized field into `state`.
    ///
    /// Scalars are stored as they are met. The attitude, acceleration and
    /// velocity vectors start from zero for each datagram and are committed
    /// once at the end, and only if the datagram carried at least one of
    /// their axes. Unrecognized keys are ignored.
    pub fn apply(&self, state: &DroneState) -> Result<()> {
        let mut attitude: Option<Attitude> = None;
        let mut acceleration: Option<Vector3> = None;
        let mut velocity: Option<Vector3> = None;

        for (key, value) in &self.fields {
            match key.as_str() {
                "bat" => state.set_battery(parse_value(key, value)?),
                "time" => state.set_flight_time(parse_value(key, value)?),
                "temph" => state.set_temperature(parse_value(key, value)?),
                "tof" => state.set_tof(parse_value(key, value)?),
                "h" => state.set_height(parse_value(key, value)?),
                "baro" => state.set_barometer(parse_value(key, value)?),
                "pitch" => attitude.get_or_insert_with(Attitude::default).pitch = parse_value(key, value)?,
                "roll" => attitude.get_or_insert_with(Attitude::default).roll = parse_value(key, value)?,
                "yaw" => attitude.get_or_insert_with(Attitude::default).yaw = parse_value(key, value)?,
                "agx" => acceleration.get_or_insert_with(Vector3::default).x = parse_value(key, value)?,
                "agy" => acceleration.get_or_insert_with(Vector3::default).y = parse_value(key, value)?,
                "agz" => acceleration.get_or_insert_with(Vector3::default).z = parse_value(key, value)?,
                "vgx" => velocity.get_or_insert_with(Vector3::default).x = parse_value(key, value)?,
                "vgy" => velocity.get_or_insert_with(Vector3::default).y = parse_value(key, value)?,
                "vgz" => velocity.get_or_insert_with(Vector3::default).z = parse_value(key, value)?,
                _ => {}
            }
        }

        if let Some(attitude) = attitude {
            state.set_attitude(attitude);
        }
        if let Some(acceleration) = acceleration {
            state.set_acceleration(acceleration);
        }
        if let Some(velocity) = velocity {
            state.set_velocity(velocity);
        }
        state.mark_telemetry(Utc::now());
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| TelloError::Telemetry(format!("bad value for '{}': '{}'", key, value)))
}

/// Background task feeding telemetry datagrams into the drone state
pub struct TelemetryMonitor {
    transport: Arc<dyn Transport>,
    state: Arc<DroneState>,
    slot: LoopSlot,
}

impl TelemetryMonitor {
    pub fn new(transport: Arc<dyn Transport>, state: Arc<DroneState>) -> Self {
        Self {
            transport,
            state,
            slot: LoopSlot::new("telemetry monitor"),
        }
    }

    /// Start the monitor. Returns false if it was already running.
    pub fn start(&self) -> bool {
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        self.slot
            .start(move |stop| run_monitor(transport, state, stop))
    }

    pub async fn stop(&self) {
        self.slot.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }
}

async fn run_monitor(
    transport: Arc<dyn Transport>,
    state: Arc<DroneState>,
    mut stop: watch::Receiver<bool>,
) {
    info!("Telemetry monitor started");

    loop {
        let received = tokio::select! {
            _ = raised(&mut stop) => break,
            received = transport.receive_telemetry() => received,
        };

        let outcome = match received {
            Ok(datagram) => {
                trace!("{}", datagram.trim_end());
                TelemetryRecord::parse(&datagram).apply(&state)
            }
            // A quiet drone is not a failure
            Err(e) if e.is_timeout() => continue,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!("Telemetry monitor failed: {}", e);
            break;
        }
    }

    info!("Telemetry monitor stopped");
}
