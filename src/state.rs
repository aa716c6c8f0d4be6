//! Shared drone state
//!
//! Every field is its own atomic or guarded cell, so the telemetry task, the
//! keep-alive task and the caller can all write without a global lock. A read
//! of a field always sees the latest complete write to that field; no
//! cross-field consistency is promised.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

/// Lifecycle of the link to the drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Pitch, roll and yaw in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Attitude {
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
}

/// Three-axis reading (acceleration or velocity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// `f64` stored as its bit pattern
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug)]
pub struct DroneState {
    connected: AtomicBool,
    airborne: AtomicBool,
    battery: AtomicU32,
    speed: AtomicI32,
    flight_time: AtomicI32,
    height: AtomicI32,
    temperature: AtomicI32,
    barometer: AtomicF64,
    tof: AtomicF64,
    serial_number: RwLock<String>,
    sdk_version: RwLock<String>,
    attitude: RwLock<Attitude>,
    acceleration: RwLock<Vector3>,
    velocity: RwLock<Vector3>,
    last_telemetry: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of every field, for display and serialization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneSnapshot {
    pub connection: ConnectionState,
    pub battery: u32,
    pub speed: i32,
    pub flight_time: i32,
    pub height: i32,
    pub temperature: i32,
    pub barometer: f64,
    pub tof: f64,
    pub serial_number: String,
    pub sdk_version: String,
    pub attitude: Attitude,
    pub acceleration: Vector3,
    pub velocity: Vector3,
    pub last_telemetry: Option<DateTime<Utc>>,
}

impl Default for DroneState {
    fn default() -> Self {
        Self::new()
    }
}

impl DroneState {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            airborne: AtomicBool::new(false),
            battery: AtomicU32::new(0),
            speed: AtomicI32::new(0),
            flight_time: AtomicI32::new(0),
            height: AtomicI32::new(0),
            temperature: AtomicI32::new(0),
            barometer: AtomicF64::default(),
            tof: AtomicF64::default(),
            serial_number: RwLock::new(String::new()),
            sdk_version: RwLock::new(String::new()),
            attitude: RwLock::new(Attitude::default()),
            acceleration: RwLock::new(Vector3::default()),
            velocity: RwLock::new(Vector3::default()),
            last_telemetry: RwLock::new(None),
        }
    }

    /// Zero every telemetry and configuration field, keeping the connection
    /// state as it is
    pub fn reset(&self) {
        self.airborne.store(false, Ordering::Release);
        self.set_battery(0);
        self.set_speed(0);
        self.set_flight_time(0);
        self.set_height(0);
        self.set_temperature(0);
        self.set_barometer(0.0);
        self.set_tof(0.0);
        self.set_serial_number(String::new());
        self.set_sdk_version(String::new());
        self.set_attitude(Attitude::default());
        self.set_acceleration(Vector3::default());
        self.set_velocity(Vector3::default());
        *self.last_telemetry.write() = None;
    }

    pub fn connection(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.connected
            .store(state == ConnectionState::Connected, Ordering::Release);
    }

    /// Set once a takeoff has been attempted, cleared after a confirmed landing
    pub fn is_airborne(&self) -> bool {
        self.airborne.load(Ordering::Acquire)
    }

    pub fn set_airborne(&self, airborne: bool) {
        self.airborne.store(airborne, Ordering::Release);
    }

    /// Battery percentage, 0-100
    pub fn battery(&self) -> u32 {
        self.battery.load(Ordering::Acquire)
    }

    pub fn set_battery(&self, battery: u32) {
        self.battery.store(battery, Ordering::Release);
    }

    /// Speed in cm/s
    pub fn speed(&self) -> i32 {
        self.speed.load(Ordering::Acquire)
    }

    pub fn set_speed(&self, speed: i32) {
        self.speed.store(speed, Ordering::Release);
    }

    /// Flight time in seconds
    pub fn flight_time(&self) -> i32 {
        self.flight_time.load(Ordering::Acquire)
    }

    pub fn set_flight_time(&self, seconds: i32) {
        self.flight_time.store(seconds, Ordering::Release);
    }

    /// Height in cm
    pub fn height(&self) -> i32 {
        self.height.load(Ordering::Acquire)
    }

    pub fn set_height(&self, height: i32) {
        self.height.store(height, Ordering::Release);
    }

    /// Temperature in degrees Celsius
    pub fn temperature(&self) -> i32 {
        self.temperature.load(Ordering::Acquire)
    }

    pub fn set_temperature(&self, temperature: i32) {
        self.temperature.store(temperature, Ordering::Release);
    }

    /// Barometric pressure in mbar
    pub fn barometer(&self) -> f64 {
        self.barometer.load()
    }

    pub fn set_barometer(&self, barometer: f64) {
        self.barometer.store(barometer);
    }

    /// Time-of-flight distance in cm
    pub fn tof(&self) -> f64 {
        self.tof.load()
    }

    pub fn set_tof(&self, tof: f64) {
        self.tof.store(tof);
    }

    pub fn serial_number(&self) -> String {
        self.serial_number.read().clone()
    }

    pub fn set_serial_number(&self, serial_number: impl Into<String>) {
        *self.serial_number.write() = serial_number.into();
    }

    pub fn sdk_version(&self) -> String {
        self.sdk_version.read().clone()
    }

    pub fn set_sdk_version(&self, sdk_version: impl Into<String>) {
        *self.sdk_version.write() = sdk_version.into();
    }

    pub fn attitude(&self) -> Attitude {
        *self.attitude.read()
    }

    pub fn set_attitude(&self, attitude: Attitude) {
        *self.attitude.write() = attitude;
    }

    pub fn acceleration(&self) -> Vector3 {
        *self.acceleration.read()
    }

    pub fn set_acceleration(&self, acceleration: Vector3) {
        *self.acceleration.write() = acceleration;
    }

    pub fn velocity(&self) -> Vector3 {
        *self.velocity.read()
    }

    pub fn set_velocity(&self, velocity: Vector3) {
        *self.velocity.write() = velocity;
    }

    /// When the last telemetry datagram was applied
    pub fn last_telemetry(&self) -> Option<DateTime<Utc>> {
        *self.last_telemetry.read()
    }

    pub fn mark_telemetry(&self, at: DateTime<Utc>) {
        *self.last_telemetry.write() = Some(at);
    }

    pub fn snapshot(&self) -> DroneSnapshot {
        DroneSnapshot {
            connection: self.connection(),
            battery: self.battery(),
            speed: self.speed(),
            flight_time: self.flight_time(),
            height: self.height(),
            temperature: self.temperature(),
            barometer: self.barometer(),
            tof: self.tof(),
            serial_number: self.serial_number(),
            sdk_version: self.sdk_version(),
            attitude: self.attitude(),
            acceleration: self.acceleration(),
            velocity: self.velocity(),
            last_telemetry: self.last_telemetry(),
        }
    }
}
