//! Drone controller
//!
//! Public control surface. Each operation maps to exactly one command; range
//! checks are left to the drone, which answers "out of range" for bad
//! arguments. Queries parse the reply, store the value in the shared
//! [`DroneState`] and return it.
//!
//! Construct one controller and share it by reference (or `Arc`) with
//! whatever needs to fly the drone.

use crate::{
    command::{Command, CommandId, FlipDirection},
    config::Config,
    executor::{CommandExecutor, Reply},
    keep_alive::KeepAlive,
    reply::ReplyGrammar,
    state::{Attitude, ConnectionState, DroneSnapshot, DroneState, Vector3},
    telemetry::TelemetryMonitor,
    transport::{Transport, UdpTransport},
    Result, TelloError,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct DroneController {
    config: Config,
    transport: Arc<dyn Transport>,
    executor: Arc<CommandExecutor>,
    state: Arc<DroneState>,
    telemetry: TelemetryMonitor,
    keep_alive: KeepAlive,
    grammar: ReplyGrammar,
}

impl DroneController {
    /// Controller talking to the drone over UDP
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(UdpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Controller loading its configuration from a YAML file
    pub fn new_with_config(config_path: &str) -> Result<Self> {
        Self::new(Config::load_from_path(config_path)?)
    }

    /// Controller over any transport, e.g. [`crate::MockTransport`]
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(DroneState::new());
        let executor = Arc::new(CommandExecutor::new(Arc::clone(&transport)));
        let telemetry = TelemetryMonitor::new(Arc::clone(&transport), Arc::clone(&state));
        let keep_alive = KeepAlive::new(Arc::clone(&executor), config.keep_alive.interval());

        Ok(Self {
            config,
            transport,
            executor,
            state,
            telemetry,
            keep_alive,
            grammar: ReplyGrammar::new()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &Arc<DroneState> {
        &self.state
    }

    pub fn snapshot(&self) -> DroneSnapshot {
        self.state.snapshot()
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection()
    }

    /// Open the command and telemetry channels and start a fresh drone
    /// state. Reconnecting stops the background loops first; restart them
    /// afterwards if needed. On failure the controller is left disconnected.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to drone at {}", self.config.drone.host);
        self.telemetry.stop().await;
        self.keep_alive.stop().await;

        if let Err(e) = self.transport.connect().await {
            self.state.set_connection(ConnectionState::Disconnected);
            return Err(e);
        }

        self.state.reset();
        self.state.set_connection(ConnectionState::Connected);
        info!("Drone connected");
        Ok(())
    }

    /// Land if a flight may be in progress, stop the background loops and
    /// close the transport. A failed landing is logged, never returned.
    ///
    /// "In progress" means a takeoff went through this controller and was
    /// not followed by a confirmed land or emergency stop. A takeoff sent
    /// by another client is not tracked.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from drone");

        if self.state.is_airborne() {
            if let Err(e) = self.land().await {
                warn!("Landing before disconnect failed: {}", e);
            }
        }

        self.telemetry.stop().await;
        self.keep_alive.stop().await;
        self.transport.disconnect().await?;
        self.state.set_connection(ConnectionState::Disconnected);

        info!("Drone disconnected");
        Ok(())
    }

    /// Run an arbitrary command, waiting for the reply unless it is `rc`
    pub async fn execute(&self, command: &Command) -> Result<Reply> {
        match command.id() {
            CommandId::RemoteControl => {
                self.executor.execute_no_wait(command).await?;
                Ok(Reply::Ok)
            }
            CommandId::TakeOff => self.take_off().await.map(|_| Reply::Ok),
            CommandId::Land => self.land().await.map(|_| Reply::Ok),
            CommandId::Emergency => self.emergency().await.map(|_| Reply::Ok),
            _ => self.executor.execute(command).await,
        }
    }

    async fn control(&self, id: CommandId) -> Result<()> {
        self.executor.execute(&Command::new(id)).await?;
        Ok(())
    }

    async fn control_with(&self, id: CommandId, params: &[i32]) -> Result<()> {
        let command = Command::with_params(id, params.iter().copied());
        self.executor.execute(&command).await?;
        Ok(())
    }

    async fn query(&self, id: CommandId) -> Result<Option<String>> {
        self.executor.execute_read(&Command::new(id)).await
    }

    // Flight control

    /// Enter SDK command mode; required before any other command
    pub async fn enter_command_mode(&self) -> Result<()> {
        self.control(CommandId::CommandMode).await
    }

    pub async fn take_off(&self) -> Result<()> {
        // The drone may lift off even when the reply is lost
        self.state.set_airborne(true);
        self.control(CommandId::TakeOff).await
    }

    pub async fn land(&self) -> Result<()> {
        self.control(CommandId::Land).await?;
        self.state.set_airborne(false);
        Ok(())
    }

    /// Stop all motors immediately
    pub async fn emergency(&self) -> Result<()> {
        self.control(CommandId::Emergency).await?;
        self.state.set_airborne(false);
        Ok(())
    }

    /// Hover in place
    pub async fn stop(&self) -> Result<()> {
        self.control(CommandId::Stop).await
    }

    pub async fn stream_on(&self) -> Result<()> {
        self.control(CommandId::StreamOn).await
    }

    pub async fn stream_off(&self) -> Result<()> {
        self.control(CommandId::StreamOff).await
    }

    /// Distances are in cm, 20-500
    pub async fn up(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Up, &[distance]).await
    }

    pub async fn down(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Down, &[distance]).await
    }

    pub async fn left(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Left, &[distance]).await
    }

    pub async fn right(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Right, &[distance]).await
    }

    pub async fn forward(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Forward, &[distance]).await
    }

    pub async fn backward(&self, distance: i32) -> Result<()> {
        self.control_with(CommandId::Back, &[distance]).await
    }

    /// Angles are in degrees, 1-3600
    pub async fn rotate_clockwise(&self, angle: i32) -> Result<()> {
        self.control_with(CommandId::Clockwise, &[angle]).await
    }

    pub async fn rotate_counter_clockwise(&self, angle: i32) -> Result<()> {
        self.control_with(CommandId::CounterClockwise, &[angle]).await
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        let command = Command::with_params(CommandId::Flip, [direction]);
        self.executor.execute(&command).await?;
        Ok(())
    }

    /// Fly to an offset (cm, -500..500 each) at `speed` cm/s (10-100). The
    /// offsets may not all lie within -20..20.
    pub async fn go_to(&self, x: i32, y: i32, z: i32, speed: i32) -> Result<()> {
        self.control_with(CommandId::Go, &[x, y, z, speed]).await
    }

    /// Fly an arc through two waypoints at `speed` cm/s (10-60). The drone
    /// rejects arcs whose radius is outside 0.5-10 m.
    pub async fn curve(&self, first: [i32; 3], second: [i32; 3], speed: i32) -> Result<()> {
        let [x1, y1, z1] = first;
        let [x2, y2, z2] = second;
        self.control_with(CommandId::Curve, &[x1, y1, z1, x2, y2, z2, speed])
            .await
    }

    /// Set cruise speed in cm/s, 1-100
    pub async fn set_speed(&self, speed: i32) -> Result<()> {
        self.control_with(CommandId::SetSpeed, &[speed]).await
    }

    /// Analog stick input, each channel -100..100. Sent without waiting for a
    /// reply so a control loop can call it every tick.
    pub async fn fly_rc(&self, left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> Result<()> {
        let command = Command::with_params(
            CommandId::RemoteControl,
            [left_right, forward_back, up_down, yaw],
        );
        self.executor.execute_no_wait(&command).await
    }

    // Queries. A reply of "error" yields zero or empty and leaves the state
    // untouched.

    /// Battery percentage
    pub async fn battery(&self) -> Result<u32> {
        let Some(reply) = self.query(CommandId::Battery).await? else {
            return Ok(0);
        };
        let battery = self.grammar.plain(&reply)?;
        self.state.set_battery(battery);
        Ok(battery)
    }

    /// Current speed in cm/s
    pub async fn speed(&self) -> Result<i32> {
        let Some(reply) = self.query(CommandId::Speed).await? else {
            return Ok(0);
        };
        let speed = self.grammar.plain::<f64>(&reply)? as i32;
        self.state.set_speed(speed);
        Ok(speed)
    }

    /// Motor-on time in seconds
    pub async fn flight_time(&self) -> Result<i32> {
        let Some(reply) = self.query(CommandId::FlightTime).await? else {
            return Ok(0);
        };
        let seconds = self.grammar.numeric(&reply)?;
        self.state.set_flight_time(seconds);
        Ok(seconds)
    }

    /// Height in cm; the drone reports decimetres
    pub async fn height(&self) -> Result<i32> {
        let Some(reply) = self.query(CommandId::Height).await? else {
            return Ok(0);
        };
        let height = self
            .grammar
            .numeric::<i32>(&reply)?
            .checked_mul(10)
            .ok_or_else(|| TelloError::Parse(format!("height out of range: '{}'", reply.trim())))?;
        self.state.set_height(height);
        Ok(height)
    }

    /// Temperature in degrees Celsius
    pub async fn temperature(&self) -> Result<i32> {
        let Some(reply) = self.query(CommandId::Temperature).await? else {
            return Ok(0);
        };
        let temperature = self.grammar.temperature(&reply)?;
        self.state.set_temperature(temperature);
        Ok(temperature)
    }

    /// Barometric pressure
    pub async fn barometer(&self) -> Result<f64> {
        let Some(reply) = self.query(CommandId::Barometer).await? else {
            return Ok(0.0);
        };
        let barometer = self.grammar.plain(&reply)?;
        self.state.set_barometer(barometer);
        Ok(barometer)
    }

    /// Rangefinder distance in cm; the drone reports millimetres
    pub async fn tof(&self) -> Result<f64> {
        let Some(reply) = self.query(CommandId::Tof).await? else {
            return Ok(0.0);
        };
        let tof = self.grammar.numeric::<f64>(&reply)? / 10.0;
        self.state.set_tof(tof);
        Ok(tof)
    }

    pub async fn attitude(&self) -> Result<Attitude> {
        let Some(reply) = self.query(CommandId::Attitude).await? else {
            return Ok(Attitude::default());
        };
        let [pitch, roll, yaw] = self.grammar.axes(&reply)?;
        let attitude = Attitude { pitch, roll, yaw };
        self.state.set_attitude(attitude);
        Ok(attitude)
    }

    pub async fn acceleration(&self) -> Result<Vector3> {
        let Some(reply) = self.query(CommandId::Acceleration).await? else {
            return Ok(Vector3::default());
        };
        let [x, y, z] = self.grammar.axes(&reply)?;
        let acceleration = Vector3 { x, y, z };
        self.state.set_acceleration(acceleration);
        Ok(acceleration)
    }

    pub async fn serial_number(&self) -> Result<String> {
        let Some(reply) = self.query(CommandId::SerialNumber).await? else {
            return Ok(String::new());
        };
        let serial_number = reply.trim().to_string();
        self.state.set_serial_number(serial_number.clone());
        Ok(serial_number)
    }

    pub async fn sdk_version(&self) -> Result<String> {
        let Some(reply) = self.query(CommandId::Sdk).await? else {
            return Ok(String::new());
        };
        let sdk_version = reply.trim().to_string();
        self.state.set_sdk_version(sdk_version.clone());
        Ok(sdk_version)
    }

    // Background loops

    /// Start feeding telemetry into the drone state. No-op when running.
    pub fn start_telemetry_monitor(&self) -> bool {
        self.telemetry.start()
    }

    pub async fn stop_telemetry_monitor(&self) {
        self.telemetry.stop().await;
    }

    /// False once the monitor was stopped or ended on an error
    pub fn is_telemetry_running(&self) -> bool {
        self.telemetry.is_running()
    }

    /// Start the periodic keep-alive probe. No-op when running.
    pub fn start_keep_alive(&self) -> bool {
        self.keep_alive.start()
    }

    pub async fn stop_keep_alive(&self) {
        self.keep_alive.stop().await;
    }

    pub fn is_keep_alive_running(&self) -> bool {
        self.keep_alive.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    async fn connected() -> (DroneController, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        let controller = DroneController::with_transport(Config::default(), mock.clone()).unwrap();
        controller.connect().await.unwrap();
        (controller, mock)
    }

    #[tokio::test]
    async fn test_motion_wire_text() {
        let (controller, mock) = connected().await;
        controller.up(20).await.unwrap();
        controller.rotate_counter_clockwise(90).await.unwrap();
        controller.flip(FlipDirection::Right).await.unwrap();
        controller.go_to(100, 0, -30, 50).await.unwrap();
        controller.curve([20, 20, 0], [40, 60, 0], 30).await.unwrap();
        controller.set_speed(40).await.unwrap();
        controller.fly_rc(-10, 20, 0, 100).await.unwrap();
        controller.stop().await.unwrap();

        assert_eq!(
            mock.sent(),
            vec![
                "up 20",
                "ccw 90",
                "flip r",
                "go 100 0 -30 50",
                "curve 20 20 0 40 60 0 30",
                "speed 40",
                "rc -10 20 0 100",
                "stop",
            ]
        );
    }

    #[tokio::test]
    async fn test_query_grammars_update_state() {
        let (controller, mock) = connected().await;
        mock.set_reply(CommandId::Speed, "10.0");
        mock.set_reply(CommandId::FlightTime, "12s");
        mock.set_reply(CommandId::Height, "10dm");
        mock.set_reply(CommandId::Temperature, "83~85C");
        mock.set_reply(CommandId::Barometer, "-56.84");
        mock.set_reply(CommandId::Tof, "100mm");
        mock.set_reply(CommandId::Attitude, "pitch:1;roll:-2;yaw:45;");
        mock.set_reply(CommandId::Acceleration, "agx:-1.00;agy:-12.00;agz:-998.00;");
        mock.set_reply(CommandId::SerialNumber, "0TQDG2KEDB4F5C\r\n");
        mock.set_reply(CommandId::Sdk, "20");

        assert_eq!(controller.speed().await.unwrap(), 10);
        assert_eq!(controller.flight_time().await.unwrap(), 12);
        assert_eq!(controller.height().await.unwrap(), 100);
        assert_eq!(controller.temperature().await.unwrap(), 83);
        assert_eq!(controller.barometer().await.unwrap(), -56.84);
        assert_eq!(controller.tof().await.unwrap(), 10.0);
        assert_eq!(controller.attitude().await.unwrap(), Attitude { pitch: 1, roll: -2, yaw: 45 });
        assert_eq!(
            controller.acceleration().await.unwrap(),
            Vector3 { x: -1.0, y: -12.0, z: -998.0 }
        );
        assert_eq!(controller.serial_number().await.unwrap(), "0TQDG2KEDB4F5C");
        assert_eq!(controller.sdk_version().await.unwrap(), "20");

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.height, 100);
        assert_eq!(snapshot.temperature, 83);
        assert_eq!(snapshot.tof, 10.0);
        assert_eq!(snapshot.serial_number, "0TQDG2KEDB4F5C");
    }

    #[tokio::test]
    async fn test_query_error_reply_is_empty() {
        let (controller, mock) = connected().await;
        controller.state().set_battery(55);
        mock.set_reply(CommandId::Battery, "error");
        mock.set_reply(CommandId::SerialNumber, "error");

        assert_eq!(controller.battery().await.unwrap(), 0);
        assert_eq!(controller.serial_number().await.unwrap(), "");
        assert_eq!(controller.state().battery(), 55);
    }

    #[tokio::test]
    async fn test_unparseable_reply() {
        let (controller, mock) = connected().await;
        mock.set_reply(CommandId::Battery, "lots");
        assert!(matches!(controller.battery().await, Err(TelloError::Parse(_))));
    }

    #[tokio::test]
    async fn test_height_overflow_is_a_parse_error() {
        let (controller, mock) = connected().await;
        controller.state().set_height(50);
        mock.set_reply(CommandId::Height, "300000000dm");

        assert!(matches!(controller.height().await, Err(TelloError::Parse(_))));
        assert_eq!(controller.state().height(), 50);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.keep_alive.interval = -1.0;
        let result = DroneController::with_transport(config, Arc::new(MockTransport::new()));
        assert!(matches!(result, Err(TelloError::Config(_))));

        let mut config = Config::default();
        config.connection.timeout = f64::NAN;
        assert!(matches!(DroneController::new(config), Err(TelloError::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_reconnect_leaves_disconnected() {
        let (controller, mock) = connected().await;
        assert!(controller.start_telemetry_monitor());
        assert!(controller.start_keep_alive());
        controller.state().set_battery(70);

        mock.refuse_connect();
        assert!(controller.connect().await.unwrap_err().is_connection());

        assert_eq!(controller.connection(), ConnectionState::Disconnected);
        assert!(!mock.is_connected());
        assert!(!controller.is_telemetry_running());
        assert!(!controller.is_keep_alive_running());
        // The last known values survive a failed attempt
        assert_eq!(controller.state().battery(), 70);
    }

    #[tokio::test]
    async fn test_reconnect_stops_loops_and_resets_state() {
        let (controller, _mock) = connected().await;
        assert!(controller.start_telemetry_monitor());
        controller.state().set_battery(70);

        controller.connect().await.unwrap();
        assert_eq!(controller.connection(), ConnectionState::Connected);
        assert!(!controller.is_telemetry_running());
        assert_eq!(controller.state().battery(), 0);
        assert!(controller.start_telemetry_monitor());
    }

    #[tokio::test]
    async fn test_unknown_command_surfaces() {
        let (controller, mock) = connected().await;
        mock.set_reply(CommandId::StreamOn, "unkown command: streamon");
        assert!(matches!(
            controller.stream_on().await,
            Err(TelloError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_operation_while_disconnected() {
        let mock = Arc::new(MockTransport::new());
        let controller = DroneController::with_transport(Config::default(), mock).unwrap();
        assert_eq!(controller.connection(), ConnectionState::Disconnected);
        assert!(controller.take_off().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let mock = Arc::new(MockTransport::new());
        mock.refuse_connect();
        let controller = DroneController::with_transport(Config::default(), mock).unwrap();
        assert!(controller.connect().await.unwrap_err().is_connection());
        assert_eq!(controller.connection(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_transient_errors_keep_connection() {
        let (controller, mock) = connected().await;
        mock.set_silent(CommandId::Land);
        assert!(controller.land().await.unwrap_err().is_timeout());
        assert_eq!(controller.connection(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_execute_routes_rc_without_wait() {
        let (controller, mock) = connected().await;
        let rc: Command = "rc 0 0 10 0".parse().unwrap();
        assert_eq!(controller.execute(&rc).await.unwrap(), Reply::Ok);
        controller.execute(&"takeoff".parse().unwrap()).await.unwrap();
        assert!(controller.state().is_airborne());
        assert_eq!(mock.sent(), vec!["rc 0 0 10 0", "takeoff"]);
    }

    #[tokio::test]
    async fn test_disconnect_stops_loops() {
        let (controller, _mock) = connected().await;
        assert!(controller.start_telemetry_monitor());
        assert!(controller.start_keep_alive());

        controller.disconnect().await.unwrap();
        assert!(!controller.is_telemetry_running());
        assert!(!controller.is_keep_alive_running());
        assert_eq!(controller.connection(), ConnectionState::Disconnected);
    }
}
