//! UDP transport for the Tello text protocol
//!
//! Two channels: a command socket connected to the drone (request/reply,
//! bounded by the configured reply deadline) and a passive telemetry socket
//! the drone pushes status datagrams to (no short deadline).

use crate::{config::Config, worker::raised, Result, TelloError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Largest datagram the drone sends
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Datagram exchange with the drone
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open both channels. Fails with `Connection` on any setup problem.
    ///
    /// UDP has no handshake: for `UdpTransport` success means the sockets
    /// are bound and a route to the drone exists, not that the drone
    /// answered. Send `command` to find out.
    async fn connect(&self) -> Result<()>;

    /// Write one datagram on the command channel
    async fn send(&self, text: &str) -> Result<()>;

    /// Wait for one command reply, failing with `Timeout` after the deadline
    async fn receive_command_reply(&self) -> Result<String>;

    /// Drop command replies already waiting to be read, such as a reply
    /// that arrived after its deadline. Returns how many were dropped.
    async fn discard_pending(&self) -> Result<usize>;

    /// Wait for one telemetry datagram, however long that takes
    async fn receive_telemetry(&self) -> Result<String>;

    /// Close both channels. Safe to call repeatedly.
    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

#[derive(Default)]
struct Sockets {
    command: Option<Arc<UdpSocket>>,
    telemetry: Option<Arc<UdpSocket>>,
}

/// Real transport over two tokio UDP sockets
pub struct UdpTransport {
    drone_addr: String,
    command_bind: String,
    telemetry_bind: String,
    reply_timeout: Duration,
    sockets: RwLock<Sockets>,
    /// Flipped to true on disconnect so pending receives return promptly
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let drone = &config.drone;
        let (closed, _) = watch::channel(true);
        Ok(Self {
            drone_addr: format!("{}:{}", drone.host, drone.ports.command),
            command_bind: format!("{}:{}", drone.bind_host, drone.ports.local_command),
            telemetry_bind: format!("{}:{}", drone.bind_host, drone.ports.telemetry),
            reply_timeout: config.connection.reply_timeout(),
            sockets: RwLock::new(Sockets::default()),
            closed,
        })
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    fn command_socket(&self) -> Result<Arc<UdpSocket>> {
        self.sockets
            .read()
            .command
            .clone()
            .ok_or_else(|| TelloError::Connection("not connected".to_string()))
    }

    fn telemetry_socket(&self) -> Result<Arc<UdpSocket>> {
        self.sockets
            .read()
            .telemetry
            .clone()
            .ok_or_else(|| TelloError::Connection("not connected".to_string()))
    }

    async fn open_command_socket(&self) -> Result<UdpSocket> {
        let socket = UdpSocket::bind(&self.command_bind).await.map_err(|e| {
            TelloError::Connection(format!("Failed to bind command socket {}: {}", self.command_bind, e))
        })?;

        // Connecting a UDP socket performs the route lookup, so an unreachable
        // drone network fails here rather than on the first send.
        socket.connect(&self.drone_addr).await.map_err(|e| {
            TelloError::Connection(format!("Drone at {} not reachable: {}", self.drone_addr, e))
        })?;

        let local: SocketAddr = socket
            .local_addr()
            .map_err(|e| TelloError::Connection(format!("Command socket has no local address: {}", e)))?;
        debug!("Command socket {} -> {}", local, self.drone_addr);
        Ok(socket)
    }

    async fn open_telemetry_socket(&self) -> Result<UdpSocket> {
        UdpSocket::bind(&self.telemetry_bind).await.map_err(|e| {
            TelloError::Connection(format!(
                "Failed to bind telemetry socket {}: {}",
                self.telemetry_bind, e
            ))
        })
    }

    async fn receive_on(&self, socket: &UdpSocket, deadline: Option<Duration>) -> Result<String> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(TelloError::Connection("transport closed".to_string()));
        }

        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        let receive = async {
            match deadline {
                Some(deadline) => match tokio::time::timeout(deadline, socket.recv(&mut buffer)).await {
                    Ok(received) => received.map_err(TelloError::from),
                    Err(_) => Err(TelloError::Timeout(deadline)),
                },
                None => socket.recv(&mut buffer).await.map_err(TelloError::from),
            }
        };

        let bytes_read = tokio::select! {
            result = receive => result?,
            _ = raised(&mut closed) => {
                return Err(TelloError::Connection("transport closed".to_string()));
            }
        };

        Ok(String::from_utf8_lossy(&buffer[..bytes_read]).into_owned())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self) -> Result<()> {
        debug!("Opening sockets for {}", self.drone_addr);

        // Release any previous sockets so the telemetry port can be rebound
        self.closed.send_replace(true);
        *self.sockets.write() = Sockets::default();

        let command = self.open_command_socket().await?;
        let telemetry = self.open_telemetry_socket().await?;

        {
            let mut sockets = self.sockets.write();
            sockets.command = Some(Arc::new(command));
            sockets.telemetry = Some(Arc::new(telemetry));
        }
        self.closed.send_replace(false);

        info!("Connected, telemetry on {}", self.telemetry_bind);
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        let socket = self.command_socket()?;
        debug!("-> {}", text);
        socket
            .send(text.as_bytes())
            .await
            .map_err(|e| TelloError::Connection(format!("Failed to send '{}': {}", text, e)))?;
        Ok(())
    }

    async fn receive_command_reply(&self) -> Result<String> {
        let socket = self.command_socket()?;
        let reply = self.receive_on(&socket, Some(self.reply_timeout)).await?;
        debug!("<- {}", reply.trim_end());
        Ok(reply)
    }

    async fn discard_pending(&self) -> Result<usize> {
        let socket = self.command_socket()?;
        let mut buffer = [0u8; RECEIVE_BUFFER_SIZE];
        let mut discarded = 0;
        loop {
            match socket.try_recv(&mut buffer) {
                Ok(n) => {
                    debug!("<- (stale) {}", String::from_utf8_lossy(&buffer[..n]).trim_end());
                    discarded += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) => return Err(TelloError::Io(e)),
            }
        }
    }

    async fn receive_telemetry(&self) -> Result<String> {
        let socket = self.telemetry_socket()?;
        let datagram = self.receive_on(&socket, None).await?;
        trace!("telemetry: {}", datagram.trim_end());
        Ok(datagram)
    }

    async fn disconnect(&self) -> Result<()> {
        self.closed.send_replace(true);
        let mut sockets = self.sockets.write();
        let had_command = sockets.command.take().is_some();
        let had_telemetry = sockets.telemetry.take().is_some();
        if had_command || had_telemetry {
            info!("Disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sockets.read().command.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config(drone_port: u16) -> Config {
        let mut config = Config::default();
        config.drone.host = "127.0.0.1".to_string();
        config.drone.bind_host = "127.0.0.1".to_string();
        config.drone.ports.command = drone_port;
        config.drone.ports.telemetry = 0;
        config.connection.timeout = 0.2;
        config
    }

    #[tokio::test]
    async fn test_not_connected_errors() {
        let transport = UdpTransport::new(&Config::default()).unwrap();
        assert!(!transport.is_connected());
        assert!(transport.send("command").await.unwrap_err().is_connection());
        assert!(transport.receive_command_reply().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_exchange_with_loopback_drone() {
        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(&loopback_config(drone.local_addr().unwrap().port())).unwrap();
        transport.connect().await.unwrap();

        transport.send("battery?").await.unwrap();
        let mut buffer = [0u8; 64];
        let (n, client) = drone.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..n], b"battery?");

        drone.send_to(b"87\r\n", client).await.unwrap();
        assert_eq!(transport.receive_command_reply().await.unwrap(), "87\r\n");
    }

    #[tokio::test]
    async fn test_reply_timeout() {
        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(&loopback_config(drone.local_addr().unwrap().port())).unwrap();
        transport.connect().await.unwrap();

        let err = transport.receive_command_reply().await.unwrap_err();
        assert!(err.is_timeout());
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_discard_pending_drops_late_replies() {
        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::new(&loopback_config(drone.local_addr().unwrap().port())).unwrap();
        transport.connect().await.unwrap();

        transport.send("takeoff").await.unwrap();
        let mut buffer = [0u8; 64];
        let (_, client) = drone.recv_from(&mut buffer).await.unwrap();
        assert!(transport.receive_command_reply().await.unwrap_err().is_timeout());

        drone.send_to(b"ok", client).await.unwrap();
        drone.send_to(b"ok", client).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.discard_pending().await.unwrap(), 2);
        assert_eq!(transport.discard_pending().await.unwrap(), 0);
        assert!(transport.receive_command_reply().await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.connection.timeout = f64::NAN;
        assert!(matches!(UdpTransport::new(&config), Err(TelloError::Config(_))));
    }

    #[tokio::test]
    async fn test_disconnect_unblocks_telemetry_and_is_idempotent() {
        let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = Arc::new(
            UdpTransport::new(&loopback_config(drone.local_addr().unwrap().port())).unwrap(),
        );
        transport.connect().await.unwrap();

        let pending = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.receive_telemetry().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();

        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_connection());
        assert!(!transport.is_connected());
    }
}
