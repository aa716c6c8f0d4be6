//! In-process transport for dry runs and tests
//!
//! Answers every wait-mode command from a reply table keyed by command
//! identifier, records what was sent and when, and replays telemetry
//! datagrams pushed by the caller.

use crate::{command::CommandId, transport::Transport, worker::raised, Result, TelloError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

/// One datagram written on the command channel
#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub at: Instant,
    pub text: String,
}

pub struct MockTransport {
    default_reply: String,
    replies: Mutex<HashMap<String, String>>,
    silent: Mutex<HashSet<String>>,
    late: Mutex<HashMap<String, String>>,
    pending: Mutex<VecDeque<String>>,
    /// Late replies that land once the current wait has timed out
    overdue: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<SentDatagram>>,
    telemetry_tx: mpsc::UnboundedSender<String>,
    telemetry_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    closed: watch::Sender<bool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A drone that answers "ok" to everything except `rc`, which the real
    /// firmware never acknowledges
    pub fn new() -> Self {
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(true);
        let silent = HashSet::from([CommandId::RemoteControl.as_str().to_string()]);
        Self {
            default_reply: "ok".to_string(),
            replies: Mutex::new(HashMap::new()),
            silent: Mutex::new(silent),
            late: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            overdue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            telemetry_tx,
            telemetry_rx: tokio::sync::Mutex::new(telemetry_rx),
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            closed,
        }
    }

    /// Answer every `id` command with `reply` from now on
    pub fn set_reply(&self, id: CommandId, reply: impl Into<String>) {
        self.replies.lock().insert(id.as_str().to_string(), reply.into());
    }

    /// Never answer `id` commands
    pub fn set_silent(&self, id: CommandId) {
        self.silent.lock().insert(id.as_str().to_string());
    }

    /// Answer `id` commands with nothing now and `reply` on the next
    /// exchange, as a drone replying after the deadline would
    pub fn set_late_reply(&self, id: CommandId, reply: impl Into<String>) {
        self.late.lock().insert(id.as_str().to_string(), reply.into());
    }

    /// Make `connect()` fail as if the drone network were absent
    pub fn refuse_connect(&self) {
        self.refuse_connect.store(true, Ordering::Relaxed);
    }

    /// Queue a telemetry datagram for the next `receive_telemetry()`
    pub fn push_telemetry(&self, datagram: impl Into<String>) {
        // The receiver lives as long as self, so this cannot fail
        let _ = self.telemetry_tx.send(datagram.into());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().iter().map(|d| d.text.clone()).collect()
    }

    pub fn sent_datagrams(&self) -> Vec<SentDatagram> {
        self.sent.lock().clone()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TelloError::Connection("not connected".to_string()))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        // Like the UDP transport, a reconnect releases the old link first
        self.connected.store(false, Ordering::Release);
        self.closed.send_replace(true);
        self.pending.lock().clear();
        self.overdue.lock().clear();

        if self.refuse_connect.load(Ordering::Relaxed) {
            return Err(TelloError::Connection("mock drone refused connection".to_string()));
        }
        self.connected.store(true, Ordering::Release);
        self.closed.send_replace(false);
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.ensure_connected()?;
        debug!("mock -> {}", text);
        self.sent.lock().push(SentDatagram {
            at: Instant::now(),
            text: text.to_string(),
        });

        let id = text.split_whitespace().next().unwrap_or_default();
        if self.silent.lock().contains(id) {
            return Ok(());
        }
        if let Some(reply) = self.late.lock().remove(id) {
            self.overdue.lock().push_back(reply);
            return Ok(());
        }
        let reply = self
            .replies
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone());
        self.pending.lock().push_back(reply);
        Ok(())
    }

    async fn receive_command_reply(&self) -> Result<String> {
        self.ensure_connected()?;
        if let Some(reply) = self.pending.lock().pop_front() {
            return Ok(reply);
        }
        let mut overdue = self.overdue.lock();
        self.pending.lock().extend(overdue.drain(..));
        Err(TelloError::Timeout(Duration::ZERO))
    }

    async fn discard_pending(&self) -> Result<usize> {
        self.ensure_connected()?;
        let mut pending = self.pending.lock();
        let discarded = pending.len();
        pending.clear();
        Ok(discarded)
    }

    async fn receive_telemetry(&self) -> Result<String> {
        self.ensure_connected()?;
        let mut closed = self.closed.subscribe();
        let mut telemetry = self.telemetry_rx.lock().await;
        tokio::select! {
            datagram = telemetry.recv() => datagram
                .ok_or_else(|| TelloError::Connection("telemetry channel closed".to_string())),
            _ = raised(&mut closed) => {
                Err(TelloError::Connection("transport closed".to_string()))
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        self.closed.send_replace(true);
        self.pending.lock().clear();
        self.overdue.lock().clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_by_identifier() {
        let mock = MockTransport::new();
        mock.set_reply(CommandId::Battery, "87");
        mock.connect().await.unwrap();

        mock.send("battery?").await.unwrap();
        assert_eq!(mock.receive_command_reply().await.unwrap(), "87");
        mock.send("forward 100").await.unwrap();
        assert_eq!(mock.receive_command_reply().await.unwrap(), "ok");
        mock.send("rc 0 0 0 0").await.unwrap();
        assert!(mock.receive_command_reply().await.unwrap_err().is_timeout());

        assert_eq!(mock.sent(), vec!["battery?", "forward 100", "rc 0 0 0 0"]);
    }

    #[tokio::test]
    async fn test_late_reply_lands_after_timeout() {
        let mock = MockTransport::new();
        mock.set_late_reply(CommandId::TakeOff, "ok");
        mock.connect().await.unwrap();

        mock.send("takeoff").await.unwrap();
        assert!(mock.receive_command_reply().await.unwrap_err().is_timeout());
        assert_eq!(mock.discard_pending().await.unwrap(), 1);

        mock.send("takeoff").await.unwrap();
        assert_eq!(mock.receive_command_reply().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let mock = MockTransport::new();
        assert!(mock.send("command").await.unwrap_err().is_connection());

        mock.refuse_connect();
        assert!(mock.connect().await.unwrap_err().is_connection());
        assert!(!mock.is_connected());
    }
}
