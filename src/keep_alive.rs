//! Keep-alive probing
//!
//! The firmware lands on its own after roughly 15 seconds without a command.
//! The keep-alive loop sends a battery query every interval (10 seconds by
//! default) so an idle but airborne drone stays up.

use crate::{
    command::{Command, CommandId},
    executor::CommandExecutor,
    worker::{raised, LoopSlot},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub struct KeepAlive {
    executor: Arc<CommandExecutor>,
    interval: Duration,
    slot: LoopSlot,
}

impl KeepAlive {
    pub fn new(executor: Arc<CommandExecutor>, interval: Duration) -> Self {
        Self {
            executor,
            interval,
            slot: LoopSlot::new("keep-alive"),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start probing. Returns false if already running.
    pub fn start(&self) -> bool {
        let executor = Arc::clone(&self.executor);
        let interval = self.interval;
        self.slot
            .start(move |stop| run_keep_alive(executor, interval, stop))
    }

    pub async fn stop(&self) {
        self.slot.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }
}

async fn run_keep_alive(
    executor: Arc<CommandExecutor>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    info!("Keep-alive started, probing every {:?}", interval);
    let probe = Command::new(CommandId::Battery);

    loop {
        tokio::select! {
            _ = raised(&mut stop) => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // Only the exchange matters; the value is discarded
        match executor.execute_read(&probe).await {
            Ok(_) => debug!("Keep-alive probe answered"),
            Err(e) => warn!("Keep-alive probe failed: {}", e),
        }
    }

    info!("Keep-alive stopped");
}
