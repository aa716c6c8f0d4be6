//! Command execution over the command channel
//!
//! Sends a composed command and either waits for and classifies the reply or,
//! for continuous stick input, returns as soon as the datagram is out. Every
//! wait-mode exchange holds the channel lock from send to reply, and drops
//! any reply still queued from an earlier exchange (one that arrived after
//! its deadline, or an `rc` acknowledgement) before sending. The keep-alive
//! probe and the caller therefore never read each other's replies.

use crate::{
    command::{Command, CommandId},
    transport::Transport,
    Result, TelloError,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Whether a command answers with "ok" or with a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Control,
    Read,
}

impl From<CommandId> for CommandKind {
    fn from(id: CommandId) -> Self {
        if id.is_read() {
            CommandKind::Read
        } else {
            CommandKind::Control
        }
    }
}

/// A successfully classified reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Control command acknowledged
    Ok,
    /// Raw value text from a read command
    Value(String),
    /// Read command answered "error"
    NoData,
}

impl Reply {
    /// Value text, empty when the device had nothing to report
    pub fn into_value(self) -> Option<String> {
        match self {
            Reply::Value(value) => Some(value),
            Reply::Ok | Reply::NoData => None,
        }
    }
}

/// Classify one reply. Checks run in a fixed order: unknown command (either
/// spelling), out of range, error, then the "ok" acknowledgement.
pub fn classify_reply(reply: &str, kind: CommandKind) -> Result<Reply> {
    let normalized = reply.trim_start().to_ascii_lowercase();

    if normalized.starts_with("unknown") || normalized.starts_with("unkown") {
        return Err(TelloError::UnknownCommand(reply.trim().to_string()));
    }
    if normalized.starts_with("out of range") {
        return Err(TelloError::InvalidParameter(reply.trim().to_string()));
    }
    if normalized.starts_with("error") {
        return match kind {
            CommandKind::Read => Ok(Reply::NoData),
            CommandKind::Control => Err(TelloError::CommandFailed(reply.trim().to_string())),
        };
    }

    match kind {
        CommandKind::Read => Ok(Reply::Value(reply.to_string())),
        CommandKind::Control if normalized.starts_with("ok") => Ok(Reply::Ok),
        CommandKind::Control => Err(TelloError::CommandFailed(reply.trim().to_string())),
    }
}

/// Sends commands and interprets replies. Never touches drone state and
/// never retries.
pub struct CommandExecutor {
    transport: Arc<dyn Transport>,
    channel: Mutex<()>,
}

impl CommandExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            channel: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send and wait for the classified reply
    pub async fn execute(&self, command: &Command) -> Result<Reply> {
        let text = command.compose();
        let kind = CommandKind::from(command.id());

        let reply = {
            let _exchange = self.channel.lock().await;
            let stale = self.transport.discard_pending().await?;
            if stale > 0 {
                debug!("Dropped {} stale reply datagram(s) before '{}'", stale, text);
            }
            self.transport.send(&text).await?;
            self.transport.receive_command_reply().await?
        };

        debug!("{} => {}", text, reply.trim());
        classify_reply(&reply, kind)
    }

    /// Run a read command, returning `None` when the device answers "error"
    pub async fn execute_read(&self, command: &Command) -> Result<Option<String>> {
        Ok(self.execute(command).await?.into_value())
    }

    /// Send without waiting for any reply
    pub async fn execute_no_wait(&self, command: &Command) -> Result<()> {
        self.transport.send(&command.compose()).await
    }
}
