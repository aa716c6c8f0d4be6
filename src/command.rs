//! Tello command vocabulary and wire-text composition
//!
//! A command is one identifier from the SDK's closed vocabulary plus an
//! optional ordered parameter list. Its wire text is the identifier followed
//! by each parameter, single-space joined.

use crate::{Result, TelloError};
use std::fmt;
use std::str::FromStr;

/// Every instruction the drone understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    CommandMode,
    TakeOff,
    Land,
    StreamOn,
    StreamOff,
    Emergency,
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
    Clockwise,
    CounterClockwise,
    Flip,
    Go,
    Curve,
    Stop,
    SetSpeed,
    RemoteControl,
    Speed,
    Battery,
    FlightTime,
    Sdk,
    SerialNumber,
    Barometer,
    Tof,
    Temperature,
    Attitude,
    Height,
    Acceleration,
}

impl CommandId {
    pub const ALL: [CommandId; 31] = [
        CommandId::CommandMode,
        CommandId::TakeOff,
        CommandId::Land,
        CommandId::StreamOn,
        CommandId::StreamOff,
        CommandId::Emergency,
        CommandId::Up,
        CommandId::Down,
        CommandId::Left,
        CommandId::Right,
        CommandId::Forward,
        CommandId::Back,
        CommandId::Clockwise,
        CommandId::CounterClockwise,
        CommandId::Flip,
        CommandId::Go,
        CommandId::Curve,
        CommandId::Stop,
        CommandId::SetSpeed,
        CommandId::RemoteControl,
        CommandId::Speed,
        CommandId::Battery,
        CommandId::FlightTime,
        CommandId::Sdk,
        CommandId::SerialNumber,
        CommandId::Barometer,
        CommandId::Tof,
        CommandId::Temperature,
        CommandId::Attitude,
        CommandId::Height,
        CommandId::Acceleration,
    ];

    /// Identifier as it appears on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            CommandId::CommandMode => "command",
            CommandId::TakeOff => "takeoff",
            CommandId::Land => "land",
            CommandId::StreamOn => "streamon",
            CommandId::StreamOff => "streamoff",
            CommandId::Emergency => "emergency",
            CommandId::Up => "up",
            CommandId::Down => "down",
            CommandId::Left => "left",
            CommandId::Right => "right",
            CommandId::Forward => "forward",
            CommandId::Back => "back",
            CommandId::Clockwise => "cw",
            CommandId::CounterClockwise => "ccw",
            CommandId::Flip => "flip",
            CommandId::Go => "go",
            CommandId::Curve => "curve",
            CommandId::Stop => "stop",
            CommandId::SetSpeed => "speed",
            CommandId::RemoteControl => "rc",
            CommandId::Speed => "speed?",
            CommandId::Battery => "battery?",
            CommandId::FlightTime => "time?",
            CommandId::Sdk => "sdk?",
            CommandId::SerialNumber => "sn?",
            CommandId::Barometer => "baro?",
            CommandId::Tof => "tof?",
            CommandId::Temperature => "temp?",
            CommandId::Attitude => "attitude?",
            CommandId::Height => "height?",
            CommandId::Acceleration => "acceleration?",
        }
    }

    /// Read commands reply with a value instead of "ok"
    pub fn is_read(self) -> bool {
        self.as_str().ends_with('?')
    }

    /// Number of parameters the device expects
    pub fn arity(self) -> usize {
        match self {
            CommandId::Up
            | CommandId::Down
            | CommandId::Left
            | CommandId::Right
            | CommandId::Forward
            | CommandId::Back
            | CommandId::Clockwise
            | CommandId::CounterClockwise
            | CommandId::Flip
            | CommandId::SetSpeed => 1,
            CommandId::Go | CommandId::RemoteControl => 4,
            CommandId::Curve => 7,
            _ => 0,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandId {
    type Err = TelloError;

    fn from_str(s: &str) -> Result<Self> {
        CommandId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| TelloError::Parse(format!("unknown command identifier '{}'", s)))
    }
}

/// Flip direction, sent as a single letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    pub fn letter(self) -> &'static str {
        match self {
            FlipDirection::Left => "l",
            FlipDirection::Right => "r",
            FlipDirection::Forward => "f",
            FlipDirection::Back => "b",
        }
    }

    fn from_letter(s: &str) -> Option<Self> {
        match s {
            "l" => Some(FlipDirection::Left),
            "r" => Some(FlipDirection::Right),
            "f" => Some(FlipDirection::Forward),
            "b" => Some(FlipDirection::Back),
            _ => None,
        }
    }
}

/// A single command parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Int(i32),
    Word(&'static str),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(value) => write!(f, "{}", value),
            Param::Word(word) => f.write_str(word),
        }
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value)
    }
}

impl From<FlipDirection> for Param {
    fn from(direction: FlipDirection) -> Self {
        Param::Word(direction.letter())
    }
}

/// One immutable instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: CommandId,
    params: Vec<Param>,
}

impl Command {
    pub fn new(id: CommandId) -> Self {
        Self {
            id,
            params: Vec::new(),
        }
    }

    pub fn with_params<I, P>(id: CommandId, params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Param>,
    {
        Self {
            id,
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_read(&self) -> bool {
        self.id.is_read()
    }

    /// Compose the wire text: `"<id>[ <p1> <p2> ...]"`
    pub fn compose(&self) -> String {
        let mut text = String::from(self.id.as_str());
        for param in &self.params {
            text.push(' ');
            text.push_str(&param.to_string());
        }
        text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compose())
    }
}

impl FromStr for Command {
    type Err = TelloError;

    /// Parse wire text back into a command. Parameter ranges are left to the
    /// device; only the parameter count and shape are checked.
    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace();
        let id: CommandId = words
            .next()
            .ok_or_else(|| TelloError::Parse("empty command".to_string()))?
            .parse()?;

        let params = words
            .map(|word| match id {
                CommandId::Flip => FlipDirection::from_letter(word)
                    .map(Param::from)
                    .ok_or_else(|| TelloError::Parse(format!("invalid flip direction '{}'", word))),
                _ => word
                    .parse::<i32>()
                    .map(Param::Int)
                    .map_err(|_| TelloError::Parse(format!("invalid parameter '{}' for {}", word, id))),
            })
            .collect::<Result<Vec<_>>>()?;

        if params.len() != id.arity() {
            return Err(TelloError::Parse(format!(
                "{} takes {} parameter(s), got {}",
                id,
                id.arity(),
                params.len()
            )));
        }

        Ok(Self { id, params })
    }
}
