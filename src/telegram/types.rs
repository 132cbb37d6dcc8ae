use std::fmt;

use serde::{Deserialize, Serialize};

/// Motor activity reported in the third byte of a `DOOR` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorState {
    Stopped,
    Closing,
    Opening,
    Unknown,
}

impl MotorState {
    pub fn from_code(code: char) -> Self {
        match code {
            '0' => MotorState::Stopped,
            '1' => MotorState::Closing,
            '2' => MotorState::Opening,
            _ => MotorState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotorState::Stopped => "stopped",
            MotorState::Closing => "closing",
            MotorState::Opening => "opening",
            MotorState::Unknown => "Unknown",
        }
    }
}

/// A decoded status telegram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatusEvent {
    Door {
        locked: bool,
        closed: bool,
        motor_state: MotorState,
        motor_action_ok: bool,
    },
    Awake { running: bool },
    Pin { code: String },
    /// Motor shunt ADC reading, left as text.
    Sense { raw_value: String },
    Ack,
    /// Known key with a payload that cannot be decoded.
    Malformed { original: String, reason: String },
}

impl StatusEvent {
    /// Telegram key this event came from, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StatusEvent::Door { .. } => "DOOR",
            StatusEvent::Awake { .. } => "AWAKE",
            StatusEvent::Pin { .. } => "PIN",
            StatusEvent::Sense { .. } => "SENSE",
            StatusEvent::Ack => "OK",
            StatusEvent::Malformed { .. } => "MALFORMED",
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Door { locked, closed, motor_state, motor_action_ok } => write!(
                f,
                "Door: {}, {}, {}, Action: {}",
                if *locked { "Locked" } else { "Unlocked" },
                if *closed { "Closed" } else { "Open" },
                motor_state.as_str(),
                if *motor_action_ok { "Success" } else { "Failed" },
            ),
            StatusEvent::Awake { running } => {
                write!(f, "Awake: {}", if *running { "Running" } else { "Sleep" })
            }
            StatusEvent::Pin { code } => write!(f, "PIN: {}", code),
            StatusEvent::Sense { raw_value } => write!(f, "Motor ADC: {}", raw_value),
            StatusEvent::Ack => write!(f, "Command acknowledged"),
            StatusEvent::Malformed { original, reason } => {
                write!(f, "Malformed telegram '{}': {}", original, reason)
            }
        }
    }
}

/// Result of decoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Event(StatusEvent),
    /// No key/value framing, or a key the device protocol does not define.
    Unrecognized,
}

impl DecodeOutcome {
    pub fn into_event(self) -> Option<StatusEvent> {
        match self {
            DecodeOutcome::Event(event) => Some(event),
            DecodeOutcome::Unrecognized => None,
        }
    }
}

impl From<StatusEvent> for DecodeOutcome {
    fn from(event: StatusEvent) -> Self {
        DecodeOutcome::Event(event)
    }
}

impl fmt::Display for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeOutcome::Event(event) => event.fmt(f),
            DecodeOutcome::Unrecognized => write!(f, "Unrecognized telegram"),
        }
    }
}

/// Commands understood by the lock firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoorCommand {
    Open,
    Close,
}

impl DoorCommand {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            DoorCommand::Open => b"!D1\r",
            DoorCommand::Close => b"!D0\r",
        }
    }
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorCommand::Open => write!(f, "Open Command Sent (!D1)"),
            DoorCommand::Close => write!(f, "Close Command Sent (!D0)"),
        }
    }
}
