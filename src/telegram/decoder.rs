use super::types::*;

pub const ACK_LITERAL: &str = "OK.";
pub const INVALID_PAYLOAD_LENGTH: &str = "invalid payload length";

const DOOR_PAYLOAD_LEN: usize = 4;

/// Decode one stripped telegram line.
/// Format: `KEY=VALUE` with KEY one of DOOR, AWAKE, PIN, SENSE, or the literal `OK.`
pub fn decode(line: &str) -> DecodeOutcome {
    if line == ACK_LITERAL {
        return StatusEvent::Ack.into();
    }

    let Some((key, value)) = line.split_once('=') else {
        return DecodeOutcome::Unrecognized;
    };

    match key {
        "DOOR" => decode_door(line, value).into(),
        "AWAKE" => StatusEvent::Awake { running: value == "1" }.into(),
        "PIN" => StatusEvent::Pin { code: value.to_string() }.into(),
        "SENSE" => StatusEvent::Sense { raw_value: value.to_string() }.into(),
        _ => DecodeOutcome::Unrecognized,
    }
}

/// Payload: [locked][closed][motor state][motor action ok], one ASCII digit each
fn decode_door(line: &str, value: &str) -> StatusEvent {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() != DOOR_PAYLOAD_LEN {
        return StatusEvent::Malformed {
            original: line.to_string(),
            reason: INVALID_PAYLOAD_LENGTH.to_string(),
        };
    }

    StatusEvent::Door {
        locked: chars[0] == '1',
        closed: chars[1] == '1',
        motor_state: MotorState::from_code(chars[2]),
        motor_action_ok: chars[3] == '1',
    }
}
