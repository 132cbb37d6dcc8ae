//! Commands typed into the console front end.

use crate::telegram::DoorCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Door(DoorCommand),
    /// Arbitrary text, sent with a trailing `\r`.
    Raw(String),
    Ports,
    Status,
    Reconnect,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };

        match word.to_lowercase().as_str() {
            "open" => Ok(ConsoleCommand::Door(DoorCommand::Open)),
            "close" => Ok(ConsoleCommand::Door(DoorCommand::Close)),
            "raw" if !rest.is_empty() => Ok(ConsoleCommand::Raw(rest.to_string())),
            "raw" => Err("raw needs text to send".to_string()),
            "ports" => Ok(ConsoleCommand::Ports),
            "status" => Ok(ConsoleCommand::Status),
            "reconnect" => Ok(ConsoleCommand::Reconnect),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command '{}'", other)),
        }
    }

    /// Bytes to put on the wire, for commands that send anything
    pub fn wire_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ConsoleCommand::Door(cmd) => Some(cmd.as_bytes().to_vec()),
            ConsoleCommand::Raw(text) => Some(format!("{}\r", text).into_bytes()),
            _ => None,
        }
    }
}

pub const HELP: &str = "commands: open | close | raw <text> | ports | status | reconnect | quit";
