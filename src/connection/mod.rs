pub mod manager;
pub mod reader;

pub use manager::ConnectionManager;
pub use reader::{ReaderOptions, ReaderStats};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::serial::SerialError;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Where and how to open the lock's serial port. Fixed for the life of a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(ConnectionError::InvalidConfig("port name is empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidConfig("baud rate must be positive".to_string()));
        }
        if self.read_timeout.is_zero() {
            return Err(ConnectionError::InvalidConfig("read timeout must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to open serial port: {0}")]
    OpenFailed(#[source] SerialError),

    #[error("Device already connected")]
    AlreadyConnected,

    #[error("Device not connected")]
    NotConnected,

    #[error("Failed to send command: {0}")]
    WriteFailed(#[source] SerialError),

    #[error("Failed to close serial port: {0}")]
    CloseFailed(#[source] SerialError),

    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] SerialError),

    #[error("Event sink panicked; reader stopped")]
    SinkPanicked,

    #[error("Invalid connection configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
