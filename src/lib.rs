//! Serial status tool for the Fablock door-lock controller.
//!
//! The controller prints one telegram per line (`DOOR=1102`, `AWAKE=1`,
//! `PIN=1234`, `SENSE=708`, `OK.`) and accepts `!D1\r` / `!D0\r` to open and
//! close the door. [`ConnectionManager`] owns the port and its background
//! reader, [`telegram::decode`] turns lines into [`StatusEvent`]s, and an
//! [`EventSink`] receives them in order.

pub mod config;
pub mod connection;
pub mod console;
pub mod serial;
pub mod sink;
pub mod telegram;

pub use config::ToolSettings;
pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, ReaderOptions,
    ReaderStats,
};
pub use sink::{BroadcastSink, ErrorSink, EventSink};
pub use telegram::{decode, DecodeOutcome, DoorCommand, MotorState, StatusEvent};
