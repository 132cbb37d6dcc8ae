use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{SerialPort, SerialPortType};

use super::{Result, SerialDeviceInfo, SerialError};
use crate::connection::ConnectionConfig;

// Poll interval while waiting for bytes on a native port
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Byte-level duplex device the reader and command path talk to.
#[async_trait::async_trait]
pub trait SerialPortIO: Send {
    /// Write all bytes, returning how many were written.
    async fn send_data(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever is available within `timeout`. Returns `SerialError::Timeout`
    /// when nothing arrived.
    async fn read_data(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    async fn flush(&mut self) -> Result<()>;

    fn port_name(&self) -> &str;
}

/// Opens transports for the connection manager.
pub trait PortConnector: Send + Sync {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>>;
}

/// Opens real serial devices through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialportConnector;

impl PortConnector for SerialportConnector {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>> {
        let port = serialport::new(config.port_name.as_str(), config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => SerialError::PortNotFound(config.port_name.clone()),
                _ => SerialError::ConnectionFailed(e.to_string()),
            })?;

        log::info!("Opened {} at {} baud", config.port_name, config.baud_rate);
        Ok(Box::new(NativePort::new(config.port_name.clone(), port)))
    }
}

/// `serialport`-backed transport.
pub struct NativePort {
    name: String,
    port: Box<dyn SerialPort>,
}

impl NativePort {
    pub fn new(name: String, port: Box<dyn SerialPort>) -> Self {
        Self { name, port }
    }
}

#[async_trait::async_trait]
impl SerialPortIO for NativePort {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    async fn read_data(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.port.bytes_to_read() {
                Ok(0) => {
                    if Instant::now() >= deadline {
                        return Err(SerialError::Timeout);
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Ok(_) => match self.port.read(buffer) {
                    Ok(0) => return Err(SerialError::Disconnected),
                    Ok(n) => return Ok(n),
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        return Err(SerialError::Timeout)
                    }
                    Err(e) => return Err(SerialError::IoError(e)),
                },
                Err(e) => return Err(SerialError::SerialportError(e)),
            }
        }
    }

    async fn flush(&mut self) -> Result<()> {
        self.port.flush().map_err(SerialError::IoError)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Owned handle to an open transport. Dropping the transport closes it.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPortIO>>,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self { port: None }
    }

    pub fn from_io(io: Box<dyn SerialPortIO>) -> Self {
        Self { port: Some(io) }
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port.as_ref().map(|p| p.port_name())
    }

    /// Send data to the connected device
    pub async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::Disconnected)?;
        port.send_data(data).await
    }

    /// Read data from the connected device with timeout
    pub async fn read_data(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::Disconnected)?;
        port.read_data(buffer, timeout).await
    }

    /// Flush pending output and close the port. Closing an already closed
    /// interface does nothing.
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.port.take() {
            Some(mut port) => {
                log::info!("Closing {}", port.port_name());
                port.flush().await
            }
            None => Ok(()),
        }
    }

    /// Drop the port without flushing, used after the device has failed.
    pub fn abandon(&mut self) {
        if let Some(port) = self.port.take() {
            log::debug!("Dropping failed port {}", port.port_name());
        }
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

/// List the serial ports visible on this machine
pub fn discover_ports() -> Result<Vec<SerialDeviceInfo>> {
    let ports = serialport::available_ports()?;
    let devices = ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb_info) => SerialDeviceInfo {
                port_name: port.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                serial_number: usb_info.serial_number,
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => SerialDeviceInfo {
                port_name: port.port_name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect();

    Ok(devices)
}
