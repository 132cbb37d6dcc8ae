use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::reader::{reader_task, ReaderContext, ReaderOptions, ReaderStats, READ_SLICE};
use super::{ConnectionConfig, ConnectionError, ConnectionState, Result};
use crate::serial::{PortConnector, SerialError, SerialInterface, SerialportConnector};
use crate::sink::{ErrorSink, EventSink};
use crate::telegram::DoorCommand;

/// A live connection and the single reader that serves it
struct LiveConnection {
    config: ConnectionConfig,
    interface: Arc<Mutex<SerialInterface>>,
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl LiveConnection {
    /// Stop the reader and wait until it has exited.
    async fn stop_reader(&mut self) {
        // The reader may already be gone after an I/O failure
        let _ = self.stop_tx.send(()).await;
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                log::error!("Reader for {} panicked", self.config.port_name);
            }
        }
    }
}

/// Owns the serial connection to the lock and its background reader.
///
/// Connect, disconnect and command sends may come from any task. Events are
/// delivered to the installed [`EventSink`] from the reader task, in line order.
pub struct ConnectionManager {
    connector: Arc<dyn PortConnector>,
    options: ReaderOptions,
    live: Mutex<Option<LiveConnection>>,
    context: Arc<ReaderContext>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SerialportConnector), ReaderOptions::default())
    }

    pub fn with_connector(connector: Arc<dyn PortConnector>, options: ReaderOptions) -> Self {
        Self {
            connector,
            options,
            live: Mutex::new(None),
            context: Arc::new(ReaderContext::new()),
        }
    }

    /// Open the port and start the reader
    pub async fn connect(&self, config: ConnectionConfig) -> Result<()> {
        config.validate()?;

        let mut live = self.live.lock().await;

        if let Some(existing) = live.as_mut() {
            let reader_alive = !existing.task.is_finished();
            if reader_alive && self.state() == ConnectionState::Connected {
                return Err(ConnectionError::AlreadyConnected);
            }
            // Reader died on its own; reap it before reconnecting
            log::info!("Reaping stale connection to {}", existing.config.port_name);
            existing.stop_reader().await;
            existing.interface.lock().await.abandon();
        }
        *live = None;
        self.context.set_state(ConnectionState::Disconnected);

        log::info!("Attempting to connect to port: {}", config.port_name);
        let io = self.connector.open(&config).map_err(|e| {
            log::error!("Connection failed: {}", e);
            ConnectionError::OpenFailed(e)
        })?;

        let interface = Arc::new(Mutex::new(SerialInterface::from_io(io)));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let read_slice = config.read_timeout.min(READ_SLICE);

        self.context.stats_tx.send_replace(ReaderStats::default());
        // Connected before the reader starts, so a failing reader cannot be overwritten
        self.context.set_state(ConnectionState::Connected);

        let task = tokio::spawn(reader_task(
            interface.clone(),
            self.context.clone(),
            self.options,
            read_slice,
            stop_rx,
        ));

        log::info!("Connected to {} at {} baud", config.port_name, config.baud_rate);
        *live = Some(LiveConnection {
            config,
            interface,
            stop_tx,
            task,
        });
        Ok(())
    }

    /// Stop the reader and close the port. Does nothing when already
    /// disconnected. Once this returns the old reader will not call the sink
    /// again.
    pub async fn disconnect(&self) -> Result<()> {
        let mut live = self.live.lock().await;

        let Some(mut conn) = live.take() else {
            self.context.set_state(ConnectionState::Disconnected);
            return Ok(());
        };

        log::info!("Disconnecting from {}", conn.config.port_name);
        conn.stop_reader().await;
        let closed = conn.interface.lock().await.disconnect().await;
        self.context.set_state(ConnectionState::Disconnected);

        closed.map_err(|e| {
            log::error!("Failed to disconnect: {}", e);
            ConnectionError::CloseFailed(e)
        })
    }

    /// Write `bytes` to the device as-is. Any answer arrives later through the
    /// reader as an ordinary event.
    pub async fn send_command(&self, bytes: &[u8]) -> Result<()> {
        let interface = {
            let live = self.live.lock().await;
            match live.as_ref() {
                Some(conn) if self.state() == ConnectionState::Connected => conn.interface.clone(),
                _ => return Err(ConnectionError::NotConnected),
            }
        };

        let mut guard = interface.lock().await;
        match guard.send_data(bytes).await {
            Ok(_) => {
                log::debug!("Sent {:?}", String::from_utf8_lossy(bytes));
                Ok(())
            }
            // The reader dropped the port between the state check and the write
            Err(SerialError::Disconnected) => Err(ConnectionError::NotConnected),
            Err(e) => {
                log::error!("Failed to send command: {}", e);
                Err(ConnectionError::WriteFailed(e))
            }
        }
    }

    pub async fn send_door_command(&self, command: DoorCommand) -> Result<()> {
        self.send_command(command.as_bytes()).await?;
        log::info!("{}", command);
        Ok(())
    }

    /// Install or replace the event consumer.
    pub fn set_sink<S>(&self, sink: S)
    where
        S: EventSink + 'static,
    {
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        self.context.set_sink(Some(sink));
    }

    pub fn clear_sink(&self) {
        self.context.set_sink(None);
    }

    /// Install the callback told about reader failures.
    pub fn set_error_sink<S>(&self, sink: S)
    where
        S: ErrorSink + 'static,
    {
        let sink: Arc<dyn ErrorSink> = Arc::new(sink);
        self.context.set_error_sink(Some(sink));
    }

    pub fn state(&self) -> ConnectionState {
        *self.context.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.context.state_tx.subscribe()
    }

    pub fn stats(&self) -> ReaderStats {
        self.context.stats_tx.borrow().clone()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<ReaderStats> {
        self.context.stats_tx.subscribe()
    }

    /// Config of the live connection, if any
    pub async fn active_config(&self) -> Option<ConnectionConfig> {
        let live = self.live.lock().await;
        match live.as_ref() {
            Some(conn) if self.state() == ConnectionState::Connected => Some(conn.config.clone()),
            _ => None,
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
