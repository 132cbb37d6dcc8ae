//! Background reader: one task per live connection, turning the byte stream
//! into telegram lines and handing decoded events to the installed sink.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use super::{ConnectionError, ConnectionState};
use crate::serial::{LineFramer, RawLine, SerialError, SerialInterface};
use crate::sink::{ErrorSink, EventSink};
use crate::telegram::{decode, DecodeOutcome, StatusEvent};

/// Longest time the reader holds the port lock for a single read.
pub const READ_SLICE: Duration = Duration::from_millis(25);

const READ_BUFFER_SIZE: usize = 512;

/// Host policy for what the reader forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Do not forward `OK.` acknowledgements to the sink.
    pub suppress_ack: bool,
    /// Unterminated input beyond this many bytes is discarded.
    pub max_line_len: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            suppress_ack: false,
            max_line_len: LineFramer::DEFAULT_MAX_LINE_LEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub lines_read: u64,
    pub events_delivered: u64,
    pub events_dropped_no_sink: u64,
    pub acks_suppressed: u64,
    pub unrecognized_lines: u64,
    pub malformed_lines: u64,
    pub empty_lines: u64,
    pub utf8_decode_errors: u64,
    pub partial_buffer_trims: u64,
    pub last_error: Option<String>,
}

/// State shared between the manager and its reader.
pub(crate) struct ReaderContext {
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    error_sink: RwLock<Option<Arc<dyn ErrorSink>>>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) stats_tx: watch::Sender<ReaderStats>,
}

impl ReaderContext {
    pub(crate) fn new() -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stats_tx, _stats_rx) = watch::channel(ReaderStats::default());
        Self {
            sink: RwLock::new(None),
            error_sink: RwLock::new(None),
            state_tx,
            stats_tx,
        }
    }

    pub(crate) fn set_sink(&self, sink: Option<Arc<dyn EventSink>>) {
        let mut guard = self.sink.write().unwrap_or_else(|e| e.into_inner());
        *guard = sink;
    }

    pub(crate) fn set_error_sink(&self, sink: Option<Arc<dyn ErrorSink>>) {
        let mut guard = self.error_sink.write().unwrap_or_else(|e| e.into_inner());
        *guard = sink;
    }

    fn sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn error_sink(&self) -> Option<Arc<dyn ErrorSink>> {
        self.error_sink.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }
}

pub(crate) async fn reader_task(
    interface: Arc<Mutex<SerialInterface>>,
    context: Arc<ReaderContext>,
    options: ReaderOptions,
    read_slice: Duration,
    mut stop_rx: mpsc::Receiver<()>,
) {
    let mut framer = LineFramer::with_max_line_len(options.max_line_len);
    let mut stats = ReaderStats::default();

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => {
                log::debug!("Reader received stop signal");
                break;
            },
            read_res = async {
                let mut buf = [0u8; READ_BUFFER_SIZE];
                let mut guard = interface.lock().await;
                guard.read_data(&mut buf, read_slice).await.map(|n| (buf, n))
            } => {
                match read_res {
                    Ok((buf, n)) if n > 0 => {
                        let lines = framer.push(&buf[..n]);
                        let trims = framer.trims();
                        let changed = !lines.is_empty() || trims != stats.partial_buffer_trims;
                        stats.partial_buffer_trims = trims;
                        let mut failure = None;
                        for line in lines {
                            if let Err(e) = process_line(line, &context, &options, &mut stats) {
                                failure = Some(e);
                                break;
                            }
                        }
                        if let Some(e) = failure {
                            shut_down(&interface, &context, &mut stats, e).await;
                            break;
                        }
                        if changed {
                            context.stats_tx.send_replace(stats.clone());
                        }
                    },
                    Ok(_) => {},
                    Err(SerialError::Timeout) => {},
                    Err(e) => {
                        shut_down(&interface, &context, &mut stats, ConnectionError::ConnectionLost(e)).await;
                        break;
                    }
                }
            }
        }
    }

    if framer.pending() > 0 {
        log::debug!("Reader exiting with {} unterminated bytes", framer.pending());
    }
}

/// Tear down after the reader can no longer go on: the port is dropped, the
/// state goes to Disconnected, then the error sink hears why.
async fn shut_down(
    interface: &Mutex<SerialInterface>,
    context: &ReaderContext,
    stats: &mut ReaderStats,
    error: ConnectionError,
) {
    log::error!("Reader stopping: {}", error);
    interface.lock().await.abandon();
    stats.last_error = Some(error.to_string());
    context.stats_tx.send_replace(stats.clone());
    context.set_state(ConnectionState::Disconnected);
    if let Some(error_sink) = context.error_sink() {
        error_sink.report(&error);
    }
}

/// Decode one framed line and deliver the result, keeping `stats` current.
pub(crate) fn process_line(
    line: RawLine,
    context: &ReaderContext,
    options: &ReaderOptions,
    stats: &mut ReaderStats,
) -> Result<(), ConnectionError> {
    stats.lines_read += 1;
    if line.lossy {
        stats.utf8_decode_errors += 1;
    }

    let text = line.text.trim();
    if text.is_empty() {
        stats.empty_lines += 1;
        log::debug!("Skipping empty line");
        return Ok(());
    }

    let event = match decode(text) {
        DecodeOutcome::Event(event) => event,
        DecodeOutcome::Unrecognized => {
            stats.unrecognized_lines += 1;
            log::info!("'{}' with len {} was not parsed", text, text.len());
            return Ok(());
        }
    };

    match &event {
        StatusEvent::Ack if options.suppress_ack => {
            stats.acks_suppressed += 1;
            return Ok(());
        }
        StatusEvent::Malformed { reason, .. } => {
            stats.malformed_lines += 1;
            log::warn!("Malformed telegram '{}': {}", text, reason);
        }
        _ => log::debug!("{:?}", event),
    }

    match context.sink() {
        Some(sink) => {
            catch_unwind(AssertUnwindSafe(|| sink.deliver(event)))
                .map_err(|_| ConnectionError::SinkPanicked)?;
            stats.events_delivered += 1;
        }
        None => stats.events_dropped_no_sink += 1,
    }
    Ok(())
}
