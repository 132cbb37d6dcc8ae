//! Consumers of decoded telegrams.
//!
//! The reader calls sinks synchronously from its own task, one event at a
//! time, in the order the lines arrived. A sink that needs another thread
//! (a GUI event loop, for instance) must hand the event over itself.

use tokio::sync::broadcast;

use crate::connection::ConnectionError;
use crate::telegram::StatusEvent;

pub trait EventSink: Send + Sync {
    fn deliver(&self, event: StatusEvent);
}

impl<F> EventSink for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn deliver(&self, event: StatusEvent) {
        self(event)
    }
}

/// Told when the reader dies on an I/O failure and the connection drops.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &ConnectionError);
}

impl<F> ErrorSink for F
where
    F: Fn(&ConnectionError) + Send + Sync,
{
    fn report(&self, error: &ConnectionError) {
        self(error)
    }
}

/// Fans events out to any number of async subscribers.
#[derive(Clone)]
pub struct BroadcastSink {
    events_tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _events_rx) = broadcast::channel(capacity);
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn deliver(&self, event: StatusEvent) {
        // No subscribers is not an error
        let _ = self.events_tx.send(event);
    }
}
