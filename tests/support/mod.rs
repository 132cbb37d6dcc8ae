// Scripted in-memory serial device for driving the connection manager.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fablock_statustool::serial::{PortConnector, SerialError, SerialPortIO};
use fablock_statustool::{ConnectionConfig, ConnectionManager, ReaderOptions, ReaderStats, StatusEvent};

#[derive(Default)]
struct DeviceInner {
    incoming: Mutex<VecDeque<Vec<u8>>>,
    written: Mutex<Vec<u8>>,
    read_delay: Mutex<Duration>,
    fail_reads: AtomicBool,
    fail_flush: AtomicBool,
    reads: AtomicUsize,
}

/// Shared view of the fake lock: push bytes it "sends", inspect what it received.
#[derive(Clone, Default)]
pub struct FakeDevice {
    inner: Arc<DeviceInner>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, bytes: &[u8]) {
        self.inner.incoming.lock().unwrap().push_back(bytes.to_vec());
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.written.lock().unwrap().clone()
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock().unwrap() = delay;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_flush(&self, fail: bool) {
        self.inner.fail_flush.store(fail, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }
}

pub struct FakePort {
    name: String,
    device: FakeDevice,
}

#[async_trait::async_trait]
impl SerialPortIO for FakePort {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize, SerialError> {
        self.device.inner.written.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    async fn read_data(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        let inner = &self.device.inner;
        inner.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *inner.read_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if inner.fail_reads.load(Ordering::SeqCst) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }

        let next = inner.incoming.lock().unwrap().pop_front();
        match next {
            Some(chunk) => {
                let n = chunk.len().min(buffer.len());
                buffer[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    inner.incoming.lock().unwrap().push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None => {
                tokio::time::sleep(timeout).await;
                Err(SerialError::Timeout)
            }
        }
    }

    async fn flush(&mut self) -> Result<(), SerialError> {
        if self.device.inner.fail_flush.load(Ordering::SeqCst) {
            return Err(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "flush failed",
            )));
        }
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub device: FakeDevice,
    fail_open: AtomicBool,
    opens: AtomicUsize,
}

impl FakeConnector {
    pub fn new(device: FakeDevice) -> Self {
        Self { device, ..Default::default() }
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortConnector for FakeConnector {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SerialPortIO>, SerialError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SerialError::PortNotFound(config.port_name.clone()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePort {
            name: config.port_name.clone(),
            device: self.device.clone(),
        }))
    }
}

pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::new("/dev/fake0", 9600, Duration::from_millis(50))
}

pub fn fake_manager(options: ReaderOptions) -> (ConnectionManager, Arc<FakeConnector>, FakeDevice) {
    let device = FakeDevice::new();
    let connector = Arc::new(FakeConnector::new(device.clone()));
    let manager = ConnectionManager::with_connector(connector.clone(), options);
    (manager, connector, device)
}

/// Collects every delivered event.
pub fn collecting_sink(manager: &ConnectionManager) -> Arc<Mutex<Vec<StatusEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    manager.set_sink(move |event: StatusEvent| seen_clone.lock().unwrap().push(event));
    seen
}

/// Poll the reader statistics until `pred` holds, panicking after two seconds.
pub async fn wait_for_stats<F>(manager: &ConnectionManager, pred: F) -> ReaderStats
where
    F: Fn(&ReaderStats) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let stats = manager.stats();
            if pred(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    match waited {
        Ok(stats) => stats,
        Err(_) => panic!("condition not reached, last stats: {:?}", manager.stats()),
    }
}
