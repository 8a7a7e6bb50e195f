//! Mock BLE backend for tests.
//!
//! # Why a mock backend?
//!
//! The real backend needs a Bluetooth adapter and a powered-on Typist within
//! radio range.  The `MockBleBackend` replaces the radio with in-memory
//! bookkeeping so tests can observe exactly what the link did:
//!
//! - Every written chunk is recorded with its write mode.
//! - Notifications and link drops (signalled or silent) are injected on
//!   demand.
//! - Connect failures can be scripted for the next N attempts.
//! - A line written by the client can trigger canned replies, which is how
//!   tests play the firmware's side of `:CFG:LIST`.
//!
//! # Usage in tests
//!
//! ```ignore
//! let mock = Arc::new(MockBleBackend::with_typist());
//! mock.respond_to(":CFG:LIST", &[":CFG:LIST LEN=2", ":CFG:DATA {}"]);
//!
//! let (handle, mut events, _task) =
//!     SessionController::spawn(mock.clone(), Box::new(MemoryStateStore::new()), cfg);
//! handle.connect();
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;

use typist_core::DeviceHandle;

use crate::application::transport::{
    BleBackend, ChannelInfo, DeviceFilter, DisconnectStream, NotificationStream, TransportError,
    WriteMode, NUS_NOTIFY_UUID, NUS_SERVICE_UUID, NUS_WRITE_UUID,
};

/// Identifier of the device returned by [`MockBleBackend::with_typist`].
pub const MOCK_TYPIST_ID: &str = "C0:FF:EE:00:00:01";

/// The Nordic UART characteristics as the firmware exposes them.
pub fn nus_channels() -> Vec<ChannelInfo> {
    vec![
        ChannelInfo {
            uuid: NUS_WRITE_UUID,
            service_uuid: NUS_SERVICE_UUID,
            write: true,
            write_without_response: true,
            notify: false,
        },
        ChannelInfo {
            uuid: NUS_NOTIFY_UUID,
            service_uuid: NUS_SERVICE_UUID,
            write: false,
            write_without_response: false,
            notify: true,
        },
    ]
}

/// A backend that records all calls without touching a radio.
#[derive(Default)]
pub struct MockBleBackend {
    /// Device the chooser returns; `None` simulates a cancelled chooser.
    pub chooser: Mutex<Option<DeviceHandle>>,
    /// Devices reported as previously authorised.
    pub known: Mutex<Vec<DeviceHandle>>,
    /// Characteristics reported for every connected device.
    pub channels: Mutex<Vec<ChannelInfo>>,
    /// Every chunk written, in order, with its write mode.
    pub writes: Mutex<Vec<(WriteMode, Vec<u8>)>>,
    /// Clock reading at every `connect` call.
    pub connect_calls: Mutex<Vec<Instant>>,
    /// Number of upcoming `connect` calls that fail.
    pub failing_connects: AtomicUsize,
    /// When `true`, every write fails with a backend error.
    pub should_fail_writes: AtomicBool,
    /// When `true`, unacknowledged writes are refused.
    pub refuse_unacknowledged: AtomicBool,
    replies: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    line: Mutex<Vec<u8>>,
    connected: Mutex<HashSet<String>>,
    notify_tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    disconnect_txs: Mutex<Vec<UnboundedSender<()>>>,
}

impl MockBleBackend {
    /// A backend with the Nordic UART service but no device to offer.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(nus_channels()),
            ..Default::default()
        }
    }

    /// A backend whose chooser offers one Typist, also listed as authorised.
    pub fn with_typist() -> Self {
        let mock = Self::new();
        let device = DeviceHandle::new(MOCK_TYPIST_ID, Some("Typist".to_string()));
        *mock.chooser.lock().unwrap() = Some(device.clone());
        mock.known.lock().unwrap().push(device);
        mock
    }

    /// Handle of the device offered by [`with_typist`](Self::with_typist).
    pub fn typist_handle(&self) -> DeviceHandle {
        DeviceHandle::new(MOCK_TYPIST_ID, Some("Typist".to_string()))
    }

    /// When the client writes `line` (newline-terminated), each reply is
    /// delivered as one notification.
    pub fn respond_to(&self, line: &str, replies: &[&str]) {
        self.replies.lock().unwrap().insert(
            line.to_string(),
            replies.iter().map(|r| r.as_bytes().to_vec()).collect(),
        );
    }

    /// Delivers one notification on the current subscription, if any.
    pub fn notify(&self, payload: &[u8]) {
        if let Some(tx) = self.notify_tx.lock().unwrap().as_ref() {
            let _ = tx.send(payload.to_vec());
        }
    }

    /// Simulates the peripheral going out of range.
    pub fn drop_link(&self) {
        self.connected.lock().unwrap().clear();
        self.notify_tx.lock().unwrap().take();
        for tx in self.disconnect_txs.lock().unwrap().drain(..) {
            let _ = tx.send(());
        }
    }

    /// Loses the radio link without any disconnect event reaching the client.
    pub fn lose_link_silently(&self) {
        self.connected.lock().unwrap().clear();
        self.notify_tx.lock().unwrap().take();
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.lock().unwrap().len()
    }

    pub fn is_device_connected(&self, device: &DeviceHandle) -> bool {
        self.connected.lock().unwrap().contains(&device.id)
    }

    /// All written bytes, concatenated in write order.
    pub fn written(&self) -> Vec<u8> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, chunk)| chunk.iter().copied())
            .collect()
    }

    fn require_connected(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        if self.is_device_connected(device) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    /// Feeds written bytes to the line matcher and fires canned replies.
    fn observe_written(&self, chunk: &[u8]) {
        let mut completed = Vec::new();
        {
            let mut line = self.line.lock().unwrap();
            for &byte in chunk {
                if byte == b'\n' {
                    completed.push(String::from_utf8_lossy(&line).into_owned());
                    line.clear();
                } else {
                    line.push(byte);
                }
            }
        }
        for line in completed {
            let replies = self.replies.lock().unwrap().get(&line).cloned();
            for reply in replies.unwrap_or_default() {
                self.notify(&reply);
            }
        }
    }
}

#[async_trait]
impl BleBackend for MockBleBackend {
    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError> {
        self.chooser
            .lock()
            .unwrap()
            .clone()
            .filter(|d| d.name_matches(&filter.name_pattern))
            .ok_or(TransportError::ChooserCancelled)
    }

    async fn known_devices(&self) -> Result<Vec<DeviceHandle>, TransportError> {
        Ok(self.known.lock().unwrap().clone())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        self.connect_calls.lock().unwrap().push(Instant::now());
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Backend("connection refused".into()));
        }
        self.connected.lock().unwrap().insert(device.id.clone());
        Ok(())
    }

    async fn is_connected(&self, device: &DeviceHandle) -> Result<bool, TransportError> {
        Ok(self.is_device_connected(device))
    }

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        self.connected.lock().unwrap().remove(&device.id);
        Ok(())
    }

    async fn channels(&self, device: &DeviceHandle) -> Result<Vec<ChannelInfo>, TransportError> {
        self.require_connected(device)?;
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn write(
        &self,
        device: &DeviceHandle,
        _channel: &ChannelInfo,
        chunk: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        self.require_connected(device)?;
        if self.should_fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Backend("mock write failure".into()));
        }
        if mode == WriteMode::WithoutResponse && self.refuse_unacknowledged.load(Ordering::SeqCst) {
            return Err(TransportError::Backend("write without response not permitted".into()));
        }
        self.writes.lock().unwrap().push((mode, chunk.to_vec()));
        self.observe_written(chunk);
        Ok(())
    }

    async fn subscribe(
        &self,
        device: &DeviceHandle,
        _channel: &ChannelInfo,
    ) -> Result<NotificationStream, TransportError> {
        self.require_connected(device)?;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notify_tx.lock().unwrap() = Some(tx);
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        })))
    }

    async fn unsubscribe(
        &self,
        _device: &DeviceHandle,
        _channel: &ChannelInfo,
    ) -> Result<(), TransportError> {
        self.notify_tx.lock().unwrap().take();
        Ok(())
    }

    async fn disconnections(&self, _device: &DeviceHandle) -> Result<DisconnectStream, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.disconnect_txs.lock().unwrap().push(tx);
        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|()| ((), rx))
        })))
    }
}
