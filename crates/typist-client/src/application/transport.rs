//! Transport adapter: one logical link to one peripheral.
//!
//! The [`BleBackend`] trait is the seam to the BLE stack.  It deals in
//! devices and characteristics and knows nothing about sessions.  The
//! [`TransportAdapter`] builds one *link* on top of it:
//!
//! ```text
//! open(device)
//!  ├─ connect if the device is not connected yet
//!  ├─ wait the post-connect settle delay
//!  ├─ resolve the write + notify channels (by UUID, then by capability)
//!  ├─ drop the previous subscription, install a new one
//!  └─ publish the channel pair to the writer sink
//!
//! close()
//!  ├─ bump the generation (our own drop must not look unexpected)
//!  ├─ drop the subscription
//!  └─ unsubscribe + disconnect
//! ```
//!
//! # Link generations
//!
//! Every successful `open` starts a new generation.  Notifications and
//! disconnect signals are tagged with the generation they were observed
//! under, and the session ignores anything whose tag is not current.  This is
//! what keeps a late disconnect event from a link we already replaced from
//! triggering a second reconnect.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use typist_core::DeviceHandle;

/// Nordic UART service exposed by the Typist firmware.
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Host → peripheral characteristic.
pub const NUS_WRITE_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Peripheral → host characteristic.
pub const NUS_NOTIFY_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Default settle time between "connected" and the first GATT lookup.
pub const DEFAULT_POST_CONNECT_DELAY: Duration = Duration::from_millis(200);

/// Errors raised while finding, opening, or using a link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The user dismissed the device chooser, or it found nothing to offer.
    #[error("device selection cancelled")]
    ChooserCancelled,

    /// The remembered device is not known to the BLE stack any more.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// The device does not expose the expected service or channels.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// A write or subscription was attempted without an open link.
    #[error("not connected")]
    NotConnected,

    /// No Bluetooth adapter is available on this machine.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// Any other failure reported by the BLE stack.
    #[error("BLE backend error: {0}")]
    Backend(String),
}

/// How a chunk is written to the outbound characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Acknowledged write ("write request").
    WithResponse,
    /// Unacknowledged write ("write command").
    WithoutResponse,
}

/// One GATT characteristic with the capabilities the link cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl ChannelInfo {
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// The outbound and inbound channels of one open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    pub outbound: ChannelInfo,
    pub inbound: ChannelInfo,
}

impl ChannelPair {
    /// `true` when the outbound channel accepts unacknowledged writes.
    pub fn supports_unacknowledged(&self) -> bool {
        self.outbound.write_without_response
    }
}

/// Which devices the chooser should offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Advertised-name prefix; empty accepts every device.
    pub name_pattern: String,
    /// Service the device is expected to expose.
    pub service_uuid: Uuid,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            name_pattern: "Typist".to_string(),
            service_uuid: NUS_SERVICE_UUID,
        }
    }
}

/// UUIDs and timing used when opening a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub service_uuid: Uuid,
    pub write_uuid: Uuid,
    pub notify_uuid: Uuid,
    pub post_connect_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            service_uuid: NUS_SERVICE_UUID,
            write_uuid: NUS_WRITE_UUID,
            notify_uuid: NUS_NOTIFY_UUID,
            post_connect_delay: DEFAULT_POST_CONNECT_DELAY,
        }
    }
}

/// Stream of raw notification payloads from the inbound channel.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;
/// Stream that yields once per link loss observed by the BLE stack.
pub type DisconnectStream = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// The seam to a concrete BLE stack.
///
/// Implemented by `BtleplugBackend` for real hardware and by
/// `MockBleBackend` for tests.
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// Lets the user pick a device.  Returns
    /// [`TransportError::ChooserCancelled`] when nothing was picked.
    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError>;

    /// Devices previously authorised on this machine, no prompting.
    async fn known_devices(&self) -> Result<Vec<DeviceHandle>, TransportError>;

    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError>;

    async fn is_connected(&self, device: &DeviceHandle) -> Result<bool, TransportError>;

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError>;

    /// Every characteristic of every service the connected device exposes.
    async fn channels(&self, device: &DeviceHandle) -> Result<Vec<ChannelInfo>, TransportError>;

    async fn write(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
        chunk: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;

    /// Enables notifications and returns the payload stream.
    async fn subscribe(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
    ) -> Result<NotificationStream, TransportError>;

    async fn unsubscribe(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
    ) -> Result<(), TransportError>;

    /// Stream of link-loss signals for `device`.
    async fn disconnections(&self, device: &DeviceHandle) -> Result<DisconnectStream, TransportError>;
}

/// Events the adapter reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One notification payload, as received.
    Notification { generation: u64, payload: Vec<u8> },
    /// The BLE stack reported the link as lost.
    Disconnected { generation: u64 },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LinkEvent::Notification { generation, .. } | LinkEvent::Disconnected { generation } => {
                *generation
            }
        }
    }
}

/// Resolves the outbound and inbound channels of the link service.
///
/// Lookup by UUID comes first.  When the firmware uses different
/// characteristic UUIDs, the first writable and the first notifiable
/// characteristic of the service are used instead.
pub fn resolve_channels(
    channels: &[ChannelInfo],
    settings: &LinkSettings,
) -> Result<ChannelPair, TransportError> {
    let service: Vec<&ChannelInfo> = channels
        .iter()
        .filter(|c| c.service_uuid == settings.service_uuid)
        .collect();
    if service.is_empty() {
        return Err(TransportError::ProtocolMismatch(format!(
            "service {} not found",
            settings.service_uuid
        )));
    }

    let outbound = service
        .iter()
        .find(|c| c.uuid == settings.write_uuid)
        .or_else(|| service.iter().find(|c| c.is_writable()));
    let inbound = service
        .iter()
        .find(|c| c.uuid == settings.notify_uuid)
        .or_else(|| service.iter().find(|c| c.notify));

    match (outbound, inbound) {
        (Some(outbound), Some(inbound)) => Ok(ChannelPair {
            outbound: (*outbound).clone(),
            inbound: (*inbound).clone(),
        }),
        (None, _) => Err(TransportError::ProtocolMismatch(
            "no writable characteristic".to_string(),
        )),
        (_, None) => Err(TransportError::ProtocolMismatch(
            "no notifiable characteristic".to_string(),
        )),
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// The notification forwarder and disconnect watcher of one link.
///
/// Dropping the subscription aborts both tasks, so replacing it can never
/// leave a second forwarder delivering duplicates.
#[derive(Debug)]
struct Subscription {
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn spawn(
        generation: u64,
        mut notifications: NotificationStream,
        mut disconnects: DisconnectStream,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let notify_tx = events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(payload) = notifications.next().await {
                if notify_tx
                    .send(LinkEvent::Notification { generation, payload })
                    .is_err()
                {
                    break;
                }
            }
        });
        let watcher = tokio::spawn(async move {
            if disconnects.next().await.is_some() {
                let _ = events.send(LinkEvent::Disconnected { generation });
            }
        });
        Self {
            tasks: vec![forwarder, watcher],
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ── Chunk sink ────────────────────────────────────────────────────────────────

/// Where the chunked writer puts its chunks.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Whether the current outbound channel accepts unacknowledged writes.
    async fn supports_unacknowledged(&self) -> Result<bool, TransportError>;

    async fn write_chunk(&self, chunk: &[u8], mode: WriteMode) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
struct ActiveLink {
    device: DeviceHandle,
    channels: ChannelPair,
}

/// Chunk sink bound to whatever link the adapter currently has open.
struct LinkSink {
    backend: Arc<dyn BleBackend>,
    active: Arc<RwLock<Option<ActiveLink>>>,
}

impl LinkSink {
    async fn current(&self) -> Result<ActiveLink, TransportError> {
        self.active
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl ChunkSink for LinkSink {
    async fn supports_unacknowledged(&self) -> Result<bool, TransportError> {
        Ok(self.current().await?.channels.supports_unacknowledged())
    }

    async fn write_chunk(&self, chunk: &[u8], mode: WriteMode) -> Result<(), TransportError> {
        let link = self.current().await?;
        self.backend
            .write(&link.device, &link.channels.outbound, chunk, mode)
            .await
    }
}

// ── Adapter ───────────────────────────────────────────────────────────────────

/// One logical link on top of a [`BleBackend`].
pub struct TransportAdapter {
    backend: Arc<dyn BleBackend>,
    settings: LinkSettings,
    active: Arc<RwLock<Option<ActiveLink>>>,
    target: Option<DeviceHandle>,
    subscription: Option<Subscription>,
    generation: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl TransportAdapter {
    /// Creates an adapter with no open link and the receiver for its events.
    pub fn new(
        backend: Arc<dyn BleBackend>,
        settings: LinkSettings,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let adapter = Self {
            backend,
            settings,
            active: Arc::new(RwLock::new(None)),
            target: None,
            subscription: None,
            generation: 0,
            events,
        };
        (adapter, rx)
    }

    /// A sink that writes to whatever link is open at the time of the write.
    pub fn sink(&self) -> Arc<dyn ChunkSink> {
        Arc::new(LinkSink {
            backend: Arc::clone(&self.backend),
            active: Arc::clone(&self.active),
        })
    }

    /// Current link generation.  Events with another tag are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// Opens (or re-opens) the link to `device`.
    ///
    /// Any previous subscription is dropped first.  On failure the link is
    /// closed again, including a radio connection made along the way; the
    /// caller decides whether to retry.
    pub async fn open(&mut self, device: &DeviceHandle) -> Result<ChannelPair, TransportError> {
        self.invalidate().await;
        self.target = Some(device.clone());

        match self.establish(device).await {
            Ok(pair) => Ok(pair),
            Err(e) => {
                debug!(%device, error = %e, "link setup failed; closing");
                self.close().await;
                Err(e)
            }
        }
    }

    async fn establish(&mut self, device: &DeviceHandle) -> Result<ChannelPair, TransportError> {
        // Watched from before the connect so a drop during setup is delivered.
        let disconnects = self.backend.disconnections(device).await?;

        if !self.backend.is_connected(device).await? {
            debug!(%device, "connecting");
            self.backend.connect(device).await?;
        }
        tokio::time::sleep(self.settings.post_connect_delay).await;

        let channels = self.backend.channels(device).await?;
        let pair = resolve_channels(&channels, &self.settings)?;
        let notifications = self.backend.subscribe(device, &pair.inbound).await?;

        self.generation += 1;
        self.subscription = Some(Subscription::spawn(
            self.generation,
            notifications,
            disconnects,
            self.events.clone(),
        ));
        *self.active.write().await = Some(ActiveLink {
            device: device.clone(),
            channels: pair.clone(),
        });

        info!(
            %device,
            generation = self.generation,
            write = %pair.outbound.uuid,
            notify = %pair.inbound.uuid,
            "link open"
        );
        Ok(pair)
    }

    /// Drops the channel pair and subscription after an unexpected loss.
    ///
    /// The radio link is already gone, so nothing is sent to the device.
    pub async fn invalidate(&mut self) {
        self.subscription = None;
        *self.active.write().await = None;
    }

    /// Closes the link on request: unsubscribe, then disconnect.
    ///
    /// The generation is bumped first so the resulting disconnect signal is
    /// filtered as stale.
    pub async fn close(&mut self) {
        self.generation += 1;
        let had_subscription = self.subscription.take().is_some();
        let link = self.active.write().await.take();

        if let Some(link) = &link {
            if had_subscription {
                if let Err(e) = self.backend.unsubscribe(&link.device, &link.channels.inbound).await {
                    debug!(error = %e, "unsubscribe failed during close");
                }
            }
        }

        if let Some(device) = self.target.take() {
            match self.backend.is_connected(&device).await {
                Ok(true) => {
                    if let Err(e) = self.backend.disconnect(&device).await {
                        warn!(%device, error = %e, "disconnect failed");
                    }
                }
                Ok(false) => {}
                Err(e) => debug!(%device, error = %e, "could not query link state"),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ble::mock::MockBleBackend;

    fn channel(uuid: Uuid, write: bool, wwr: bool, notify: bool) -> ChannelInfo {
        ChannelInfo {
            uuid,
            service_uuid: NUS_SERVICE_UUID,
            write,
            write_without_response: wwr,
            notify,
        }
    }

    // ── resolve_channels ──────────────────────────────────────────────────────

    #[test]
    fn test_resolve_channels_by_uuid() {
        // Arrange: a decoy writable characteristic listed before the real one
        let channels = vec![
            channel(Uuid::from_u128(1), true, false, false),
            channel(NUS_WRITE_UUID, true, true, false),
            channel(NUS_NOTIFY_UUID, false, false, true),
        ];

        // Act
        let pair = resolve_channels(&channels, &LinkSettings::default()).unwrap();

        // Assert
        assert_eq!(pair.outbound.uuid, NUS_WRITE_UUID);
        assert_eq!(pair.inbound.uuid, NUS_NOTIFY_UUID);
        assert!(pair.supports_unacknowledged());
    }

    #[test]
    fn test_resolve_channels_falls_back_to_capabilities() {
        let channels = vec![
            channel(Uuid::from_u128(10), false, false, true),
            channel(Uuid::from_u128(11), false, true, false),
        ];

        let pair = resolve_channels(&channels, &LinkSettings::default()).unwrap();

        assert_eq!(pair.outbound.uuid, Uuid::from_u128(11));
        assert_eq!(pair.inbound.uuid, Uuid::from_u128(10));
    }

    #[test]
    fn test_resolve_channels_without_service_is_protocol_mismatch() {
        let mut other = channel(NUS_WRITE_UUID, true, false, false);
        other.service_uuid = Uuid::from_u128(99);

        let err = resolve_channels(&[other], &LinkSettings::default()).unwrap_err();

        assert!(matches!(err, TransportError::ProtocolMismatch(_)));
    }

    #[test]
    fn test_resolve_channels_without_notify_is_protocol_mismatch() {
        let channels = vec![channel(NUS_WRITE_UUID, true, false, false)];
        let err = resolve_channels(&channels, &LinkSettings::default()).unwrap_err();
        assert_eq!(
            err,
            TransportError::ProtocolMismatch("no notifiable characteristic".into())
        );
    }

    // ── Adapter ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_open_connects_and_forwards_notifications() {
        // Arrange
        let mock = Arc::new(MockBleBackend::with_typist());
        let device = mock.typist_handle();
        let (mut adapter, mut events) = TransportAdapter::new(mock.clone(), LinkSettings::default());

        // Act
        adapter.open(&device).await.unwrap();
        mock.notify(b"hello");

        // Assert
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(
            events.recv().await,
            Some(LinkEvent::Notification {
                generation: 1,
                payload: b"hello".to_vec()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_does_not_duplicate_notifications() {
        // Arrange
        let mock = Arc::new(MockBleBackend::with_typist());
        let device = mock.typist_handle();
        let (mut adapter, mut events) = TransportAdapter::new(mock.clone(), LinkSettings::default());
        adapter.open(&device).await.unwrap();

        // Act
        adapter.open(&device).await.unwrap();
        mock.notify(b"x");
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Assert: exactly one delivery, tagged with the new generation
        assert_eq!(
            events.try_recv().ok(),
            Some(LinkEvent::Notification {
                generation: 2,
                payload: b"x".to_vec()
            })
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_makes_own_drop_stale() {
        // Arrange
        let mock = Arc::new(MockBleBackend::with_typist());
        let device = mock.typist_handle();
        let (mut adapter, _events) = TransportAdapter::new(mock.clone(), LinkSettings::default());
        adapter.open(&device).await.unwrap();
        let opened_generation = adapter.generation();

        // Act
        adapter.close().await;

        // Assert
        assert_ne!(adapter.generation(), opened_generation);
        assert!(!adapter.is_open());
        assert!(!mock.is_device_connected(&device));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_without_link_is_not_connected() {
        let mock = Arc::new(MockBleBackend::with_typist());
        let (adapter, _events) = TransportAdapter::new(mock, LinkSettings::default());

        let err = adapter.sink().write_chunk(b"a", WriteMode::WithResponse).await.unwrap_err();

        assert_eq!(err, TransportError::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_drop_is_reported_with_generation() {
        let mock = Arc::new(MockBleBackend::with_typist());
        let device = mock.typist_handle();
        let (mut adapter, mut events) = TransportAdapter::new(mock.clone(), LinkSettings::default());
        adapter.open(&device).await.unwrap();

        mock.drop_link();

        assert_eq!(events.recv().await, Some(LinkEvent::Disconnected { generation: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_setup_releases_radio_link() {
        // Arrange: the device connects but exposes no usable characteristics
        let mock = Arc::new(MockBleBackend::with_typist());
        mock.channels.lock().unwrap().clear();
        let device = mock.typist_handle();
        let (mut adapter, _events) = TransportAdapter::new(mock.clone(), LinkSettings::default());

        // Act
        let result = adapter.open(&device).await;

        // Assert
        assert!(matches!(result, Err(TransportError::ProtocolMismatch(_))));
        assert_eq!(mock.connect_count(), 1);
        assert!(!mock.is_device_connected(&device));
        assert!(!adapter.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_during_post_connect_delay_fails_open() {
        // Arrange
        let mock = Arc::new(MockBleBackend::with_typist());
        let device = mock.typist_handle();
        let (mut adapter, _events) = TransportAdapter::new(mock.clone(), LinkSettings::default());
        let dropper = mock.clone();

        // Act: the peripheral vanishes halfway through the settle delay
        let (result, ()) = tokio::join!(adapter.open(&device), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            dropper.drop_link();
        });

        // Assert
        assert_eq!(result.unwrap_err(), TransportError::NotConnected);
        assert!(!adapter.is_open());
    }
}

