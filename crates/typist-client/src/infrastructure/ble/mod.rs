//! BLE backends.
//!
//! [`BtleplugBackend`] drives real hardware through `btleplug`, which wraps
//! BlueZ on Linux, CoreBluetooth on macOS, and WinRT on Windows.  The `mock`
//! sub-module provides the in-memory backend used by tests.
//!
//! # Device identity
//!
//! `btleplug` identifies peripherals with a platform-specific `PeripheralId`
//! (a MAC address on BlueZ and WinRT, a UUID on CoreBluetooth).  Its string
//! form is what gets persisted as the device id, and devices are found again
//! by comparing against it.
//!
//! # The chooser
//!
//! There is no system device picker on a terminal.  `request_device` scans
//! for the configured window and picks the first peripheral whose advertised
//! name matches the filter.  Finding none counts as a cancelled chooser.

pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use typist_core::DeviceHandle;

use crate::application::transport::{
    BleBackend, ChannelInfo, DeviceFilter, DisconnectStream, NotificationStream, TransportError,
    WriteMode,
};

/// Default scan window for the chooser and for first-run discovery.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);

fn backend_error(error: btleplug::Error) -> TransportError {
    TransportError::Backend(error.to_string())
}

/// Backend over the first Bluetooth adapter of this machine.
#[derive(Debug)]
pub struct BtleplugBackend {
    adapter: Adapter,
    scan_window: Duration,
}

impl BtleplugBackend {
    /// Opens the first adapter reported by the platform.
    ///
    /// # Errors
    ///
    /// [`TransportError::NoAdapter`] when the machine has no Bluetooth
    /// adapter, [`TransportError::Backend`] when the stack is unavailable.
    pub async fn new(scan_window: Duration) -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(backend_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend_error)?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        match adapter.adapter_info().await {
            Ok(info) => info!(adapter = %info, "using Bluetooth adapter"),
            Err(e) => debug!(error = %e, "adapter info unavailable"),
        }
        Ok(Self {
            adapter,
            scan_window,
        })
    }

    /// Scans for the configured window.
    async fn scan(&self) -> Result<(), TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend_error)?;
        sleep(self.scan_window).await;
        if let Err(e) = self.adapter.stop_scan().await {
            debug!(error = %e, "failed to stop scan cleanly");
        }
        Ok(())
    }

    async fn handles(&self) -> Result<Vec<(Peripheral, DeviceHandle)>, TransportError> {
        let peripherals = self.adapter.peripherals().await.map_err(backend_error)?;
        let mut handles = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let name = match peripheral.properties().await {
                Ok(Some(properties)) => properties.local_name,
                Ok(None) => None,
                Err(e) => {
                    debug!(error = %e, "could not read peripheral properties");
                    None
                }
            };
            let handle = DeviceHandle::new(peripheral.id().to_string(), name);
            handles.push((peripheral, handle));
        }
        Ok(handles)
    }

    async fn peripheral(&self, device: &DeviceHandle) -> Result<Peripheral, TransportError> {
        self.adapter
            .peripherals()
            .await
            .map_err(backend_error)?
            .into_iter()
            .find(|p| p.id().to_string() == device.id)
            .ok_or_else(|| TransportError::DeviceNotFound(device.id.clone()))
    }

    async fn characteristic(
        &self,
        peripheral: &Peripheral,
        channel: &ChannelInfo,
    ) -> Result<Characteristic, TransportError> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == channel.uuid && c.service_uuid == channel.service_uuid)
            .ok_or_else(|| {
                TransportError::ProtocolMismatch(format!("characteristic {} gone", channel.uuid))
            })
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    #[instrument(skip(self), level = "debug", fields(pattern = %filter.name_pattern))]
    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceHandle, TransportError> {
        info!(window = ?self.scan_window, "scanning for devices");
        self.scan().await?;
        self.handles()
            .await?
            .into_iter()
            .map(|(_, handle)| handle)
            .find(|handle| handle.name_matches(&filter.name_pattern))
            .ok_or(TransportError::ChooserCancelled)
    }

    async fn known_devices(&self) -> Result<Vec<DeviceHandle>, TransportError> {
        let mut handles = self.handles().await?;
        if handles.is_empty() {
            // Some stacks only list peripherals seen during a scan.
            self.scan().await?;
            handles = self.handles().await?;
        }
        Ok(handles.into_iter().map(|(_, handle)| handle).collect())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.connect().await.map_err(backend_error)?;
        peripheral.discover_services().await.map_err(backend_error)?;
        Ok(())
    }

    async fn is_connected(&self, device: &DeviceHandle) -> Result<bool, TransportError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.is_connected().await.map_err(backend_error)
    }

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device).await?;
        peripheral.disconnect().await.map_err(backend_error)
    }

    async fn channels(&self, device: &DeviceHandle) -> Result<Vec<ChannelInfo>, TransportError> {
        let peripheral = self.peripheral(device).await?;
        if peripheral.services().is_empty() {
            peripheral.discover_services().await.map_err(backend_error)?;
        }
        Ok(peripheral
            .characteristics()
            .into_iter()
            .map(|c| ChannelInfo {
                uuid: c.uuid,
                service_uuid: c.service_uuid,
                write: c.properties.contains(CharPropFlags::WRITE),
                write_without_response: c
                    .properties
                    .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
                notify: c
                    .properties
                    .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
            })
            .collect())
    }

    async fn write(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
        chunk: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device).await?;
        let characteristic = self.characteristic(&peripheral, channel).await?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        peripheral
            .write(&characteristic, chunk, write_type)
            .await
            .map_err(backend_error)
    }

    async fn subscribe(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
    ) -> Result<NotificationStream, TransportError> {
        let peripheral = self.peripheral(device).await?;
        let characteristic = self.characteristic(&peripheral, channel).await?;
        // Take the stream before enabling notifications so nothing is missed.
        let notifications = peripheral.notifications().await.map_err(backend_error)?;
        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(backend_error)?;

        let uuid = characteristic.uuid;
        Ok(Box::pin(notifications.filter_map(move |n| async move {
            (n.uuid == uuid).then_some(n.value)
        })))
    }

    async fn unsubscribe(
        &self,
        device: &DeviceHandle,
        channel: &ChannelInfo,
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(device).await?;
        let characteristic = self.characteristic(&peripheral, channel).await?;
        peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(backend_error)
    }

    async fn disconnections(&self, device: &DeviceHandle) -> Result<DisconnectStream, TransportError> {
        let target = self.peripheral(device).await?.id();
        let events = self.adapter.events().await.map_err(backend_error)?;
        Ok(Box::pin(events.filter_map(move |event| {
            let target = target.clone();
            async move {
                match event {
                    CentralEvent::DeviceDisconnected(id) if id == target => Some(()),
                    _ => None,
                }
            }
        })))
    }
}
