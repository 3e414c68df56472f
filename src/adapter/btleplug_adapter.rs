//! Production [`Adapter`] implementation over `btleplug`.
//!
//! `btleplug`'s API is async end-to-end; this adapter owns a dedicated
//! multi-thread [`tokio::runtime::Runtime`] and blocks on it from every
//! synchronous [`Adapter`] method, so the session above it never touches an
//! async runtime directly.

use std::collections::VecDeque;
use std::sync::Arc;

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::api::CentralEvent;
use btleplug::platform::{Adapter as PlatformAdapter, Manager, Peripheral};
use futures::StreamExt;
use regex::Regex;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Adapter, AdapterEvent, Handle as HandleTrait, SCAN_POLL_INTERVAL};
use crate::error::Error;
use crate::uuid::Uuid;
use crate::SyncMutex;

fn transport_err(e: btleplug::Error) -> Error {
    Error::Transport(e.to_string())
}

/// A connected `btleplug` peripheral plus the background listeners that
/// feed its [`AdapterEvent`] queue.
#[derive(Debug)]
pub struct BtleplugHandle {
    peripheral: Peripheral,
    events: Arc<SyncMutex<VecDeque<AdapterEvent>>>,
}

impl HandleTrait for BtleplugHandle {
    fn poll_events(&self) -> Vec<AdapterEvent> {
        self.events.lock().drain(..).collect()
    }
}

/// The real BLE transport: one OS Bluetooth adapter, driven through
/// `btleplug` from a private Tokio runtime.
pub struct BtleplugAdapter {
    runtime: Runtime,
    adapter: PlatformAdapter,
}

impl std::fmt::Debug for BtleplugAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugAdapter").finish_non_exhaustive()
    }
}

impl BtleplugAdapter {
    /// Opens the first available system Bluetooth adapter.
    pub fn open() -> crate::Result<Self> {
        let runtime = Runtime::new().map_err(|e| Error::Transport(e.to_string()))?;
        let adapter = runtime.block_on(async {
            let manager = Manager::new().await.map_err(transport_err)?;
            let adapters = manager.adapters().await.map_err(transport_err)?;
            adapters
                .into_iter()
                .next()
                .ok_or_else(|| Error::Transport("no Bluetooth adapter present".into()))
        })?;
        Ok(Self { runtime, adapter })
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> crate::Result<Characteristic> {
        let target: uuid::Uuid = uuid.into();
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target)
            .ok_or_else(|| Error::Transport(format!("characteristic {uuid:?} not on peripheral")))
    }
}

impl Adapter for BtleplugAdapter {
    type Handle = BtleplugHandle;

    fn scan(
        &self,
        name_pattern: &Regex,
        cancel: &CancellationToken,
    ) -> crate::Result<Option<(String, String)>> {
        self.runtime.block_on(async {
            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(transport_err)?;
            loop {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                for peripheral in self.adapter.peripherals().await.map_err(transport_err)? {
                    let Some(props) = peripheral.properties().await.map_err(transport_err)? else {
                        continue;
                    };
                    if let Some(name) = props.local_name {
                        if name_pattern.is_match(&name) {
                            return Ok(Some((name, peripheral.address().to_string())));
                        }
                    }
                }
                tokio::time::sleep(SCAN_POLL_INTERVAL).await;
            }
        })
    }

    fn connect(&self, address: &str) -> crate::Result<Self::Handle> {
        self.runtime.block_on(async {
            let peripheral = self
                .adapter
                .peripherals()
                .await
                .map_err(transport_err)?
                .into_iter()
                .find(|p| p.address().to_string() == address)
                .ok_or_else(|| Error::Transport(format!("peripheral {address} not found")))?;
            peripheral.connect().await.map_err(transport_err)?;
            peripheral.discover_services().await.map_err(transport_err)?;

            let events = Arc::new(SyncMutex::new(VecDeque::new()));
            self.spawn_notification_listener(peripheral.clone(), events.clone());
            self.spawn_disconnect_listener(peripheral.id(), events.clone());

            Ok(BtleplugHandle { peripheral, events })
        })
    }

    fn read_characteristic(&self, handle: &Self::Handle, uuid: Uuid) -> crate::Result<Vec<u8>> {
        self.runtime.block_on(async {
            let characteristic = Self::find_characteristic(&handle.peripheral, uuid)?;
            handle
                .peripheral
                .read(&characteristic)
                .await
                .map_err(transport_err)
        })
    }

    fn write_characteristic(
        &self,
        handle: &Self::Handle,
        uuid: Uuid,
        data: &[u8],
    ) -> crate::Result<()> {
        self.runtime.block_on(async {
            let characteristic = Self::find_characteristic(&handle.peripheral, uuid)?;
            handle
                .peripheral
                .write(&characteristic, data, WriteType::WithoutResponse)
                .await
                .map_err(transport_err)
        })
    }

    fn subscribe(&self, handle: &Self::Handle, uuid: Uuid) -> crate::Result<()> {
        self.runtime.block_on(async {
            let characteristic = Self::find_characteristic(&handle.peripheral, uuid)?;
            handle
                .peripheral
                .subscribe(&characteristic)
                .await
                .map_err(transport_err)
        })
    }

    fn manufacturer_data(&self, handle: &Self::Handle) -> Vec<u8> {
        self.runtime.block_on(async {
            match handle.peripheral.properties().await {
                Ok(Some(props)) => props
                    .manufacturer_data
                    .into_values()
                    .next()
                    .unwrap_or_default(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "reading peripheral properties for manufacturer data failed");
                    Vec::new()
                }
            }
        })
    }

    fn disconnect(&self, handle: &Self::Handle) {
        if let Err(e) = self.runtime.block_on(handle.peripheral.disconnect()) {
            warn!(error = %e, "peripheral disconnect failed");
        }
    }
}

impl BtleplugAdapter {
    fn spawn_notification_listener(
        &self,
        peripheral: Peripheral,
        events: Arc<SyncMutex<VecDeque<AdapterEvent>>>,
    ) {
        self.runtime.spawn(async move {
            let mut stream = match peripheral.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "subscribing to peripheral notification stream failed");
                    return;
                }
            };
            while let Some(notification) = stream.next().await {
                events.lock().push_back(AdapterEvent::Notification {
                    uuid: notification.uuid.into(),
                    data: notification.value,
                });
            }
        });
    }

    fn spawn_disconnect_listener(
        &self,
        peripheral_id: btleplug::platform::PeripheralId,
        events: Arc<SyncMutex<VecDeque<AdapterEvent>>>,
    ) {
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            let mut stream = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "subscribing to adapter event stream failed");
                    return;
                }
            };
            while let Some(event) = stream.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        debug!(?id, "peripheral disconnected");
                        events.lock().push_back(AdapterEvent::Disconnected);
                        break;
                    }
                }
            }
        });
    }
}
