use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{AdvertisementCallback, NotificationStream, Transport};
use crate::{DeviceId, DiscoveredDevice, ServiceInfo};

/// `Transport` backed by the platform bluetooth stack.
pub struct BtleTransport {
    _manager: Manager,
    adapter: Adapter,
    /// Peripherals seen during the last scan, by the address handed out
    peripherals: HashMap<DeviceId, Peripheral>,
}

impl BtleTransport {
    /// Open the bluetooth adapter at `adapter_index`.
    pub async fn new(adapter_index: usize) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let mut adapters = manager.adapters().await?;

        if adapter_index >= adapters.len() {
            return Err(TransportError::NoAdapter {
                index: adapter_index,
            });
        }

        let adapter = adapters.swap_remove(adapter_index);

        log::trace!("Using adapter: {:?}", adapter);

        Ok(Self {
            _manager: manager,
            adapter,
            peripherals: HashMap::new(),
        })
    }

    async fn report(
        &mut self,
        id: &PeripheralId,
        on_advertisement: &mut AdvertisementCallback<'_>,
    ) -> Result<(), TransportError> {
        let peripheral = self.adapter.peripheral(id).await?;
        let properties = match peripheral.properties().await? {
            Some(properties) => properties,
            None => return Ok(()),
        };

        let address = device_id(&peripheral);
        let device = DiscoveredDevice::new(address.clone(), properties.local_name);
        self.peripherals.insert(address, peripheral);

        on_advertisement(device, &properties.services);
        Ok(())
    }

    fn peripheral(&self, device: &DiscoveredDevice) -> Result<Peripheral, TransportError> {
        self.peripherals
            .get(&device.address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(device.address.clone()))
    }
}

/// Runs `stop` when dropped unless disarmed first.
struct ScanGuard<F: FnOnce()> {
    stop: Option<F>,
}

impl<F: FnOnce()> ScanGuard<F> {
    fn new(stop: F) -> Self {
        Self { stop: Some(stop) }
    }

    fn disarm(mut self) {
        self.stop = None;
    }
}

impl<F: FnOnce()> Drop for ScanGuard<F> {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

/// Stop the scan in the background when `scan` is cancelled mid-window.
fn stop_scan_on_drop(adapter: Adapter) -> ScanGuard<impl FnOnce()> {
    ScanGuard::new(move || {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return,
        };
        handle.spawn(async move {
            match adapter.stop_scan().await {
                Ok(()) => log::info!("Scan stopped"),
                Err(e) => log::warn!("Could not stop the scan: {}", e),
            }
        });
    })
}

fn device_id(peripheral: &Peripheral) -> DeviceId {
    let address = peripheral.address();
    if address == BDAddr::default() {
        // CoreBluetooth does not expose addresses
        DeviceId::new(format!("{:?}", peripheral.id()))
    } else {
        DeviceId::new(address.to_string())
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Connection = Peripheral;

    async fn scan(
        &mut self,
        window: Duration,
        on_advertisement: &mut AdvertisementCallback<'_>,
    ) -> Result<(), TransportError> {
        log::info!("Starting the scan");

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        let guard = stop_scan_on_drop(self.adapter.clone());

        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let id = match event {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServicesAdvertisement { id, .. } => id,
                _ => continue,
            };

            if let Err(e) = self.report(&id, on_advertisement).await {
                log::debug!("Could not read advertisement from {:?}: {}", id, e);
            }
        }

        guard.disarm();
        self.adapter.stop_scan().await?;

        log::info!("Scan stopped");
        Ok(())
    }

    async fn connect(&mut self, device: &DiscoveredDevice) -> Result<Peripheral, TransportError> {
        let peripheral = self.peripheral(device)?;

        if !peripheral.is_connected().await? {
            log::debug!("Connecting to device {}", device.address);
            peripheral.connect().await?;
        }

        Ok(peripheral)
    }

    async fn list_services(
        &mut self,
        peripheral: &Peripheral,
    ) -> Result<Vec<ServiceInfo>, TransportError> {
        let mut services = peripheral.services();
        if services.is_empty() {
            log::debug!("Discovering services for {}", peripheral.address());
            peripheral.discover_services().await?;
            services = peripheral.services();
        }

        Ok(services.iter().map(ServiceInfo::from).collect::<Vec<_>>())
    }

    async fn subscribe(
        &mut self,
        peripheral: &Peripheral,
        characteristic: Uuid,
    ) -> Result<NotificationStream, TransportError> {
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))?;

        peripheral.subscribe(&characteristic).await?;

        let stream = peripheral.notifications().await?;
        let uuid = characteristic.uuid;

        Ok(Box::pin(stream.filter_map(move |n| async move {
            if n.uuid == uuid {
                Some(n.value)
            } else {
                None
            }
        })))
    }

    async fn is_connected(&mut self, peripheral: &Peripheral) -> Result<bool, TransportError> {
        Ok(peripheral.is_connected().await?)
    }

    async fn disconnect(&mut self, peripheral: &Peripheral) -> Result<(), TransportError> {
        Ok(peripheral.disconnect().await?)
    }
}
