use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::TransportError;
use crate::{DiscoveredDevice, ServiceInfo};

/// Raw notification payloads, in arrival order. The stream ends when the
/// link is lost.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Called once per advertisement with the device and its advertised services.
pub type AdvertisementCallback<'a> = dyn FnMut(DiscoveredDevice, &[Uuid]) + Send + 'a;

/// The BLE stack a session runs on.
#[async_trait]
pub trait Transport: Send {
    /// Handle to an established connection.
    type Connection: Send + Sync;

    /// Scan for `window`, reporting every advertisement seen.
    async fn scan(
        &mut self,
        window: Duration,
        on_advertisement: &mut AdvertisementCallback<'_>,
    ) -> Result<(), TransportError>;

    async fn connect(&mut self, device: &DiscoveredDevice) -> Result<Self::Connection, TransportError>;

    async fn list_services(
        &mut self,
        connection: &Self::Connection,
    ) -> Result<Vec<ServiceInfo>, TransportError>;

    async fn subscribe(
        &mut self,
        connection: &Self::Connection,
        characteristic: Uuid,
    ) -> Result<NotificationStream, TransportError>;

    async fn is_connected(&mut self, connection: &Self::Connection) -> Result<bool, TransportError>;

    async fn disconnect(&mut self, connection: &Self::Connection) -> Result<(), TransportError>;
}
