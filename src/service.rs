use btleplug::api::Service as BtleService;
use uuid::Uuid;

use crate::CharacteristicInfo;

/// A GATT service found on a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    pub fn new(uuid: Uuid, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == uuid)
    }
}

impl From<&BtleService> for ServiceInfo {
    fn from(service: &BtleService) -> Self {
        Self {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .iter()
                .map(CharacteristicInfo::from)
                .collect::<Vec<_>>(),
        }
    }
}

/// Finds a subscribable characteristic `characteristic` inside service `service`.
pub fn find_notifiable(
    services: &[ServiceInfo],
    service: Uuid,
    characteristic: Uuid,
) -> Option<&CharacteristicInfo> {
    services
        .iter()
        .filter(|s| s.uuid == service)
        .find_map(|s| s.characteristic(characteristic))
        .filter(|c| c.notify)
}
