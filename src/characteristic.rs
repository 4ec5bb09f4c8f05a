use btleplug::api::{CharPropFlags, Characteristic as BtleCharacteristic};
use uuid::Uuid;

/// A characteristic exposed by a connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// Whether the characteristic can be subscribed to
    pub notify: bool,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, notify: bool) -> Self {
        Self { uuid, notify }
    }
}

impl From<&BtleCharacteristic> for CharacteristicInfo {
    fn from(characteristic: &BtleCharacteristic) -> Self {
        Self {
            uuid: characteristic.uuid,
            notify: characteristic.properties.contains(CharPropFlags::NOTIFY),
        }
    }
}
