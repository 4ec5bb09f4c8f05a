use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use crate::common::services::HEART_RATE;

/// Platform assigned identifier of a peripheral, stable for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: DeviceId,
    pub name: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(address: DeviceId, name: Option<String>) -> Self {
        Self { address, name }
    }

    /// Local name of the device, or a placeholder when it did not advertise one
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown device")
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.address)
    }
}

/// Collects heart rate peripherals seen during one scan window.
///
/// Advertisements without the Heart Rate service are dropped. The first
/// accepted advertisement from an address wins; later ones from the same
/// address are ignored, even if they carry a different name.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    /// Addresses that already have an entry
    seen: HashSet<DeviceId>,
    /// Accepted devices in discovery order
    devices: Vec<DiscoveredDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the advertisement created a new entry.
    pub fn on_advertisement(&mut self, device: DiscoveredDevice, services: &[Uuid]) -> bool {
        if !services.contains(&HEART_RATE) {
            log::trace!("Ignoring {}: no heart rate service", device.address);
            return false;
        }

        if !self.seen.insert(device.address.clone()) {
            // The device has already been registered.
            return false;
        }

        log::info!("Found heart rate device: {}", device);
        self.devices.push(device);
        true
    }

    pub fn results(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    pub fn into_results(self) -> Vec<DiscoveredDevice> {
        self.devices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::bleuuid::uuid_from_u16;

    const BATTERY: Uuid = uuid_from_u16(0x180F);

    fn device(address: &str, name: Option<&str>) -> DiscoveredDevice {
        DiscoveredDevice::new(DeviceId::new(address), name.map(String::from))
    }

    #[test]
    fn first_seen_name_wins() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.on_advertisement(device("AA:01", Some("Band 7")), &[HEART_RATE]));
        assert!(!registry.on_advertisement(device("AA:01", Some("Band 7 Pro")), &[HEART_RATE]));

        assert_eq!(registry.results(), &[device("AA:01", Some("Band 7"))]);
    }

    #[test]
    fn unnamed_first_advertisement_still_wins() {
        let mut registry = DeviceRegistry::new();
        registry.on_advertisement(device("AA:01", None), &[HEART_RATE]);
        registry.on_advertisement(device("AA:01", Some("H10")), &[BATTERY, HEART_RATE]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.results()[0].display_name(), "unknown device");
    }

    #[test]
    fn requires_heart_rate_service() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.on_advertisement(device("AA:01", Some("Mouse")), &[BATTERY]));
        assert!(!registry.on_advertisement(device("AA:02", Some("Tag")), &[]));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejected_advertisement_does_not_block_a_later_match() {
        let mut registry = DeviceRegistry::new();
        registry.on_advertisement(device("AA:01", Some("Strap")), &[]);
        registry.on_advertisement(device("AA:01", Some("Strap")), &[HEART_RATE]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keeps_discovery_order() {
        let mut registry = DeviceRegistry::new();
        for address in ["C", "A", "B", "A", "C"] {
            registry.on_advertisement(device(address, None), &[HEART_RATE]);
        }
        let order: Vec<_> = registry
            .into_results()
            .into_iter()
            .map(|d| d.address.to_string())
            .collect();
        assert_eq!(order, ["C", "A", "B"]);
    }

    #[test]
    fn display_includes_address() {
        assert_eq!(device("AA:01", Some("H10")).to_string(), "H10 (AA:01)");
    }
}
