use parking_lot::Mutex;

use crate::signal::DeviceEvent;
use crate::types::{Device, DeviceId};

/// Devices currently pending a decision, oldest first.
///
/// Every operation takes the lock for the duration of the map access only.
/// Callers must never hold a registry borrow across an await point; the API
/// hands out clones for that reason.
///
/// Only a handful of devices are ever pending, so lookups scan.
#[derive(Debug, Default)]
pub struct Registry {
    devices: Mutex<Vec<Device>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `device`, replacing a pending entry with the same id. A
    /// replaced entry keeps its position.
    pub fn insert(&self, device: Device) -> Option<Device> {
        let mut devices = self.devices.lock();
        match devices.iter_mut().find(|d| d.id == device.id) {
            Some(slot) => Some(std::mem::replace(slot, device)),
            None => {
                devices.push(device);
                None
            }
        }
    }

    /// Removes `id` if pending. Unknown ids are not an error.
    pub fn remove(&self, id: DeviceId) -> Option<Device> {
        let mut devices = self.devices.lock();
        let pos = devices.iter().position(|d| d.id == id)?;
        Some(devices.remove(pos))
    }

    pub fn get(&self, id: DeviceId) -> Option<Device> {
        self.devices.lock().iter().find(|d| d.id == id).cloned()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.lock().iter().any(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Copy of the pending devices in insertion order.
    pub fn snapshot_ordered(&self) -> Vec<Device> {
        self.devices.lock().clone()
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.lock().iter().map(|d| d.id).collect()
    }

    /// Applies a decoded event. Returns whether the registry changed.
    pub fn apply(&self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::Inserted(device) => {
                self.insert(device);
                true
            }
            DeviceEvent::Removed(id) | DeviceEvent::PolicyChanged { id, .. } => {
                self.remove(id).is_some()
            }
        }
    }

    pub fn clear(&self) {
        self.devices.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Attribute};

    #[test]
    fn insert_replaces_in_place() {
        let registry = Registry::new();
        registry.insert(Device::new(1).with_attribute(Attribute::Name, "first"));
        registry.insert(Device::new(2));
        registry.insert(Device::new(1).with_attribute(Attribute::Name, "second"));

        assert_eq!(registry.ids(), vec![1, 2]);
        assert_eq!(
            registry.get(1).and_then(|d| d.attributes.name),
            Some("second".to_string())
        );
    }

    #[test]
    fn remove_unknown_is_noop() {
        let registry = Registry::new();
        assert_eq!(registry.remove(99), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_keeps_insertion_order_after_removal() {
        let registry = Registry::new();
        for id in [5, 3, 9, 1] {
            registry.insert(Device::new(id));
        }
        registry.remove(3);
        let ids: Vec<_> = registry.snapshot_ordered().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![5, 9, 1]);
    }

    #[test]
    fn policy_change_removes() {
        let registry = Registry::new();
        registry.insert(Device::new(42));
        assert!(registry.apply(DeviceEvent::PolicyChanged {
            id: 42,
            granted: Action::Reject
        }));
        assert!(!registry.apply(DeviceEvent::Removed(42)));
        assert_eq!(registry.len(), 0);
    }
}
