//! Decoding of usbguard device signals into registry events.

use std::collections::HashMap;

use crate::types::{Action, Attribute, Device, DeviceAttributes, DeviceId, Interest};

/// Presence event code for a newly inserted device.
pub const PRESENCE_INSERTED: u32 = 1;
/// Presence event code for a removed device.
pub const PRESENCE_REMOVED: u32 = 3;

/// Which of the two subscribed signal channels delivered a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalChannel {
    /// `DevicePresenceChanged`
    Presence,
    /// `DevicePolicyChanged`
    Policy,
}

impl SignalChannel {
    pub fn member(self) -> &'static str {
        match self {
            SignalChannel::Presence => "DevicePresenceChanged",
            SignalChannel::Policy => "DevicePolicyChanged",
        }
    }
}

/// Positional signal payload as delivered on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignal {
    pub channel: SignalChannel,
    pub id: DeviceId,
    pub state: u32,
    pub old_state: u32,
    /// Device rule, e.g. `block id 0781:5581 name "Ultra"`.
    pub rule: String,
    pub attributes: HashMap<String, String>,
}

/// Registry mutation derived from a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Inserted(Device),
    Removed(DeviceId),
    PolicyChanged { id: DeviceId, granted: Action },
}

impl DeviceEvent {
    pub fn device_id(&self) -> DeviceId {
        match self {
            DeviceEvent::Inserted(device) => device.id,
            DeviceEvent::Removed(id) => *id,
            DeviceEvent::PolicyChanged { id, .. } => *id,
        }
    }
}

/// Turns a raw signal into an event, or `None` when the signal does not
/// concern pending devices.
pub fn decode(signal: &RawSignal, interest: &Interest) -> Option<DeviceEvent> {
    match signal.channel {
        SignalChannel::Presence => match signal.state {
            PRESENCE_INSERTED if signal.rule.contains("block id") => {
                Some(DeviceEvent::Inserted(Device {
                    id: signal.id,
                    attributes: attributes_from_map(&signal.attributes, interest),
                }))
            }
            PRESENCE_REMOVED => Some(DeviceEvent::Removed(signal.id)),
            _ => None,
        },
        SignalChannel::Policy => [Action::Allow, Action::Reject]
            .into_iter()
            .find(|action| signal.rule.contains(&format!("{action} id")))
            .map(|granted| DeviceEvent::PolicyChanged {
                id: signal.id,
                granted,
            }),
    }
}

/// Translates bus keys (`via-port`) into attributes, keeping only the ones in
/// `interest`.
pub fn attributes_from_map(map: &HashMap<String, String>, interest: &Interest) -> DeviceAttributes {
    let mut attributes = DeviceAttributes::default();
    for attr in interest.iter() {
        attributes.set(attr, map.get(attr.bus_key()).cloned());
    }
    attributes
}

/// Keys in `map` that are not recognised attributes. Only used for logging.
pub fn unknown_keys(map: &HashMap<String, String>) -> Vec<&str> {
    map.keys()
        .map(String::as_str)
        .filter(|k| Attribute::from_bus_key(k).is_none())
        .collect()
}
