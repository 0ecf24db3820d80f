use std::fmt;
use std::str::FromStr;

use crate::error::ParseActionError;

/// Identifier assigned by usbguard to a device for as long as it stays plugged.
pub type DeviceId = u32;

/// Device attributes the companion knows how to display.
///
/// The set is closed: usbguard may send more keys, those are dropped by the
/// decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Id,
    Name,
    ViaPort,
    Hash,
    ParentHash,
    Serial,
    WithInterface,
}

/// `(attribute, key on the bus, placeholder name)`
const ATTRIBUTE_TABLE: [(Attribute, &str, &str); 7] = [
    (Attribute::Id, "id", "id"),
    (Attribute::Name, "name", "name"),
    (Attribute::ViaPort, "via-port", "via_port"),
    (Attribute::Hash, "hash", "hash"),
    (Attribute::ParentHash, "parent-hash", "parent_hash"),
    (Attribute::Serial, "serial", "serial"),
    (Attribute::WithInterface, "with-interface", "with_interface"),
];

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::Id,
        Attribute::Name,
        Attribute::ViaPort,
        Attribute::Hash,
        Attribute::ParentHash,
        Attribute::Serial,
        Attribute::WithInterface,
    ];

    /// Key used by usbguard in signal attribute maps and device rules.
    pub fn bus_key(self) -> &'static str {
        ATTRIBUTE_TABLE[self as usize].1
    }

    /// Name used in format templates.
    pub fn placeholder(self) -> &'static str {
        ATTRIBUTE_TABLE[self as usize].2
    }

    pub fn from_bus_key(key: &str) -> Option<Self> {
        ATTRIBUTE_TABLE
            .iter()
            .find(|(_, bus, _)| *bus == key)
            .map(|(attr, _, _)| *attr)
    }

    pub fn from_placeholder(name: &str) -> Option<Self> {
        ATTRIBUTE_TABLE
            .iter()
            .find(|(_, _, placeholder)| *placeholder == name)
            .map(|(attr, _, _)| *attr)
    }
}

/// Display attributes of a pending device. Every attribute is always
/// represented; absent ones are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub id: Option<String>,
    pub name: Option<String>,
    pub via_port: Option<String>,
    pub hash: Option<String>,
    pub parent_hash: Option<String>,
    pub serial: Option<String>,
    pub with_interface: Option<String>,
}

impl DeviceAttributes {
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        match attr {
            Attribute::Id => self.id.as_deref(),
            Attribute::Name => self.name.as_deref(),
            Attribute::ViaPort => self.via_port.as_deref(),
            Attribute::Hash => self.hash.as_deref(),
            Attribute::ParentHash => self.parent_hash.as_deref(),
            Attribute::Serial => self.serial.as_deref(),
            Attribute::WithInterface => self.with_interface.as_deref(),
        }
    }

    /// Stores `value`, treating an empty string as absent.
    pub fn set(&mut self, attr: Attribute, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        let slot = match attr {
            Attribute::Id => &mut self.id,
            Attribute::Name => &mut self.name,
            Attribute::ViaPort => &mut self.via_port,
            Attribute::Hash => &mut self.hash,
            Attribute::ParentHash => &mut self.parent_hash,
            Attribute::Serial => &mut self.serial,
            Attribute::WithInterface => &mut self.with_interface,
        };
        *slot = value;
    }

    /// Keeps only the attributes in `interest`.
    pub fn retain(&mut self, interest: &Interest) {
        for attr in Attribute::ALL {
            if !interest.contains(attr) {
                self.set(attr, None);
            }
        }
    }
}

/// One pending (blocked) device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub attributes: DeviceAttributes,
}

impl Device {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            attributes: DeviceAttributes::default(),
        }
    }

    pub fn with_attribute(mut self, attr: Attribute, value: impl Into<String>) -> Self {
        self.attributes.set(attr, Some(value.into()));
        self
    }

    /// Resolves a template placeholder against this device. Known but absent
    /// attributes resolve to an empty string, unknown names to `None`.
    pub fn placeholder(&self, name: &str) -> Option<String> {
        match name {
            "usbguard_id" | "index" => Some(self.id.to_string()),
            _ => Attribute::from_placeholder(name)
                .map(|attr| self.attributes.get(attr).unwrap_or_default().to_string()),
        }
    }
}

/// Attributes the configured templates refer to. The device id is always
/// kept regardless of this set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interest {
    attrs: Vec<Attribute>,
}

impl Interest {
    pub fn all() -> Self {
        Self {
            attrs: Attribute::ALL.to_vec(),
        }
    }

    pub fn from_placeholders<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut attrs: Vec<Attribute> = names
            .into_iter()
            .filter_map(Attribute::from_placeholder)
            .collect();
        attrs.sort();
        attrs.dedup();
        Self { attrs }
    }

    pub fn contains(&self, attr: Attribute) -> bool {
        self.attrs.contains(&attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.attrs.iter().copied()
    }
}

/// User action on a pending device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Allow,
    Block,
    Reject,
}

impl Action {
    /// Target code understood by `applyDevicePolicy`.
    pub fn target_code(self) -> u32 {
        match self {
            Action::Allow => 0,
            Action::Block => 1,
            Action::Reject => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
            Action::Reject => "reject",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Action::Allow),
            "block" => Ok(Action::Block),
            "reject" => Ok(Action::Reject),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

/// What a click landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickIndex {
    Device(DeviceId),
    Separator,
}

/// A mouse click reported by the status bar host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub button: u8,
    pub index: Option<ClickIndex>,
}
