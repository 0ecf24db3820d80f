use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::Template;
use crate::render::DEVICE_LIST_PLACEHOLDER;
use crate::types::{Action, Attribute, Interest};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/guardbar/config.toml";

/// Mouse buttons bound to actions. A missing key or `0` disables the binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default = "default_button_allow")]
    pub allow: Option<u8>,
    #[serde(default = "default_button_block")]
    pub block: Option<u8>,
    #[serde(default)]
    pub reject: Option<u8>,
    /// Toggles whether allow/reject decisions are made permanent.
    #[serde(default)]
    pub permanent: Option<u8>,
}

impl ButtonConfig {
    fn bound(&self) -> [Option<u8>; 4] {
        [self.allow, self.block, self.reject, self.permanent].map(|b| b.filter(|b| *b != 0))
    }

    /// Action bound to `button`, if any.
    pub fn action_for(&self, button: u8) -> Option<Action> {
        let [allow, block, reject, _] = self.bound();
        [(allow, Action::Allow), (block, Action::Block), (reject, Action::Reject)]
            .into_iter()
            .find(|(bound, _)| *bound == Some(button))
            .map(|(_, action)| action)
    }

    /// Whether `button` toggles the permanent flag.
    pub fn is_permanent_toggle(&self, button: u8) -> bool {
        self.bound()[3] == Some(button)
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            allow: default_button_allow(),
            block: default_button_block(),
            reject: None,
            permanent: None,
        }
    }
}

fn default_button_allow() -> Option<u8> {
    Some(1)
}
fn default_button_block() -> Option<u8> {
    Some(3)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "default_format_bar")]
    pub bar: String,
    #[serde(default = "default_format_device")]
    pub device: String,
    #[serde(default = "default_format_separator")]
    pub separator: String,
    /// Empty disables notifications.
    #[serde(default = "default_format_notification")]
    pub notification: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            bar: default_format_bar(),
            device: default_format_device(),
            separator: default_format_separator(),
            notification: default_format_notification(),
        }
    }
}

fn default_format_bar() -> String {
    "[{format_device}]".into()
}
fn default_format_device() -> String {
    "{name}".into()
}
fn default_format_separator() -> String {
    " | ".into()
}
fn default_format_notification() -> String {
    "{name} is {action}".into()
}

fn parse_template(field: &'static str, source: &str) -> Result<Template, ConfigError> {
    Template::parse(source).map_err(|source| ConfigError::Format { field, source })
}

impl FormatConfig {
    pub fn bar_template(&self) -> Result<Template, ConfigError> {
        parse_template("bar", &self.bar)
    }

    pub fn device_template(&self) -> Result<Template, ConfigError> {
        parse_template("device", &self.device)
    }

    pub fn separator_template(&self) -> Result<Template, ConfigError> {
        parse_template("separator", &self.separator)
    }

    /// `None` when notifications are disabled.
    pub fn notification_template(&self) -> Result<Option<Template>, ConfigError> {
        if self.notification.is_empty() {
            return Ok(None);
        }
        parse_template("notification", &self.notification).map(Some)
    }

    /// Attributes referenced by the device and notification formats.
    pub fn interest(&self) -> Result<Interest, ConfigError> {
        let mut names = self.device_template()?.placeholders();
        if let Some(t) = self.notification_template()? {
            names.extend(t.placeholders());
        }
        Ok(Interest::from_placeholders(names.iter().map(String::as_str)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let device_level = |name: &str| {
            Attribute::from_placeholder(name).is_some() || name == "usbguard_id" || name == "index"
        };
        check_placeholders("bar", &self.bar_template()?, |n| n == DEVICE_LIST_PLACEHOLDER)?;
        check_placeholders("device", &self.device_template()?, device_level)?;
        check_placeholders("separator", &self.separator_template()?, |_| false)?;
        if let Some(t) = self.notification_template()? {
            check_placeholders("notification", &t, |n| n == "action" || device_level(n))?;
        }
        Ok(())
    }
}

fn check_placeholders(
    field: &'static str,
    template: &Template,
    allowed: impl Fn(&str) -> bool,
) -> Result<(), ConfigError> {
    match template.placeholders().into_iter().find(|n| !allowed(n.as_str())) {
        Some(name) => Err(ConfigError::UnknownPlaceholder { field, name }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbguardConfig {
    #[serde(default = "default_bus_name")]
    pub bus_name: String,
    #[serde(default = "default_devices_path")]
    pub devices_path: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Pause before the listener reconnects after losing the bus.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Query passed to `listDevices` at startup.
    #[serde(default = "default_list_query")]
    pub list_query: String,
}

impl Default for UsbguardConfig {
    fn default() -> Self {
        Self {
            bus_name: default_bus_name(),
            devices_path: default_devices_path(),
            interface: default_interface(),
            reconnect_delay_secs: default_reconnect_delay(),
            list_query: default_list_query(),
        }
    }
}

impl UsbguardConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_bus_name() -> String {
    "org.usbguard1".into()
}
fn default_devices_path() -> String {
    "/org/usbguard1/Devices".into()
}
fn default_interface() -> String {
    "org.usbguard.Devices1".into()
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_list_query() -> String {
    "match".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Keep the urgent flag raised while nothing is pending.
    #[serde(default = "default_urgent_when_empty")]
    pub urgent_when_empty: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            urgent_when_empty: default_urgent_when_empty(),
        }
    }
}

fn default_urgent_when_empty() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub buttons: ButtonConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub usbguard: UsbguardConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks templates and button bindings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.format.validate()?;
        let mut seen = Vec::new();
        for button in self.buttons.bound().into_iter().flatten() {
            if seen.contains(&button) {
                return Err(ConfigError::DuplicateButton(button));
            }
            seen.push(button);
        }
        Ok(())
    }
}

/// Loads the config at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Config::from_toml(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
        Err(source) => Err(ConfigError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.buttons.allow, Some(1));
        assert_eq!(config.buttons.block, Some(3));
        assert_eq!(config.buttons.reject, None);
        assert_eq!(config.format.notification, "{name} is {action}");
        assert!(config.display.urgent_when_empty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [buttons]
            reject = 2

            [format]
            device = "{name} ({via_port})"
            "#,
        )
        .unwrap();
        assert_eq!(config.buttons.allow, Some(1));
        assert_eq!(config.buttons.action_for(2), Some(Action::Reject));
        assert_eq!(config.buttons.action_for(3), Some(Action::Block));
        assert_eq!(config.buttons.action_for(4), None);
        assert_eq!(config.usbguard.bus_name, "org.usbguard1");
        let interest = config.format.interest().unwrap();
        assert!(interest.contains(Attribute::Name));
        assert!(interest.contains(Attribute::ViaPort));
        assert!(!interest.contains(Attribute::Hash));
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = Config::from_toml("[format]\ndevice = \"{vendor}\"").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownPlaceholder { field: "device", ref name } if name == "vendor"
        ));
        // `action` only makes sense in notifications
        assert!(Config::from_toml("[format]\ndevice = \"{action}\"").is_err());
        assert!(Config::from_toml("[format]\nnotification = \"{serial}: {action}\"").is_ok());
    }

    #[test]
    fn zero_disables_button() {
        let config = Config::from_toml("[buttons]\nblock = 0\npermanent = 2").unwrap();
        assert_eq!(config.buttons.action_for(3), None);
        assert_eq!(config.buttons.action_for(0), None);
        assert!(config.buttons.is_permanent_toggle(2));
        assert!(!config.buttons.is_permanent_toggle(0));
    }

    #[test]
    fn duplicate_button_is_rejected() {
        let err = Config::from_toml("[buttons]\nreject = 1").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateButton(1)));
    }

    #[test]
    fn broken_template_is_reported() {
        let err = Config::from_toml("[format]\nbar = \"[{format_device}\"").unwrap_err();
        assert!(matches!(err, ConfigError::Format { field: "bar", .. }));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[usbguard]\nreconnect_delay_secs = 1\n[display]\nurgent_when_empty = false"
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.usbguard.reconnect_delay(), Duration::from_secs(1));
        assert!(!config.display.urgent_when_empty);
    }

    #[test]
    fn empty_notification_disables() {
        let config = Config::from_toml("[format]\nnotification = \"\"").unwrap();
        assert!(config.format.notification_template().unwrap().is_none());
    }
}
