use thiserror::Error;

use crate::types::DeviceId;

/// Failures talking to the bus or the policy daemon.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Bus or daemon unreachable while connecting or subscribing.
    #[error("usbguard-dbus service not running: {0}")]
    Connection(String),
    /// The daemon refused or failed a policy request.
    #[error("policy call failed: {0}")]
    PolicyCall(String),
}

/// A signal payload that could not be turned into a typed signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed {member} payload: {reason}")]
    Payload { member: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("format `{field}`: {source}")]
    Format {
        field: &'static str,
        #[source]
        source: FormatError,
    },
    #[error("format `{field}` uses unknown placeholder `{name}`")]
    UnknownPlaceholder { field: &'static str, name: String },
    #[error("button {0} is bound to more than one action")]
    DuplicateButton(u8),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unclosed `{0}` at byte {1}")]
    Unclosed(char, usize),
    #[error("unexpected `{0}` at byte {1}")]
    Unexpected(char, usize),
}

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown action {0:?}")]
pub struct ParseActionError(pub String);

/// Reasons an action could not be carried out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The device is no longer pending, e.g. a stale click.
    #[error("device {0} is not pending")]
    UnknownDevice(DeviceId),
    #[error("not connected to usbguard")]
    NotConnected,
    #[error(transparent)]
    PolicyCall(#[from] BusError),
}
