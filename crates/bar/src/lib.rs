//! Status-bar companion for usbguard: tracks pending USB devices and lets the
//! user allow, block or reject them from the bar.

pub mod dispatch;
pub mod i3bar;
pub mod listener;
pub mod notify;
pub mod state;

pub use dispatch::{ButtonAction, ButtonMap, Dispatcher};
pub use listener::{Listener, ListenerHandle};
pub use state::{ConnectionState, MonitorState};
