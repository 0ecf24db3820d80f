pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod registry;
pub mod render;
pub mod rule;
pub mod signal;
pub mod types;

pub const APP_ID: &str = "guardbar";

#[cfg(test)]
mod tests;
