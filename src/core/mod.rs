pub mod apps;
pub mod config;
pub mod debounce;
pub mod error;
pub mod hotkey;
pub mod observer;
pub mod quick_switch;
pub mod search;
pub mod service;
pub mod sources;
pub mod switcher;
pub mod tray;

#[cfg(target_os = "macos")]
pub mod daemon;
#[cfg(target_os = "macos")]
pub(crate) mod macos_api;
#[cfg(target_os = "macos")]
pub mod monitor;
