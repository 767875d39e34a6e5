#![cfg_attr(not(test), no_std)]

pub mod buffer;
pub mod config;
pub mod link;
pub mod logger;
pub mod session;

// These modules depend on embassy/async features only available with embedded feature
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod tasks;
#[cfg(feature = "embedded")]
pub mod usb;

pub use buffer::{ByteRingBuffer, PeekCache};
pub use config::{BridgeConfig, ConfigError};
pub use link::{BleStack, LinkEvent, StackError, StackEvent};
pub use session::{LinkState, NusBridge, Role};
