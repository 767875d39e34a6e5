//! Embassy tasks module
//!
//! Contains the async tasks of the firmware, organised by functionality.

pub mod ble;
pub mod bridge;
pub mod led;
pub mod serial;

pub use ble::{ble_task, build_server, device_name};
pub use bridge::{bridge_task, Bridge};
pub use led::{led_task, LedReceiver, LedSender, LedSignal, LED_CHANNEL};
pub use serial::{serial_reader_task, serial_writer_task};
