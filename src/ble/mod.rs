//! Bluetooth Low Energy glue for the firmware
//!
//! Hosts the Nordic UART Service on trouble-host and adapts it to the
//! session's `BleStack` interface.

pub mod service;
pub mod stack;

pub use service::{NordicUartService, Server, NUS_MAX_PACKET_SIZE};
pub use stack::{BleCommand, TroubleStack, COMMAND_CHANNEL};
