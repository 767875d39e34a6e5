//! Nordic UART Service (NUS) GATT definition
//!
//! - Service UUID: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
//! - RX Characteristic: 6E400002-... (write, write without response)
//! - TX Characteristic: 6E400003-... (notify)

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;
use trouble_host::prelude::*;

use crate::config::mtu;

/// Largest value carried by one attribute write or notification
/// (MTU 247 minus the ATT header)
pub const NUS_MAX_PACKET_SIZE: usize = mtu::DESIRED as usize - mtu::ATT_HEADER_LEN;

/// Attribute value type for both characteristics
pub type NusValue = Vec<u8, NUS_MAX_PACKET_SIZE>;

#[gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NordicUartService {
    /// Client writes serial data here
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    pub rx: NusValue,

    /// Server notifies serial data here
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    pub tx: NusValue,
}

/// GATT server hosting the UART service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
pub struct Server {
    pub nus: NordicUartService,
}
