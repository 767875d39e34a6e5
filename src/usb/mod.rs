//! USB OTG device with two CDC-ACM serial ports
//!
//! - CDC0: bridged data (NUS RX/TX)
//! - CDC1: log output

pub mod cdc_io;

pub use cdc_io::{CdcReader, CdcWriter};

use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::Driver;
use embassy_usb::{Builder, Config as UsbConfig, UsbDevice};
use static_cell::StaticCell;

pub const VID: u16 = 0x303A;
pub const PID: u16 = 0x4002;

/// Bulk endpoint packet size
pub const PACKET_SIZE: u16 = 64;

macro_rules! static_byte_buffer {
    ($size:expr) => {{
        static BUFFER: ::static_cell::ConstStaticCell<[u8; $size]> =
            ::static_cell::ConstStaticCell::new([0; $size]);
        BUFFER.take()
    }};
}

/// The composite device and its two serial functions
pub struct UsbPorts<D: Driver<'static>> {
    pub device: UsbDevice<'static, D>,
    pub data: CdcAcmClass<'static, D>,
    pub debug: CdcAcmClass<'static, D>,
}

/// Build the dual CDC-ACM device on `driver`. Call once.
pub fn usb_device<D: Driver<'static>>(driver: D) -> UsbPorts<D> {
    let mut config = UsbConfig::new(VID, PID);
    config.manufacturer = Some("nus-bridge");
    config.product = Some("NUS Bridge");
    config.serial_number = Some("0001");
    config.max_power = 100;
    config.max_packet_size_0 = 64;
    // Windows needs IADs for composite CDC
    config.composite_with_iads = true;
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;

    let config_descriptor = static_byte_buffer!(256);
    let bos_descriptor = static_byte_buffer!(256);
    let msos_descriptor = static_byte_buffer!(256);
    let control_buf = static_byte_buffer!(64);

    let mut builder = Builder::new(
        driver,
        config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    static DATA_STATE: StaticCell<State<'static>> = StaticCell::new();
    static DEBUG_STATE: StaticCell<State<'static>> = StaticCell::new();
    let data = CdcAcmClass::new(&mut builder, DATA_STATE.init(State::new()), PACKET_SIZE);
    let debug = CdcAcmClass::new(&mut builder, DEBUG_STATE.init(State::new()), PACKET_SIZE);

    UsbPorts {
        device: builder.build(),
        data,
        debug,
    }
}
