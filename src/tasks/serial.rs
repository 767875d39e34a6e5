//! Serial pump tasks
//!
//! Move raw bytes between a serial interface and the bridge pipes. Generic
//! over `embedded_io_async` so they work with USB CDC-ACM or a UART.

use embedded_io_async::{Read, Write};

use super::bridge::{BLE_TO_SERIAL, SERIAL_TO_BLE};

/// Task that feeds bytes read from `reader` into the BLE TX path
pub async fn serial_reader_task<R: Read>(mut reader: R) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => continue,
            Ok(n) => SERIAL_TO_BLE.write_all(&buf[..n]).await,
            Err(_) => {
                // Port closed or errored, back off briefly
                embassy_time::Timer::after(embassy_time::Duration::from_millis(10)).await;
            }
        }
    }
}

/// Task that writes bytes received over BLE to `writer`
pub async fn serial_writer_task<W: Write>(mut writer: W) {
    let mut buf = [0u8; 64];
    loop {
        let n = BLE_TO_SERIAL.read(&mut buf).await;
        if writer.write_all(&buf[..n]).await.is_err() {
            log::debug!("Serial: dropped {} bytes, port not open", n);
        }
    }
}
