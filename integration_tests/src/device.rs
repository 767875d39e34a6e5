//! Serial side of the bridge: the USB CDC data port.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::{SerialPort, SerialPortType};

/// USB identifiers the firmware enumerates with
const BRIDGE_VID: u16 = 0x303A;
const BRIDGE_PID: u16 = 0x4002;

/// Find the bridge's data port. The firmware exposes two CDC ports and the
/// data port enumerates first, so take the lowest-numbered match.
pub fn find_data_port() -> Result<String> {
    let mut ports: Vec<String> = serialport::available_ports()?
        .into_iter()
        .filter(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => usb.vid == BRIDGE_VID && usb.pid == BRIDGE_PID,
            _ => false,
        })
        .map(|p| p.port_name)
        .collect();
    ports.sort();

    match ports.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No bridge data port found - ensure the device is connected"),
    }
}

/// Returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        find_data_port()
    } else {
        Ok(port_arg.to_string())
    }
}

/// Raw byte client for the data port
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
}

impl DeviceClient {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;
        // CDC reads on the device wait for DTR
        port.write_data_terminal_ready(true)?;

        Ok(Self { port })
    }

    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read exactly `len` bytes or fail once `timeout` elapses.
    pub fn receive(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; 256];
        let start = Instant::now();

        while data.len() < len {
            if start.elapsed() >= timeout {
                anyhow::bail!(
                    "Timeout waiting for {} bytes over serial, got {}: {:02x?}",
                    len,
                    data.len(),
                    data
                );
            }
            let want = (len - data.len()).min(buf.len());
            match self.port.read(&mut buf[..want]) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data)
    }

    /// Read and discard anything already pending.
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
