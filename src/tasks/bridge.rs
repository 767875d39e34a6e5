//! Bridge task: runs the session tick and moves bytes between the NUS
//! stream and the serial pipes

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;
use embassy_time::{Duration, Ticker};

use crate::ble::TroubleStack;
use crate::link::clock::EmbassyClock;
use crate::link::LinkEvent;
use crate::session::NusBridge;

use super::led::{LedSender, LedSignal};

/// Capacity of each serial pipe
pub const PIPE_CAPACITY: usize = 512;

/// Tick period of the session
const TICK_MS: u64 = 5;

/// Bytes read from the serial port, waiting to go out over BLE
pub static SERIAL_TO_BLE: Pipe<CriticalSectionRawMutex, PIPE_CAPACITY> = Pipe::new();

/// Bytes received over BLE, waiting to go out of the serial port
pub static BLE_TO_SERIAL: Pipe<CriticalSectionRawMutex, PIPE_CAPACITY> = Pipe::new();

pub type Bridge = NusBridge<'static, TroubleStack, EmbassyClock>;

pub async fn bridge_task(mut bridge: Bridge, led: LedSender) {
    if bridge.setup().is_err() {
        return;
    }

    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    let mut buf = [0u8; 64];
    loop {
        bridge.tick();

        while let Some(event) = bridge.poll_link_event() {
            let signal = match event {
                LinkEvent::Connected => LedSignal::Connected,
                LinkEvent::Disconnected => LedSignal::Disconnected,
                LinkEvent::TxComplete => LedSignal::Activity,
            };
            let _ = led.try_send(signal);
        }

        // BLE -> serial, only as much as the pipe can take right now
        loop {
            let room = BLE_TO_SERIAL.free_capacity().min(buf.len());
            if room == 0 || bridge.available() == 0 {
                break;
            }
            let n = bridge.read(&mut buf[..room]);
            let _ = BLE_TO_SERIAL.try_write(&buf[..n]);
        }

        // Serial -> BLE, leaving the rest in the pipe while TX is full
        loop {
            let room = bridge.tx_free().min(buf.len());
            if room == 0 {
                break;
            }
            match SERIAL_TO_BLE.try_read(&mut buf[..room]) {
                Ok(n) => bridge.write(&buf[..n]),
                Err(_) => break,
            }
        }

        ticker.next().await;
    }
}
