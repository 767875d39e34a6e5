//! Link status LED
//!
//! Solid while a client is connected, off otherwise, with a short blink
//! whenever a batch of outbound bytes has been delivered.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embedded_hal::digital::OutputPin;

/// Duration of the activity blink in milliseconds
const LED_BLINK_MS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedSignal {
    Connected,
    Disconnected,
    Activity,
}

pub type LedSender = Sender<'static, CriticalSectionRawMutex, LedSignal, 4>;
pub type LedReceiver = Receiver<'static, CriticalSectionRawMutex, LedSignal, 4>;

pub static LED_CHANNEL: Channel<CriticalSectionRawMutex, LedSignal, 4> = Channel::new();

/// Drive an active-low LED from link signals
pub async fn led_task<P: OutputPin>(mut led: P, receiver: LedReceiver) {
    let mut connected = false;
    let _ = led.set_high(); // off

    loop {
        match receiver.receive().await {
            LedSignal::Connected => {
                connected = true;
                let _ = led.set_low();
            }
            LedSignal::Disconnected => {
                connected = false;
                let _ = led.set_high();
            }
            LedSignal::Activity if connected => {
                let _ = led.set_high();
                embassy_time::Timer::after(embassy_time::Duration::from_millis(LED_BLINK_MS)).await;
                let _ = led.set_low();
            }
            LedSignal::Activity => {}
        }
    }
}
