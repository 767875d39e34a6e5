//! `log` backend writing to the USB CDC debug port
//!
//! Records are formatted into a shared buffer under a critical section and
//! a writer task drains it to the CDC sender. Output never blocks; when the
//! buffer is full or the port is closed, text is dropped.

use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
#[cfg(feature = "embedded")]
use embassy_usb::class::cdc_acm::Sender;
#[cfg(feature = "embedded")]
use embassy_usb::driver::Driver;
use heapless::String;
use log::{LevelFilter, Log, Metadata, Record};

/// Pending log text awaiting the writer task
const LOG_BUFFER_LEN: usize = 1024;

/// Longest single formatted record
const MAX_RECORD_LEN: usize = 192;

/// Ending for a record cut short
const TRUNCATION_MARK: &str = "~\r\n";

/// CDC full-speed bulk packet size
#[cfg(feature = "embedded")]
const PACKET_LEN: usize = 64;

static LOG_SIGNAL: Signal<CriticalSectionRawMutex, ()> = Signal::new();

static LOG_BUFFER: Mutex<CriticalSectionRawMutex, RefCell<String<LOG_BUFFER_LEN>>> =
    Mutex::new(RefCell::new(String::new()));

static LOGGER: CdcLogger = CdcLogger;

struct CdcLogger;

impl Log for CdcLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_record(record);
        let queued = LOG_BUFFER.lock(|cell| cell.borrow_mut().push_str(&line).is_ok());
        if queued {
            LOG_SIGNAL.signal(());
        }
    }

    fn flush(&self) {}
}

/// One terminal line for `record`, cut short if it does not fit
fn format_record(record: &Record) -> String<MAX_RECORD_LEN> {
    let mut writer = LineWriter {
        line: String::new(),
        truncated: false,
    };
    let _ = write!(writer, "[{}] {}\r\n", record.level(), record.args());
    writer.finish()
}

/// Fills a fixed line as far as it goes, keeping room for the
/// truncation mark
struct LineWriter<const N: usize> {
    line: String<N>,
    truncated: bool,
}

impl<const N: usize> LineWriter<N> {
    fn finish(mut self) -> String<N> {
        if self.truncated {
            // Keep the line ending so the terminal stays readable
            let _ = self.line.push_str(TRUNCATION_MARK);
        }
        self.line
    }
}

impl<const N: usize> Write for LineWriter<N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let room = N.saturating_sub(TRUNCATION_MARK.len() + self.line.len());
        if s.len() <= room {
            let _ = self.line.push_str(s);
            return Ok(());
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        let _ = self.line.push_str(&s[..cut]);
        self.truncated = true;
        Err(core::fmt::Error)
    }
}

/// Install the CDC logger. Call once at startup.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(feature = "embedded")]
fn take_pending() -> Option<String<LOG_BUFFER_LEN>> {
    LOG_BUFFER.lock(|cell| {
        let mut buffer = cell.borrow_mut();
        if buffer.is_empty() {
            None
        } else {
            let pending = buffer.clone();
            buffer.clear();
            Some(pending)
        }
    })
}

/// Drain buffered log text to the CDC debug port
#[cfg(feature = "embedded")]
pub async fn log_writer_task<'d, D: Driver<'d>>(mut sender: Sender<'d, D>) {
    loop {
        LOG_SIGNAL.wait().await;
        let Some(pending) = take_pending() else {
            continue;
        };
        for packet in pending.as_bytes().chunks(PACKET_LEN) {
            // Port might not be open
            if sender.write_packet(packet).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_short_record_formatted() {
        let line = format_record(
            &Record::builder()
                .level(Level::Info)
                .args(format_args!("Link: {} -> {}", "Idle", "Connecting"))
                .build(),
        );
        assert_eq!(line.as_str(), "[INFO] Link: Idle -> Connecting\r\n");
    }

    #[test]
    fn test_long_record_truncated_with_line_ending() {
        let long = "x".repeat(300);
        let line = format_record(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("{}", long))
                .build(),
        );
        assert!(line.len() <= MAX_RECORD_LEN);
        assert!(line.len() > MAX_RECORD_LEN - 8);
        assert!(line.starts_with("[WARN] xxx"));
        assert!(line.ends_with("~\r\n"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut writer: LineWriter<8> = LineWriter {
            line: String::new(),
            truncated: false,
        };
        assert!(writer.write_str("ab\u{e9}\u{e9}").is_err());
        assert_eq!(writer.finish().as_str(), "ab\u{e9}~\r\n");
    }
}
