//! Hardware-in-the-loop tests for the NUS bridge firmware.
//!
//! Needs one flashed device plugged in over USB and a Bluetooth adapter on
//! the host. Bytes are pushed through the bridge in both directions.

mod ble_client;
mod device;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use device::{resolve_port, DeviceClient};
use tests::{print_results, run_all_tests, Harness};

#[derive(Parser)]
#[command(name = "bridge-tests")]
#[command(about = "Integration tests for the NUS bridge firmware")]
struct Args {
    /// Data port of the device (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Advertised name prefix to scan for
    #[arg(long, default_value = "NUS-Bridge-")]
    name_prefix: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let port = resolve_port(&args.port)?;

    println!("{}", "NUS Bridge Integration Tests".bold());
    println!("Serial: {} @ {}", port, args.baud);
    println!("BLE:    scanning for \"{}*\"", args.name_prefix);
    println!();

    println!("Opening serial port...");
    let mut serial = DeviceClient::new(&port, args.baud)?;
    std::thread::sleep(Duration::from_millis(500));
    serial.drain_buffer()?;
    println!("{}", "  Serial connected!".green());

    println!("Scanning for BLE device...");
    let ble = BleClient::connect_by_prefix(&args.name_prefix, Duration::from_secs(args.scan_timeout)).await?;
    println!("{}", "  BLE connected!".green());

    // Let the subscription reach the device before any traffic
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut harness = Harness { ble, serial };

    println!("\n{}", "Running tests...".bold());
    println!();

    let results = run_all_tests(&mut harness).await;
    let _ = harness.ble.disconnect().await;
    print_results(&results);

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}
