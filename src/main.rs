#![no_std]
#![no_main]

extern crate alloc;

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::otg_fs::asynch::{Config as UsbDriverConfig, Driver};
use esp_hal::otg_fs::Usb;
use esp_hal::timer::timg::TimerGroup;
use log::LevelFilter;
use static_cell::StaticCell;

use nus_bridge::ble::{Server, TroubleStack, COMMAND_CHANNEL};
use nus_bridge::config::BridgeConfig;
use nus_bridge::link::clock::EmbassyClock;
use nus_bridge::link::EventChannel;
use nus_bridge::session::NusBridge;
use nus_bridge::tasks::{self, Bridge, LedReceiver, LedSender, LED_CHANNEL};
use nus_bridge::usb::{self, CdcReader, CdcWriter};

/// Type alias for the BLE controller
type BleController = trouble_host::prelude::ExternalController<
    esp_radio::ble::controller::BleConnector<'static>,
    10,
>;

type UsbDriver = Driver<'static>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for esp-radio controller (needed for 'static lifetime)
static RADIO_CONTROLLER: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// Stack events from the BLE task to the bridge
static STACK_EVENTS: EventChannel = EventChannel::new();

static DEVICE_NAME: StaticCell<heapless::String<{ tasks::ble::DEVICE_NAME_LEN }>> = StaticCell::new();
static GATT_SERVER: StaticCell<Server<'static>> = StaticCell::new();
static EP_OUT_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();

#[esp_hal::main]
fn main() -> ! {
    // Initialise heap allocator for BLE support (64KB - BLE requires significant heap)
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Status LED (active low), off until a client connects
    let led = Output::new(peripherals.GPIO48, Level::High, OutputConfig::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // USB OTG for the data and log CDC ports
    let usb_otg = Usb::new(peripherals.USB0, peripherals.GPIO20, peripherals.GPIO19);
    let usb_driver = Driver::new(usb_otg, EP_OUT_BUFFER.init([0; 1024]), UsbDriverConfig::default());

    // Read unique device ID from eFuse MAC address (last 3 bytes)
    let mac = esp_hal::efuse::Efuse::read_base_mac_address();
    let device_id: [u8; 3] = [mac[3], mac[4], mac[5]];

    // Initialise esp-radio for BLE support (must be after esp_rtos::start)
    let radio_controller = RADIO_CONTROLLER.init(
        esp_radio::init().expect("Failed to initialize esp-radio")
    );

    // Create BLE connector (ownership is passed to ExternalController)
    let ble_connector = esp_radio::ble::controller::BleConnector::new(
        radio_controller,
        peripherals.BT,
        esp_radio::ble::Config::default(),
    ).expect("Failed to initialize BLE connector");

    // Wrap in ExternalController for trouble-host compatibility
    let controller: BleController = trouble_host::prelude::ExternalController::new(ble_connector);

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, usb_driver, led, controller, device_id));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    usb_driver: UsbDriver,
    led: Output<'static>,
    ble_controller: BleController,
    device_id: [u8; 3],
) {
    let ports = usb::usb_device(usb_driver);
    let (data_tx, data_rx) = ports.data.split();
    let (debug_tx, _debug_rx) = ports.debug.split();

    nus_bridge::logger::init(LevelFilter::Info);
    spawner.must_spawn(usb_task(ports.device));
    spawner.must_spawn(log_writer_task(debug_tx));

    let name: &'static str = DEVICE_NAME.init(tasks::device_name(&device_id)).as_str();
    let Some(server) = tasks::build_server(name) else {
        log::error!("Failed to create GATT server");
        return;
    };
    let server: &'static Server<'static> = GATT_SERVER.init(server);

    let stack = TroubleStack::new(server, COMMAND_CHANNEL.sender());
    // The host task reports CCCD writes, so hold TX until the client subscribes
    let bridge = NusBridge::new(
        BridgeConfig::peripheral().with_assume_subscribed(false),
        stack,
        EmbassyClock,
        STACK_EVENTS.receiver(),
    );

    spawner.must_spawn(ble_host_task(ble_controller, server, name, device_id));
    spawner.must_spawn(bridge_task(bridge, LED_CHANNEL.sender()));
    spawner.must_spawn(serial_reader_task(CdcReader::new(data_rx)));
    spawner.must_spawn(serial_writer_task(CdcWriter::new(data_tx)));
    spawner.must_spawn(led_task(led, LED_CHANNEL.receiver()));
}

/// Task that runs the USB device stack
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, UsbDriver>) {
    device.run().await;
}

/// Task that drains log output to the debug CDC port
#[embassy_executor::task]
async fn log_writer_task(sender: embassy_usb::class::cdc_acm::Sender<'static, UsbDriver>) {
    nus_bridge::logger::log_writer_task(sender).await;
}

/// Task that manages BLE connectivity
#[embassy_executor::task]
async fn ble_host_task(
    controller: BleController,
    server: &'static Server<'static>,
    name: &'static str,
    device_id: [u8; 3],
) {
    tasks::ble_task(
        controller,
        server,
        name,
        device_id,
        COMMAND_CHANNEL.receiver(),
        STACK_EVENTS.sender(),
    )
    .await;
}

/// Task that runs the bridge session
#[embassy_executor::task]
async fn bridge_task(bridge: Bridge, led: LedSender) {
    tasks::bridge_task(bridge, led).await;
}

/// Task that reads bytes from the data CDC port
#[embassy_executor::task]
async fn serial_reader_task(reader: CdcReader<'static, UsbDriver>) {
    tasks::serial_reader_task(reader).await;
}

/// Task that writes bytes to the data CDC port
#[embassy_executor::task]
async fn serial_writer_task(writer: CdcWriter<'static, UsbDriver>) {
    tasks::serial_writer_task(writer).await;
}

/// Task that drives the status LED
#[embassy_executor::task]
async fn led_task(led: Output<'static>, receiver: LedReceiver) {
    tasks::led_task(led, receiver).await;
}
