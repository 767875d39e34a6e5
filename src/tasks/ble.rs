//! BLE host task for the UART service
//!
//! Runs the trouble-host peripheral, turns GATT activity into `StackEvent`s
//! for the bridge and carries out the `BleCommand`s the bridge queues.

use embassy_futures::select::{select, Either};
use trouble_host::prelude::*;

use crate::ble::service::{NusValue, Server};
use crate::ble::stack::{BleCommand, CommandReceiver};
use crate::config::nus;
use crate::link::events::{payload_from, EventSender, StackEvent, Status};
use crate::link::ConnId;

/// Device name prefix for BLE advertising
const DEVICE_NAME_PREFIX: &str = "NUS-Bridge-";

/// Length of the advertised name: prefix plus six hex digits
pub const DEVICE_NAME_LEN: usize = DEVICE_NAME_PREFIX.len() + 6;

/// Number of maximum concurrent connections
const CONNECTIONS_MAX: usize = 1;
/// Number of L2CAP channels
const L2CAP_CHANNELS_MAX: usize = 3;

/// Status code reported for a notification the stack could not send
const NOTIFY_FAILED: u8 = 0x01;

/// Build the advertised name from the last three MAC bytes
pub fn device_name(device_id: &[u8; 3]) -> heapless::String<DEVICE_NAME_LEN> {
    const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";
    let mut name = heapless::String::new();
    let _ = name.push_str(DEVICE_NAME_PREFIX);
    for &byte in device_id {
        let _ = name.push(char::from(HEX_CHARS[usize::from(byte >> 4)]));
        let _ = name.push(char::from(HEX_CHARS[usize::from(byte & 0x0F)]));
    }
    name
}

/// Create the GATT server advertising under `name`
pub fn build_server(name: &'static str) -> Option<Server<'static>> {
    let gap = GapConfig::Peripheral(PeripheralConfig {
        name,
        appearance: &appearance::UNKNOWN,
    });
    Server::new_with_config(gap).ok()
}

/// Queue an RX payload, dropping it if the bridge is behind
fn post_rx(events: &EventSender<'static>, event: StackEvent) {
    if events.try_send(event).is_err() {
        log::warn!("BLE: event queue full, RX write dropped");
    }
}

/// Queue a lifecycle event, waiting for room
async fn post(events: &EventSender<'static>, event: StackEvent) {
    events.send(event).await;
}

/// Fail a notification that has no connection to go to
async fn reject_notify(events: &EventSender<'static>, conn: ConnId) {
    post(
        events,
        StackEvent::ChunkWritten {
            conn,
            status: Status::Failed(NOTIFY_FAILED),
        },
    )
    .await;
}

/// Wait until the bridge asks for advertising to start
async fn wait_for_start(commands: &CommandReceiver, events: &EventSender<'static>) {
    loop {
        match commands.receive().await {
            BleCommand::StartAdvertising => return,
            BleCommand::Notify { conn, .. } => reject_notify(events, conn).await,
            BleCommand::Disconnect { .. } | BleCommand::StopAdvertising => {}
        }
    }
}

/// Wait until the bridge asks for advertising to stop
async fn wait_for_stop(commands: &CommandReceiver, events: &EventSender<'static>) {
    loop {
        match commands.receive().await {
            BleCommand::StopAdvertising => return,
            BleCommand::Notify { conn, .. } => reject_notify(events, conn).await,
            BleCommand::Disconnect { .. } | BleCommand::StartAdvertising => {}
        }
    }
}

/// Main BLE task
///
/// Advertises while the bridge wants it, accepts one client at a time and
/// forwards RX writes, subscription changes, MTU updates and disconnects as
/// stack events.
pub async fn ble_task<C: Controller>(
    controller: C,
    server: &'static Server<'static>,
    name: &'static str,
    device_id: [u8; 3],
    commands: CommandReceiver,
    events: EventSender<'static>,
) {
    log::info!("BLE: starting as '{}'", name);

    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    // Random static address derived from the device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random([
        device_id[0],
        device_id[1],
        device_id[2],
        0x4E,
        0x55,
        0xC3,
    ]));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let runner_task = runner.run();

    let peripheral_task = async {
        let service_uuid = nus::SERVICE_UUID.as_u128().to_le_bytes();
        let mut adv_data = [0u8; 31];
        let adv_len = match AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::ServiceUuids128(&[service_uuid]),
            ],
            &mut adv_data,
        ) {
            Ok(len) => len,
            Err(_) => return,
        };
        let mut scan_data = [0u8; 31];
        let scan_len = match AdStructure::encode_slice(
            &[AdStructure::CompleteLocalName(name.as_bytes())],
            &mut scan_data,
        ) {
            Ok(len) => len,
            Err(_) => return,
        };

        let mut advertise = false;
        loop {
            if !advertise {
                wait_for_start(&commands, &events).await;
                advertise = true;
            }

            log::debug!("BLE: advertising");
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..adv_len],
                        scan_data: &scan_data[..scan_len],
                    },
                )
                .await
            {
                Ok(a) => a,
                Err(_) => {
                    log::warn!("BLE: advertising failed, retrying");
                    embassy_time::Timer::after(embassy_time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            let acceptor = match select(advertiser.accept(), wait_for_stop(&commands, &events)).await {
                Either::First(Ok(acceptor)) => acceptor,
                Either::First(Err(_)) => continue,
                Either::Second(()) => {
                    log::debug!("BLE: advertising stopped");
                    advertise = false;
                    continue;
                }
            };

            let conn = match acceptor.with_attribute_server(server) {
                Ok(c) => c,
                Err(_) => continue,
            };

            // Advertising ends with the connection; the bridge re-arms it
            advertise = false;
            let id = ConnId(conn.raw().handle().raw());
            let mut mtu = conn.raw().att_mtu();
            post(&events, StackEvent::ClientConnected { conn: id }).await;

            loop {
                match select(conn.next(), commands.receive()).await {
                    Either::First(GattConnectionEvent::Disconnected { reason }) => {
                        let reason = reason.into_inner();
                        post(&events, StackEvent::Disconnected { conn: id, reason }).await;
                        break;
                    }
                    Either::First(GattConnectionEvent::Gatt { event }) => {
                        if let GattEvent::Write(write) = &event {
                            if write.handle() == server.nus.rx.handle {
                                post_rx(
                                    &events,
                                    StackEvent::RxWritten {
                                        conn: id,
                                        data: payload_from(write.data()),
                                    },
                                );
                            } else if Some(write.handle()) == server.nus.tx.cccd_handle {
                                let enabled = write.data().first().is_some_and(|flags| flags & 0x01 != 0);
                                post(&events, StackEvent::SubscriptionChanged { conn: id, enabled }).await;
                            }
                        }
                        let _ = event.accept();

                        let current = conn.raw().att_mtu();
                        if current != mtu {
                            mtu = current;
                            post(
                                &events,
                                StackEvent::MtuConfigured {
                                    conn: id,
                                    mtu,
                                    status: Status::Ok,
                                },
                            )
                            .await;
                        }
                    }
                    Either::First(_) => {}
                    Either::Second(BleCommand::Notify { conn: target, data }) => {
                        if target != id {
                            reject_notify(&events, target).await;
                            continue;
                        }
                        let mut value = NusValue::new();
                        let len = data.len().min(value.capacity());
                        let _ = value.extend_from_slice(&data[..len]);
                        let status = match server.nus.tx.notify(&conn, &value).await {
                            Ok(()) => Status::Ok,
                            Err(_) => Status::Failed(NOTIFY_FAILED),
                        };
                        post(&events, StackEvent::ChunkWritten { conn: id, status }).await;
                    }
                    Either::Second(BleCommand::Disconnect { conn: target }) => {
                        if target == id {
                            conn.raw().disconnect();
                        }
                    }
                    Either::Second(BleCommand::StartAdvertising) => advertise = true,
                    Either::Second(BleCommand::StopAdvertising) => advertise = false,
                }
            }
        }
    };

    select(runner_task, peripheral_task).await;
}
