//! `BleStack` adapter over the trouble-host peripheral task
//!
//! The host stack is async and lives in its own task, so every request made
//! by the bridge becomes a [`BleCommand`] on a channel the BLE task drains.
//! Completions come back as `StackEvent`s on the bridge's event channel.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use uuid::Uuid;

use crate::link::events::{payload_from, Payload};
use crate::link::{AttHandle, BleStack, CharacteristicHandles, ConnId, StackError};

use super::service::Server;

/// Depth of the command queue towards the BLE task
const COMMAND_QUEUE_DEPTH: usize = 4;

/// Requests from the bridge to the BLE task
#[derive(Debug, Clone)]
pub enum BleCommand {
    Notify { conn: ConnId, data: Payload },
    Disconnect { conn: ConnId },
    StartAdvertising,
    StopAdvertising,
}

pub type CommandSender = Sender<'static, CriticalSectionRawMutex, BleCommand, COMMAND_QUEUE_DEPTH>;
pub type CommandReceiver = Receiver<'static, CriticalSectionRawMutex, BleCommand, COMMAND_QUEUE_DEPTH>;

/// Commands from the bridge task to the BLE task
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, BleCommand, COMMAND_QUEUE_DEPTH> =
    Channel::new();

/// Peripheral-role stack backed by the trouble-host GATT server
pub struct TroubleStack {
    server: &'static Server<'static>,
    commands: CommandSender,
}

impl TroubleStack {
    pub fn new(server: &'static Server<'static>, commands: CommandSender) -> Self {
        Self { server, commands }
    }

    fn submit(&self, command: BleCommand) -> Result<(), StackError> {
        self.commands.try_send(command).map_err(|_| StackError::QueueFull)
    }
}

impl BleStack for TroubleStack {
    fn disconnect(&mut self, conn: Option<ConnId>) -> Result<(), StackError> {
        // A peripheral never has a pending outbound attempt to cancel
        let conn = conn.ok_or(StackError::NotConnected)?;
        self.submit(BleCommand::Disconnect { conn })
    }

    fn send_chunk(&mut self, conn: ConnId, handle: AttHandle, data: &[u8]) -> Result<(), StackError> {
        if handle != self.server.nus.tx.handle {
            return Err(StackError::InvalidHandle);
        }
        self.submit(BleCommand::Notify {
            conn,
            data: payload_from(data),
        })
    }

    fn register_service(
        &mut self,
        service: &Uuid,
        rx: &Uuid,
        tx: &Uuid,
    ) -> Result<CharacteristicHandles, StackError> {
        // The attribute table is generated at compile time for the standard UUIDs
        if *service != crate::config::nus::SERVICE_UUID
            || *rx != crate::config::nus::RX_UUID
            || *tx != crate::config::nus::TX_UUID
        {
            log::error!("Only the standard NUS UUIDs can be served");
            return Err(StackError::Unsupported);
        }

        let nus = &self.server.nus;
        Ok(CharacteristicHandles {
            rx: nus.rx.handle,
            tx: nus.tx.handle,
            cccd: nus.tx.cccd_handle.ok_or(StackError::InvalidHandle)?,
        })
    }

    fn start_advertising(&mut self) -> Result<(), StackError> {
        self.submit(BleCommand::StartAdvertising)
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        self.submit(BleCommand::StopAdvertising)
    }
}
