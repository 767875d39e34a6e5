//! Routing of stack events into buffer and state changes
//!
//! Every event is first checked against the tracked connection id; events
//! for a superseded connection are dropped. A handler mutates flags or
//! buffers and makes at most one state transition. The rendezvous check
//! itself runs from the tick, not from here.

use crate::config::{mtu, nus};
use crate::link::events::{NotifyKind, Payload, StackEvent, Status};
use crate::link::{AttHandle, BleStack, CharacteristicHandles, Clock, ConnId, LinkEvent};

use super::bridge::NusBridge;
use super::state::{LinkState, Role, SecurityState};

impl<S: BleStack, C: Clock> NusBridge<'_, S, C> {
    pub(super) fn route(&mut self, event: StackEvent) {
        let now = self.clock.now_ms();
        log::trace!("Stack event: {:?}", event);

        match event {
            // Connection establishment carries its own guard
            StackEvent::Opened { conn, status } => self.on_opened(conn, status, now),
            StackEvent::ClientConnected { conn } => self.on_client_connected(conn, now),

            event if !self.session.is_current(event.conn()) => {
                log::debug!("Dropping event for stale connection {:?}", event.conn());
            }

            StackEvent::MtuConfigured { mtu, status, .. } => self.on_mtu(mtu, status),
            StackEvent::SearchComplete { conn } => self.on_search_complete(conn, now),
            StackEvent::DescriptorWritten { handle, status, .. } => {
                self.on_descriptor_written(handle, status, now)
            }
            StackEvent::ChunkWritten { status, .. } => self.on_chunk_written(status),
            StackEvent::Notification {
                handle, data, kind, ..
            } => self.on_notification(handle, &data, kind),
            StackEvent::PasskeyRequested { conn } => self.on_passkey_requested(conn),
            StackEvent::SecurityRequested { conn } => self.on_security_requested(conn),
            StackEvent::AuthCompleted {
                success, reason, ..
            } => self.on_auth_completed(success, reason),
            StackEvent::Disconnected { reason, .. } => {
                log::info!("Link closed, reason 0x{:02X}", reason);
                self.enter_idle(now);
            }
            StackEvent::RxWritten { data, .. } => self.on_rx_written(&data),
            StackEvent::SubscriptionChanged { enabled, .. } => self.on_subscription(enabled),
        }
    }

    fn expect_role(&self, role: Role, what: &str) -> bool {
        if self.config.role != role {
            log::debug!("Ignoring {} in {:?} role", what, self.config.role);
            return false;
        }
        true
    }

    // ---- central ----

    fn on_opened(&mut self, conn: ConnId, status: Status, now: u64) {
        if !self.expect_role(Role::Central, "open event") {
            return;
        }
        if self.session.state() != LinkState::Connecting || self.session.conn.is_some() {
            log::debug!("Dropping open event for {:?} while {}", conn, self.session.state().as_str());
            return;
        }

        if let Status::Failed(code) = status {
            log::warn!("Connection failed, status 0x{:02X}", code);
            self.fail(now);
            return;
        }

        log::info!("Connection opened ({:?})", conn);
        self.session.conn = Some(conn);
        if let Err(e) = self.stack.request_mtu(conn) {
            log::warn!("MTU request failed: {:?}", e);
        }
    }

    fn on_mtu(&mut self, value: u16, status: Status) {
        match status {
            Status::Ok => {
                self.session.negotiated_mtu = value.clamp(mtu::DEFAULT, mtu::MAX);
                log::debug!("MTU configured: {}", self.session.negotiated_mtu);
            }
            Status::Failed(code) => {
                log::warn!("MTU exchange failed (0x{:02X}), keeping {}", code, self.session.negotiated_mtu);
            }
        }
    }

    fn on_search_complete(&mut self, conn: ConnId, now: u64) {
        if !self.expect_role(Role::Central, "search complete") {
            return;
        }
        let progress = self.session.progress;
        if progress.search_handled || progress.subscribed {
            log::debug!("Duplicate search complete ignored");
            return;
        }
        self.session.progress.search_handled = true;
        self.session.set_state(LinkState::Discovering, now);

        let Some(handles) = self.resolve_handles(conn) else {
            log::error!("NUS characteristics not found on peer");
            self.fail(now);
            return;
        };
        log::debug!(
            "Resolved rx=0x{:04X} tx=0x{:04X} cccd=0x{:04X}",
            handles.rx,
            handles.tx,
            handles.cccd
        );
        self.session.handles = handles;
        self.session.progress.discovered = true;

        if let Err(e) = self.stack.register_for_notify(conn, handles.tx) {
            log::error!("Notification registration failed: {:?}", e);
            self.fail(now);
            return;
        }
        if let Err(e) = self
            .stack
            .write_descriptor(conn, handles.cccd, &nus::CCCD_ENABLE_NOTIFY)
        {
            log::error!("Enabling notifications failed: {:?}", e);
            self.fail(now);
            return;
        }
        self.session.set_state(LinkState::EnablingNotifications, now);
    }

    fn resolve_handles(&self, conn: ConnId) -> Option<CharacteristicHandles> {
        let service = &self.config.service_uuid;
        let rx = self.stack.find_characteristic(conn, service, &self.config.rx_uuid)?;
        let tx = self.stack.find_characteristic(conn, service, &self.config.tx_uuid)?;
        let cccd = self.stack.find_cccd(conn, tx)?;
        let handles = CharacteristicHandles { rx, tx, cccd };
        handles.is_resolved().then_some(handles)
    }

    fn on_descriptor_written(&mut self, handle: AttHandle, status: Status, now: u64) {
        if handle != self.session.handles.cccd {
            log::warn!("Descriptor write for unknown handle 0x{:04X} ignored", handle);
            return;
        }
        match status {
            Status::Ok => {
                log::debug!("Notifications enabled");
                self.session.progress.subscribed = true;
            }
            Status::Failed(code) => {
                log::error!("Notification enable rejected (0x{:02X})", code);
                self.fail(now);
            }
        }
    }

    fn on_notification(&mut self, handle: AttHandle, data: &[u8], kind: NotifyKind) {
        if kind == NotifyKind::Indication {
            log::warn!("Indications are not supported, dropped {} bytes", data.len());
            return;
        }
        if handle != self.session.handles.tx {
            log::debug!("Notification from handle 0x{:04X} ignored", handle);
            return;
        }
        self.receive(data);
    }

    fn on_passkey_requested(&mut self, conn: ConnId) {
        self.session.progress.security = SecurityState::Pending;
        let Some(passkey) = self.config.passkey else {
            log::warn!("Peer requested a passkey but none is configured");
            return;
        };
        if let Err(e) = self.stack.reply_passkey(conn, passkey) {
            log::warn!("Passkey reply failed: {:?}", e);
        }
    }

    fn on_security_requested(&mut self, conn: ConnId) {
        self.session.progress.security = SecurityState::Pending;
        if let Err(e) = self.stack.accept_security(conn) {
            log::warn!("Accepting security request failed: {:?}", e);
        }
    }

    fn on_auth_completed(&mut self, success: bool, reason: u8) {
        if success {
            log::info!("Authentication complete");
            self.session.progress.security = SecurityState::Completed;
        } else {
            // The state timeout tears the link down
            log::warn!("Authentication failed, reason 0x{:02X}", reason);
            self.session.progress.security = SecurityState::Failed;
        }
    }

    // ---- peripheral ----

    fn on_client_connected(&mut self, conn: ConnId, now: u64) {
        if !self.expect_role(Role::Peripheral, "client connect") {
            return;
        }
        if self.session.conn.is_some() {
            log::warn!("Second client {:?} ignored", conn);
            return;
        }

        log::info!("Client connected ({:?})", conn);
        self.session.conn = Some(conn);
        self.advertising = false;
        self.session.progress.discovered = true;

        if self.config.assume_subscribed {
            self.session.progress.subscribed = true;
            self.establish(now);
        } else {
            self.session.set_state(LinkState::EnablingNotifications, now);
        }
    }

    fn on_rx_written(&mut self, data: &Payload) {
        if !self.expect_role(Role::Peripheral, "RX write") {
            return;
        }
        self.receive(data);
    }

    fn on_subscription(&mut self, enabled: bool) {
        if !self.expect_role(Role::Peripheral, "subscription change") {
            return;
        }
        log::debug!("Notifications {}", if enabled { "enabled" } else { "disabled" });
        self.session.progress.subscribed = enabled;
    }

    // ---- shared ----

    fn on_chunk_written(&mut self, status: Status) {
        self.scheduler.acknowledge();
        if let Status::Failed(code) = status {
            log::warn!("TX chunk write failed (0x{:02X})", code);
        } else if self.tx.is_empty() {
            self.push_link_event(LinkEvent::TxComplete);
        }
        self.pump_tx();
    }

    /// Append inbound bytes with the lossy write
    fn receive(&mut self, data: &[u8]) {
        if data.is_empty() {
            log::warn!("Empty payload received");
            return;
        }
        let evicted = (self.rx.available() + data.len()).saturating_sub(self.rx.capacity());
        self.rx.write(data);
        if evicted > 0 {
            log::warn!("RX buffer full, dropped {} oldest bytes", evicted);
        }
        log::trace!("RX {} bytes: {:02X?}", data.len(), data);
    }
}
