//! The bridge session: byte-stream contract plus session control
//!
//! `NusBridge` owns the ring buffers, the scheduler and the state machine.
//! Stack callbacks never call into it; they post [`StackEvent`]s to the
//! channel whose receiver the bridge holds, and [`NusBridge::tick`] drains
//! them. Everything here runs in one context, so nothing needs a lock.

use embedded_hal_async::delay::DelayNs;
use heapless::Deque;

use crate::buffer::{ByteRingBuffer, PeekCache};
use crate::config::{buffers, queues, timeouts, BridgeConfig, ConfigError};
use crate::link::{BleStack, Clock, EventReceiver, LinkEvent, SecurityParams};

use super::reconnect::ReconnectPolicy;
use super::scheduler::{ChunkOutcome, ChunkScheduler};
use super::state::{LinkState, Role, Session};
use super::watchdog::{WatchdogAction, WatchdogPolicy};

pub struct NusBridge<'a, S: BleStack, C: Clock> {
    pub(super) config: BridgeConfig,
    pub(super) stack: S,
    pub(super) clock: C,
    pub(super) events: EventReceiver<'a>,
    pub(super) session: Session,
    pub(super) rx: ByteRingBuffer<{ buffers::RX_CAPACITY }>,
    pub(super) tx: ByteRingBuffer<{ buffers::TX_CAPACITY }>,
    pub(super) peek: PeekCache,
    pub(super) scheduler: ChunkScheduler,
    pub(super) watchdog: WatchdogPolicy,
    pub(super) reconnect: ReconnectPolicy,
    pub(super) link_events: Deque<LinkEvent, { queues::LINK_EVENTS }>,
    pub(super) advertising: bool,
}

impl<'a, S: BleStack, C: Clock> NusBridge<'a, S, C> {
    pub fn new(config: BridgeConfig, stack: S, clock: C, events: EventReceiver<'a>) -> Self {
        let watchdog = WatchdogPolicy::new(config.state_timeout_ms, config.idle_timeout_ms);
        let reconnect = ReconnectPolicy::new(config.auto_reconnect, config.autoconnect_on_access);
        Self {
            session: Session::new(config.role),
            config,
            stack,
            clock,
            events,
            rx: ByteRingBuffer::new(),
            tx: ByteRingBuffer::new(),
            peek: PeekCache::new(),
            scheduler: ChunkScheduler::new(),
            watchdog,
            reconnect,
            link_events: Deque::new(),
            advertising: false,
        }
    }

    /// Validate and log the configuration; a peripheral also registers its
    /// service and starts advertising.
    pub fn setup(&mut self) -> Result<(), ConfigError> {
        self.dump_config();
        if let Err(e) = self.config.validate() {
            log::error!("Invalid bridge configuration: {:?}", e);
            return Err(e);
        }

        if self.config.role == Role::Peripheral {
            match self.stack.register_service(
                &self.config.service_uuid,
                &self.config.rx_uuid,
                &self.config.tx_uuid,
            ) {
                Ok(handles) => {
                    log::debug!(
                        "NUS service registered: rx=0x{:04X} tx=0x{:04X} cccd=0x{:04X}",
                        handles.rx,
                        handles.tx,
                        handles.cccd
                    );
                    self.session.handles = handles;
                }
                Err(e) => {
                    // No service, nothing a client could talk to
                    log::error!("NUS service registration failed: {:?}", e);
                    return Ok(());
                }
            }
            if self.config.auto_advertise {
                self.start_advertising();
            }
        }
        Ok(())
    }

    pub fn dump_config(&self) {
        self.config.dump();
    }

    /// One scheduling pass: route queued stack events, run the watchdog,
    /// check the rendezvous or reconnect gate, then move TX bytes.
    pub fn tick(&mut self) {
        for _ in 0..queues::STACK_EVENTS {
            match self.events.try_receive() {
                Ok(event) => self.route(event),
                Err(_) => break,
            }
        }

        let now = self.clock.now_ms();
        if let Some(action) = self.watchdog.check(
            self.session.state(),
            self.session.state_entered_at(),
            self.session.last_activity,
            now,
        ) {
            self.on_watchdog(action, now);
        }

        match self.session.state() {
            LinkState::EnablingNotifications => self.try_establish(now),
            LinkState::Idle => self.maybe_reconnect(now),
            _ => {}
        }

        self.pump_tx();
    }

    // ---- byte stream ----

    /// Stage bytes for transmission. Bytes beyond the free TX space are
    /// dropped with a warning.
    pub fn write(&mut self, data: &[u8]) {
        self.touch();
        let written = self.tx.write_without_replacement(data);
        if written < data.len() {
            log::warn!("TX buffer full, dropped {} bytes", data.len() - written);
        }
        self.pump_tx();
    }

    pub fn available(&self) -> usize {
        self.peek.available(&self.rx)
    }

    /// Next received byte without consuming it
    pub fn peek(&mut self) -> Option<u8> {
        self.touch();
        self.peek.peek(&mut self.rx)
    }

    /// Consume up to `out.len()` received bytes. Never waits.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.touch();
        self.peek.read(&mut self.rx, out)
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte) {
            1 => Some(byte[0]),
            _ => None,
        }
    }

    /// Fill all of `out` or consume nothing.
    pub fn read_array(&mut self, out: &mut [u8]) -> bool {
        self.touch();
        if self.available() < out.len() {
            return false;
        }
        self.peek.read(&mut self.rx, out) == out.len()
    }

    /// Run ticks until every staged byte is acknowledged or the flush
    /// timeout elapses. Gives up with a warning, never an error.
    pub async fn flush<D: DelayNs>(&mut self, delay: &mut D) {
        let start = self.clock.now_ms();
        let limit = u64::from(self.config.flush_timeout_ms);
        loop {
            self.tick();
            if self.tx_idle() {
                return;
            }
            if self.clock.now_ms().saturating_sub(start) >= limit {
                log::warn!(
                    "Flush timed out after {} ms, {} bytes still queued",
                    self.config.flush_timeout_ms,
                    self.tx.available()
                );
                return;
            }
            delay.delay_ms(timeouts::FLUSH_POLL_MS).await;
        }
    }

    /// Bytes `write` can still stage without dropping any
    pub fn tx_free(&self) -> usize {
        self.tx.free()
    }

    /// Nothing staged and nothing awaiting acknowledgment
    pub fn tx_idle(&self) -> bool {
        self.tx.is_empty() && !self.scheduler.in_flight()
    }

    // ---- session control ----

    /// Start a central connection attempt.
    ///
    /// Refused (returning `false`, state untouched) unless the session is
    /// idle, and always refused for the peripheral role.
    pub fn connect(&mut self) -> bool {
        if self.config.role != Role::Central {
            log::warn!("connect() is only available to the central role");
            return false;
        }
        let state = self.session.state();
        if state != LinkState::Idle {
            log::warn!("connect() refused while {}", state.as_str());
            return false;
        }

        self.reconnect.resume();
        self.session.reset_link();
        self.scheduler.abandon();

        if let Err(e) = self.stack.set_local_mtu(self.config.desired_mtu) {
            log::warn!("Failed to set local MTU {}: {:?}", self.config.desired_mtu, e);
        }
        if self.config.security_required() {
            if let Err(e) = self.stack.configure_security(&SecurityParams::passkey_entry()) {
                log::warn!("Failed to configure security: {:?}", e);
            }
        }
        if let Err(e) = self.stack.open() {
            log::warn!("Connection request failed: {:?}", e);
            return false;
        }

        log::info!("Connecting...");
        self.session.set_state(LinkState::Connecting, self.clock.now_ms());
        true
    }

    /// Tear the link down. Always accepted; a no-op while idle.
    ///
    /// Auto-reconnect stays off afterwards until the next `connect()`.
    pub fn disconnect(&mut self) {
        let now = self.clock.now_ms();
        self.reconnect.suspend();
        match self.session.state() {
            LinkState::Idle | LinkState::Disconnecting => return,
            _ => {}
        }

        match self.session.conn {
            Some(conn) => {
                self.session.set_state(LinkState::Disconnecting, now);
                if let Err(e) = self.stack.disconnect(Some(conn)) {
                    log::warn!("Disconnect request failed: {:?}", e);
                    self.enter_idle(now);
                }
            }
            None => {
                // Nothing open yet, cancel the attempt
                let _ = self.stack.disconnect(None);
                self.enter_idle(now);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.state() == LinkState::Established
    }

    pub fn state(&self) -> LinkState {
        self.session.state()
    }

    pub fn negotiated_mtu(&self) -> u16 {
        self.session.negotiated_mtu
    }

    /// Next connected/disconnected/tx-complete notification
    pub fn poll_link_event(&mut self) -> Option<LinkEvent> {
        self.link_events.pop_front()
    }

    /// Begin advertising (peripheral only). Returns whether the stack is
    /// advertising afterwards.
    pub fn start_advertising(&mut self) -> bool {
        if self.config.role != Role::Peripheral || self.session.state() != LinkState::Idle {
            return false;
        }
        if self.advertising {
            return true;
        }
        match self.stack.start_advertising() {
            Ok(()) => {
                log::info!("Advertising");
                self.advertising = true;
            }
            Err(e) => log::warn!("Failed to start advertising: {:?}", e),
        }
        self.advertising
    }

    pub fn stop_advertising(&mut self) {
        if !self.advertising {
            return;
        }
        if let Err(e) = self.stack.stop_advertising() {
            log::warn!("Failed to stop advertising: {:?}", e);
        }
        self.advertising = false;
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    // ---- internals shared with the router ----

    /// Byte-level activity from the application
    fn touch(&mut self) {
        self.session.last_activity = self.clock.now_ms();
        if self.session.state() == LinkState::Idle {
            self.reconnect.note_access();
        }
    }

    pub(super) fn push_link_event(&mut self, event: LinkEvent) {
        if self.link_events.is_full() {
            log::debug!("Link event queue full, dropping oldest");
            self.link_events.pop_front();
        }
        let _ = self.link_events.push_back(event);
    }

    /// Move to `Established` once every completion flag is in.
    pub(super) fn try_establish(&mut self, now: u64) {
        if self.session.progress.is_ready(self.config.security_required()) {
            self.establish(now);
        }
    }

    pub(super) fn establish(&mut self, now: u64) {
        self.session.set_state(LinkState::Established, now);
        self.session.last_activity = now;
        self.reconnect.record_success();
        log::info!("Connected (MTU {})", self.session.negotiated_mtu);
        self.push_link_event(LinkEvent::Connected);
    }

    /// Unrecoverable failure of the current session.
    ///
    /// With an open connection the session waits in `Error` for the stack's
    /// disconnect (the state timeout backs this up); without one there is
    /// nothing to tear down and it drops straight back to `Idle`.
    pub(super) fn fail(&mut self, now: u64) {
        self.session.set_state(LinkState::Error, now);
        match self.session.conn {
            Some(conn) => {
                if let Err(e) = self.stack.disconnect(Some(conn)) {
                    log::warn!("Disconnect request failed: {:?}", e);
                    self.enter_idle(now);
                }
            }
            None => self.enter_idle(now),
        }
    }

    /// Return to `Idle`, keeping buffered RX/TX bytes.
    pub(super) fn enter_idle(&mut self, now: u64) {
        let was = self.session.state();
        self.scheduler.abandon();
        self.peek.clear();
        self.session.reset_link();
        self.session.set_state(LinkState::Idle, now);

        if was != LinkState::Idle {
            log::info!("Disconnected");
            self.push_link_event(LinkEvent::Disconnected);
            self.reconnect.record_teardown(now);
        }
        if self.config.role == Role::Peripheral && self.config.auto_advertise {
            self.start_advertising();
        }
    }

    fn on_watchdog(&mut self, action: WatchdogAction, now: u64) {
        match action {
            WatchdogAction::StateTimeout(state) => {
                log::warn!(
                    "Timed out while {} after {} ms, resetting",
                    state.as_str(),
                    self.config.state_timeout_ms
                );
                if let Err(e) = self.stack.disconnect(self.session.conn) {
                    log::debug!("Forced disconnect: {:?}", e);
                }
                self.enter_idle(now);
            }
            WatchdogAction::IdleTimeout => {
                log::info!("No activity for {} ms, disconnecting", self.config.idle_timeout_ms);
                self.disconnect();
            }
        }
    }

    fn maybe_reconnect(&mut self, now: u64) {
        if self.config.role != Role::Central || !self.reconnect.should_attempt(now) {
            return;
        }
        log::info!("Reconnecting (backoff {} ms)", self.reconnect.backoff_ms());
        self.reconnect.record_attempt();
        if !self.connect() {
            self.reconnect.record_teardown(now);
        }
    }

    /// Submit the next TX chunk if the link can carry one.
    pub(super) fn pump_tx(&mut self) {
        if self.session.state() != LinkState::Established || !self.session.progress.subscribed {
            return;
        }
        let Some(conn) = self.session.conn else {
            return;
        };
        let handle = match self.config.role {
            Role::Central => self.session.handles.rx,
            Role::Peripheral => self.session.handles.tx,
        };

        if let ChunkOutcome::Sent(len) = self.scheduler.pump(
            &mut self.tx,
            &mut self.stack,
            conn,
            handle,
            self.session.negotiated_mtu,
        ) {
            log::trace!("TX: {} bytes in flight, {} queued", len, self.tx.available());
        }
    }
}
