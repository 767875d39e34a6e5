//! BLE stack trait for abstraction and testability
//!
//! The session never owns a radio. It drives whatever implements
//! [`BleStack`]: the trouble-host adapter on hardware, or the mock here in
//! tests. Every method only submits a request; completions come back later
//! as [`StackEvent`](super::events::StackEvent)s.

use crate::config::security::MAX_KEY_SIZE;
use uuid::Uuid;

/// Identifier the stack assigns to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u16);

/// ATT attribute handle. Zero means "not resolved yet".
pub type AttHandle = u16;

/// Handle value for an unresolved attribute
pub const UNRESOLVED: AttHandle = 0;

/// Transport handles of the NUS characteristics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicHandles {
    /// Commands in (written by the central)
    pub rx: AttHandle,
    /// Responses out (notified by the peripheral)
    pub tx: AttHandle,
    /// Notify-config descriptor of `tx`
    pub cccd: AttHandle,
}

impl CharacteristicHandles {
    pub fn is_resolved(&self) -> bool {
        self.rx != UNRESOLVED && self.tx != UNRESOLVED && self.cccd != UNRESOLVED
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Errors a stack can report when a request is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// No connection for the request
    NotConnected,
    /// A conflicting operation is still outstanding
    Busy,
    /// The handle does not belong to this connection
    InvalidHandle,
    /// The controller refused the request
    Rejected,
    /// The request queue towards the stack is full
    QueueFull,
    /// The stack does not implement this operation for its role
    Unsupported,
}

/// Pairing input/output capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCapability {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    NoInputNoOutput,
    KeyboardDisplay,
}

/// Security parameters pushed to the stack before connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityParams {
    pub bonding: bool,
    pub mitm: bool,
    pub secure_connections: bool,
    pub io_capability: IoCapability,
    pub max_key_size: u8,
    pub oob: bool,
}

impl SecurityParams {
    /// LE Secure Connections with MITM protection and bonding, where this
    /// side types in the peer's passkey
    pub const fn passkey_entry() -> Self {
        Self {
            bonding: true,
            mitm: true,
            secure_connections: true,
            io_capability: IoCapability::KeyboardOnly,
            max_key_size: MAX_KEY_SIZE,
            oob: false,
        }
    }
}

/// Abstract BLE stack interface
///
/// Shared operations come first, then central-only and peripheral-only
/// ones. Role-specific operations default to [`StackError::Unsupported`] so
/// an adapter only implements what its role needs.
pub trait BleStack {
    /// Request a disconnect. `None` cancels a pending connection attempt.
    fn disconnect(&mut self, conn: Option<ConnId>) -> Result<(), StackError>;

    /// Submit one outbound chunk: a write-with-response on the RX
    /// characteristic (central) or a notification on TX (peripheral).
    ///
    /// Completion is reported with `StackEvent::ChunkWritten`.
    fn send_chunk(&mut self, conn: ConnId, handle: AttHandle, data: &[u8]) -> Result<(), StackError>;

    /// Set the MTU offered during the exchange.
    fn set_local_mtu(&mut self, _mtu: u16) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Configure pairing before connecting.
    fn configure_security(&mut self, _params: &SecurityParams) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Open a connection to the configured peer.
    fn open(&mut self) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Start the MTU exchange on an open connection.
    fn request_mtu(&mut self, _conn: ConnId) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Look up a discovered characteristic by UUID.
    fn find_characteristic(
        &self,
        _conn: ConnId,
        _service: &Uuid,
        _characteristic: &Uuid,
    ) -> Option<AttHandle> {
        None
    }

    /// Look up the notify-config descriptor of a characteristic.
    fn find_cccd(&self, _conn: ConnId, _characteristic: AttHandle) -> Option<AttHandle> {
        None
    }

    /// Route notifications for `handle` to this client.
    fn register_for_notify(&mut self, _conn: ConnId, _handle: AttHandle) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Write a descriptor; completion is `StackEvent::DescriptorWritten`.
    fn write_descriptor(
        &mut self,
        _conn: ConnId,
        _handle: AttHandle,
        _value: &[u8],
    ) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Answer a passkey request.
    fn reply_passkey(&mut self, _conn: ConnId, _passkey: u32) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Accept a peer-initiated security request.
    fn accept_security(&mut self, _conn: ConnId) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    /// Register the UART service and return the handles assigned to it.
    fn register_service(
        &mut self,
        _service: &Uuid,
        _rx: &Uuid,
        _tx: &Uuid,
    ) -> Result<CharacteristicHandles, StackError> {
        Err(StackError::Unsupported)
    }

    fn start_advertising(&mut self) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }

    fn stop_advertising(&mut self) -> Result<(), StackError> {
        Err(StackError::Unsupported)
    }
}

#[cfg(test)]
pub mod mock {
    //! Mock BLE stack for testing

    use super::*;
    use crate::link::events::{EventSender, Status, StackEvent};

    /// One recorded request
    #[derive(Debug, Clone, PartialEq)]
    pub enum StackCall {
        Disconnect(Option<ConnId>),
        SendChunk { handle: AttHandle, data: Vec<u8> },
        SetLocalMtu(u16),
        ConfigureSecurity(SecurityParams),
        Open,
        RequestMtu(ConnId),
        RegisterForNotify(AttHandle),
        WriteDescriptor { handle: AttHandle, value: Vec<u8> },
        ReplyPasskey(u32),
        AcceptSecurity,
        RegisterService,
        StartAdvertising,
        StopAdvertising,
    }

    /// Mock BLE stack for unit testing
    pub struct MockStack<'a> {
        calls: Vec<StackCall>,
        /// Discovered characteristics as (uuid, handle)
        characteristics: Vec<(Uuid, AttHandle)>,
        /// CCCDs as (characteristic handle, descriptor handle)
        cccds: Vec<(AttHandle, AttHandle)>,
        /// Handles returned by register_service()
        local_handles: CharacteristicHandles,
        /// Error to return on next send_chunk
        next_send_error: Option<StackError>,
        /// Error to return on next write_descriptor
        next_descriptor_error: Option<StackError>,
        /// Error to return on next open
        next_open_error: Option<StackError>,
        /// When set, every accepted chunk is acknowledged through this sender
        auto_ack: Option<EventSender<'a>>,
    }

    impl<'a> MockStack<'a> {
        /// Create a mock with no discovered attributes
        pub fn new() -> Self {
            Self {
                calls: Vec::new(),
                characteristics: Vec::new(),
                cccds: Vec::new(),
                local_handles: CharacteristicHandles::default(),
                next_send_error: None,
                next_descriptor_error: None,
                next_open_error: None,
                auto_ack: None,
            }
        }

        /// Create a mock that exposes a standard UART service with
        /// RX = `0x0010`, TX = `0x0012`, CCCD = `0x0013`
        pub fn with_uart_service() -> Self {
            let mut stack = Self::new();
            stack.add_characteristic(crate::config::nus::RX_UUID, 0x0010);
            stack.add_characteristic(crate::config::nus::TX_UUID, 0x0012);
            stack.add_cccd(0x0012, 0x0013);
            stack.local_handles = CharacteristicHandles {
                rx: 0x0010,
                tx: 0x0012,
                cccd: 0x0013,
            };
            stack
        }

        /// Acknowledge every accepted chunk through `sender`
        pub fn with_auto_ack(mut self, sender: EventSender<'a>) -> Self {
            self.auto_ack = Some(sender);
            self
        }

        pub fn add_characteristic(&mut self, uuid: Uuid, handle: AttHandle) {
            self.characteristics.push((uuid, handle));
        }

        pub fn add_cccd(&mut self, characteristic: AttHandle, descriptor: AttHandle) {
            self.cccds.push((characteristic, descriptor));
        }

        /// Set an error to be returned by the next send_chunk() call
        pub fn set_next_send_error(&mut self, error: StackError) {
            self.next_send_error = Some(error);
        }

        /// Set an error to be returned by the next write_descriptor() call
        pub fn set_next_descriptor_error(&mut self, error: StackError) {
            self.next_descriptor_error = Some(error);
        }

        /// Set an error to be returned by the next open() call
        pub fn set_next_open_error(&mut self, error: StackError) {
            self.next_open_error = Some(error);
        }

        /// All requests in submission order
        pub fn calls(&self) -> &[StackCall] {
            &self.calls
        }

        /// Payloads of every submitted chunk
        pub fn sent_chunks(&self) -> Vec<Vec<u8>> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    StackCall::SendChunk { data, .. } => Some(data.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn disconnect_count(&self) -> usize {
            self.count(|call| matches!(call, StackCall::Disconnect(_)))
        }

        pub fn count(&self, predicate: impl Fn(&StackCall) -> bool) -> usize {
            self.calls.iter().filter(|call| predicate(call)).count()
        }

        pub fn clear_calls(&mut self) {
            self.calls.clear();
        }
    }

    impl Default for MockStack<'_> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BleStack for MockStack<'_> {
        fn disconnect(&mut self, conn: Option<ConnId>) -> Result<(), StackError> {
            self.calls.push(StackCall::Disconnect(conn));
            Ok(())
        }

        fn send_chunk(&mut self, conn: ConnId, handle: AttHandle, data: &[u8]) -> Result<(), StackError> {
            if let Some(error) = self.next_send_error.take() {
                return Err(error);
            }
            self.calls.push(StackCall::SendChunk {
                handle,
                data: data.to_vec(),
            });
            if let Some(sender) = &self.auto_ack {
                let _ = sender.try_send(StackEvent::ChunkWritten {
                    conn,
                    status: Status::Ok,
                });
            }
            Ok(())
        }

        fn set_local_mtu(&mut self, mtu: u16) -> Result<(), StackError> {
            self.calls.push(StackCall::SetLocalMtu(mtu));
            Ok(())
        }

        fn configure_security(&mut self, params: &SecurityParams) -> Result<(), StackError> {
            self.calls.push(StackCall::ConfigureSecurity(*params));
            Ok(())
        }

        fn open(&mut self) -> Result<(), StackError> {
            if let Some(error) = self.next_open_error.take() {
                return Err(error);
            }
            self.calls.push(StackCall::Open);
            Ok(())
        }

        fn request_mtu(&mut self, conn: ConnId) -> Result<(), StackError> {
            self.calls.push(StackCall::RequestMtu(conn));
            Ok(())
        }

        fn find_characteristic(
            &self,
            _conn: ConnId,
            _service: &Uuid,
            characteristic: &Uuid,
        ) -> Option<AttHandle> {
            self.characteristics
                .iter()
                .find(|(uuid, _)| uuid == characteristic)
                .map(|(_, handle)| *handle)
        }

        fn find_cccd(&self, _conn: ConnId, characteristic: AttHandle) -> Option<AttHandle> {
            self.cccds
                .iter()
                .find(|(chr, _)| *chr == characteristic)
                .map(|(_, descriptor)| *descriptor)
        }

        fn register_for_notify(&mut self, _conn: ConnId, handle: AttHandle) -> Result<(), StackError> {
            self.calls.push(StackCall::RegisterForNotify(handle));
            Ok(())
        }

        fn write_descriptor(
            &mut self,
            _conn: ConnId,
            handle: AttHandle,
            value: &[u8],
        ) -> Result<(), StackError> {
            if let Some(error) = self.next_descriptor_error.take() {
                return Err(error);
            }
            self.calls.push(StackCall::WriteDescriptor {
                handle,
                value: value.to_vec(),
            });
            Ok(())
        }

        fn reply_passkey(&mut self, _conn: ConnId, passkey: u32) -> Result<(), StackError> {
            self.calls.push(StackCall::ReplyPasskey(passkey));
            Ok(())
        }

        fn accept_security(&mut self, _conn: ConnId) -> Result<(), StackError> {
            self.calls.push(StackCall::AcceptSecurity);
            Ok(())
        }

        fn register_service(
            &mut self,
            _service: &Uuid,
            _rx: &Uuid,
            _tx: &Uuid,
        ) -> Result<CharacteristicHandles, StackError> {
            self.calls.push(StackCall::RegisterService);
            Ok(self.local_handles)
        }

        fn start_advertising(&mut self) -> Result<(), StackError> {
            self.calls.push(StackCall::StartAdvertising);
            Ok(())
        }

        fn stop_advertising(&mut self) -> Result<(), StackError> {
            self.calls.push(StackCall::StopAdvertising);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::config::nus;
        use crate::link::events::EventChannel;

        #[test]
        fn test_mock_resolves_uart_service() {
            let stack = MockStack::with_uart_service();
            let conn = ConnId(1);

            let rx = stack.find_characteristic(conn, &nus::SERVICE_UUID, &nus::RX_UUID);
            let tx = stack.find_characteristic(conn, &nus::SERVICE_UUID, &nus::TX_UUID);
            assert_eq!(rx, Some(0x0010));
            assert_eq!(tx, Some(0x0012));
            assert_eq!(stack.find_cccd(conn, 0x0012), Some(0x0013));
            assert_eq!(stack.find_cccd(conn, 0x0010), None);
        }

        #[test]
        fn test_mock_send_error_is_one_shot() {
            let mut stack = MockStack::new();
            stack.set_next_send_error(StackError::Busy);

            assert_eq!(stack.send_chunk(ConnId(1), 0x10, &[1]), Err(StackError::Busy));
            assert_eq!(stack.send_chunk(ConnId(1), 0x10, &[2]), Ok(()));
            assert_eq!(stack.sent_chunks(), vec![vec![2]]);
        }

        #[test]
        fn test_mock_auto_ack_posts_event() {
            let channel = EventChannel::new();
            let mut stack = MockStack::new().with_auto_ack(channel.sender());

            stack.send_chunk(ConnId(4), 0x10, &[1, 2]).unwrap();
            assert_eq!(
                channel.try_receive(),
                Ok(StackEvent::ChunkWritten {
                    conn: ConnId(4),
                    status: Status::Ok
                })
            );
        }
    }
}
