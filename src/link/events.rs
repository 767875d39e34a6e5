//! Events crossing from the BLE stack into the session, and from the session
//! out to the application
//!
//! Stack callbacks run in a context the session does not control. They only
//! post a [`StackEvent`] to an [`EventChannel`]; the bridge drains the
//! channel on its own tick.

use crate::config::{mtu::MAX_PAYLOAD, queues};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

use super::traits::{AttHandle, ConnId};

/// Completion status reported by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Stack-specific failure code
    Failed(u8),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// How a value update reached the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Notification,
    Indication,
}

/// Attribute value carried inside an event
pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// Copy `data` into a [`Payload`], keeping at most [`MAX_PAYLOAD`] bytes.
pub fn payload_from(data: &[u8]) -> Payload {
    let len = data.len().min(MAX_PAYLOAD);
    let mut payload = Payload::new();
    // Cannot fail, len is bounded by the capacity
    let _ = payload.extend_from_slice(&data[..len]);
    payload
}

/// Notifications from the BLE stack
#[derive(Debug, Clone, PartialEq)]
pub enum StackEvent {
    /// Connection attempt finished (central)
    Opened { conn: ConnId, status: Status },
    /// MTU exchange finished
    MtuConfigured { conn: ConnId, mtu: u16, status: Status },
    /// Service discovery finished (central)
    SearchComplete { conn: ConnId },
    /// Descriptor write finished (central)
    DescriptorWritten {
        conn: ConnId,
        handle: AttHandle,
        status: Status,
    },
    /// Outbound chunk acknowledged or failed
    ChunkWritten { conn: ConnId, status: Status },
    /// Value update from the peer (central)
    Notification {
        conn: ConnId,
        handle: AttHandle,
        data: Payload,
        kind: NotifyKind,
    },
    /// Peer asks for the passkey (central)
    PasskeyRequested { conn: ConnId },
    /// Peer initiates security (central)
    SecurityRequested { conn: ConnId },
    /// Pairing finished
    AuthCompleted {
        conn: ConnId,
        success: bool,
        reason: u8,
    },
    /// Link closed, for any reason
    Disconnected { conn: ConnId, reason: u8 },
    /// A client connected to our server (peripheral)
    ClientConnected { conn: ConnId },
    /// The client wrote the RX characteristic (peripheral)
    RxWritten { conn: ConnId, data: Payload },
    /// The client changed the TX notify-config descriptor (peripheral)
    SubscriptionChanged { conn: ConnId, enabled: bool },
}

impl StackEvent {
    /// Connection this event refers to
    pub fn conn(&self) -> ConnId {
        match self {
            StackEvent::Opened { conn, .. }
            | StackEvent::MtuConfigured { conn, .. }
            | StackEvent::SearchComplete { conn }
            | StackEvent::DescriptorWritten { conn, .. }
            | StackEvent::ChunkWritten { conn, .. }
            | StackEvent::Notification { conn, .. }
            | StackEvent::PasskeyRequested { conn }
            | StackEvent::SecurityRequested { conn }
            | StackEvent::AuthCompleted { conn, .. }
            | StackEvent::Disconnected { conn, .. }
            | StackEvent::ClientConnected { conn }
            | StackEvent::RxWritten { conn, .. }
            | StackEvent::SubscriptionChanged { conn, .. } => *conn,
        }
    }
}

/// Link notifications surfaced to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link reached `Established`
    Connected,
    /// The link fell back to `Idle`
    Disconnected,
    /// Every staged outbound byte has been acknowledged
    TxComplete,
}

/// Queue the stack posts into
pub type EventChannel = Channel<CriticalSectionRawMutex, StackEvent, { queues::STACK_EVENTS }>;
pub type EventSender<'a> = Sender<'a, CriticalSectionRawMutex, StackEvent, { queues::STACK_EVENTS }>;
pub type EventReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, StackEvent, { queues::STACK_EVENTS }>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_truncates_to_attribute_limit() {
        let data = [0x55u8; MAX_PAYLOAD + 10];
        let payload = payload_from(&data);
        assert_eq!(payload.len(), MAX_PAYLOAD);

        let short = payload_from(b"hello");
        assert_eq!(short.as_slice(), b"hello");
    }

    #[test]
    fn test_event_conn() {
        let event = StackEvent::RxWritten {
            conn: ConnId(9),
            data: payload_from(&[1]),
        };
        assert_eq!(event.conn(), ConnId(9));
    }

    #[test]
    fn test_channel_drops_when_full() {
        let channel = EventChannel::new();
        let sender = channel.sender();
        for _ in 0..queues::STACK_EVENTS {
            assert!(sender.try_send(StackEvent::SearchComplete { conn: ConnId(1) }).is_ok());
        }
        assert!(sender.try_send(StackEvent::SearchComplete { conn: ConnId(1) }).is_err());
    }
}
