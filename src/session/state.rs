//! Session lifecycle states and per-session progress tracking

use crate::config::mtu;
use crate::link::{CharacteristicHandles, ConnId};

/// Which side of the GATT link this bridge plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client: connects out, discovers, subscribes, writes RX
    Central,
    /// Server: hosts the service, notifies TX
    Peripheral,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Discovering,
    EnablingNotifications,
    Established,
    Disconnecting,
    Error,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Discovering => "discovering",
            LinkState::EnablingNotifications => "enabling notifications",
            LinkState::Established => "established",
            LinkState::Disconnecting => "disconnecting",
            LinkState::Error => "error",
        }
    }

    /// States supervised by the state timeout
    pub fn is_transient(&self) -> bool {
        !matches!(self, LinkState::Idle | LinkState::Established)
    }
}

/// Pairing progress as reported by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityState {
    #[default]
    NotStarted,
    Pending,
    Completed,
    Failed,
}

/// Completion flags gating the transition to `Established`
///
/// Each flag is set by its own stack event; the tick checks them together,
/// so arrival order does not matter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub discovered: bool,
    pub subscribed: bool,
    pub security: SecurityState,
    /// A search-complete has already been handled for this connection
    pub search_handled: bool,
}

impl Progress {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_ready(&self, security_required: bool) -> bool {
        self.discovered
            && self.subscribed
            && (!security_required || self.security == SecurityState::Completed)
    }
}

/// Per-connection session record
#[derive(Debug, Clone)]
pub struct Session {
    pub role: Role,
    state: LinkState,
    state_entered_at: u64,
    pub conn: Option<ConnId>,
    pub negotiated_mtu: u16,
    pub handles: CharacteristicHandles,
    pub progress: Progress,
    /// Last byte-level activity, for the idle timeout
    pub last_activity: u64,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: LinkState::Idle,
            state_entered_at: 0,
            conn: None,
            negotiated_mtu: mtu::DEFAULT,
            handles: CharacteristicHandles::default(),
            progress: Progress::default(),
            last_activity: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn state_entered_at(&self) -> u64 {
        self.state_entered_at
    }

    /// Enter `next`, restarting the state clock. Re-entering the current
    /// state is a no-op so the timeout keeps counting.
    pub fn set_state(&mut self, next: LinkState, now: u64) {
        if next == self.state {
            return;
        }
        log::debug!("Link: {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.state_entered_at = now;
    }

    /// Whether `conn` is the connection this session tracks
    pub fn is_current(&self, conn: ConnId) -> bool {
        self.conn == Some(conn)
    }

    /// Forget everything tied to the last connection
    pub fn reset_link(&mut self) {
        self.conn = None;
        self.negotiated_mtu = mtu::DEFAULT;
        self.progress.reset();
        // Peripheral handles belong to the local service and survive
        if self.role == Role::Central {
            self.handles.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_states() {
        assert!(!LinkState::Idle.is_transient());
        assert!(!LinkState::Established.is_transient());
        assert!(LinkState::Connecting.is_transient());
        assert!(LinkState::Disconnecting.is_transient());
        assert!(LinkState::Error.is_transient());
        assert_eq!(LinkState::EnablingNotifications.as_str(), "enabling notifications");
    }

    #[test]
    fn test_progress_needs_every_flag() {
        let mut progress = Progress::default();
        assert!(!progress.is_ready(false));

        progress.discovered = true;
        assert!(!progress.is_ready(false));
        progress.subscribed = true;
        assert!(progress.is_ready(false));
        assert!(!progress.is_ready(true));

        progress.security = SecurityState::Failed;
        assert!(!progress.is_ready(true));
        progress.security = SecurityState::Completed;
        assert!(progress.is_ready(true));

        progress.reset();
        assert_eq!(progress, Progress::default());
    }

    #[test]
    fn test_set_state_restarts_clock_on_change_only() {
        let mut session = Session::new(Role::Central);
        session.set_state(LinkState::Connecting, 100);
        assert_eq!(session.state_entered_at(), 100);

        session.set_state(LinkState::Connecting, 250);
        assert_eq!(session.state_entered_at(), 100);

        session.set_state(LinkState::Discovering, 300);
        assert_eq!(session.state(), LinkState::Discovering);
        assert_eq!(session.state_entered_at(), 300);
    }

    #[test]
    fn test_reset_link_keeps_peripheral_handles() {
        let handles = CharacteristicHandles {
            rx: 1,
            tx: 2,
            cccd: 3,
        };

        let mut central = Session::new(Role::Central);
        central.handles = handles;
        central.conn = Some(ConnId(1));
        central.negotiated_mtu = 247;
        central.reset_link();
        assert!(!central.handles.is_resolved());
        assert_eq!(central.conn, None);
        assert_eq!(central.negotiated_mtu, mtu::DEFAULT);

        let mut peripheral = Session::new(Role::Peripheral);
        peripheral.handles = handles;
        peripheral.reset_link();
        assert_eq!(peripheral.handles, handles);
    }
}
