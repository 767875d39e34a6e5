//! State and idle timeout supervision

use super::state::LinkState;

/// What the watchdog wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// A transient state outlived the state timeout
    StateTimeout(LinkState),
    /// An established link saw no byte activity for too long
    IdleTimeout,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchdogPolicy {
    state_timeout_ms: u32,
    /// 0 disables the idle check
    idle_timeout_ms: u32,
}

impl WatchdogPolicy {
    pub const fn new(state_timeout_ms: u32, idle_timeout_ms: u32) -> Self {
        Self {
            state_timeout_ms,
            idle_timeout_ms,
        }
    }

    /// Check the current state against both timeouts.
    ///
    /// Deadlines are exclusive: a state entered at `t` with a 1000 ms
    /// timeout is still fine at `t + 1000` and expires at `t + 1001`.
    pub fn check(
        &self,
        state: LinkState,
        entered_at: u64,
        last_activity: u64,
        now: u64,
    ) -> Option<WatchdogAction> {
        if state.is_transient() {
            let elapsed = now.saturating_sub(entered_at);
            if elapsed > u64::from(self.state_timeout_ms) {
                return Some(WatchdogAction::StateTimeout(state));
            }
        } else if state == LinkState::Established && self.idle_timeout_ms > 0 {
            let idle = now.saturating_sub(last_activity);
            if idle > u64::from(self.idle_timeout_ms) {
                return Some(WatchdogAction::IdleTimeout);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_state_expiry() {
        let watchdog = WatchdogPolicy::new(5000, 0);
        for state in [
            LinkState::Connecting,
            LinkState::Discovering,
            LinkState::EnablingNotifications,
            LinkState::Disconnecting,
            LinkState::Error,
        ] {
            assert_eq!(watchdog.check(state, 100, 0, 5100), None);
            assert_eq!(
                watchdog.check(state, 100, 0, 5101),
                Some(WatchdogAction::StateTimeout(state))
            );
        }
    }

    #[test]
    fn test_idle_and_established_have_no_state_timeout() {
        let watchdog = WatchdogPolicy::new(10, 0);
        assert_eq!(watchdog.check(LinkState::Idle, 0, 0, 1_000_000), None);
        assert_eq!(watchdog.check(LinkState::Established, 0, 0, 1_000_000), None);
    }

    #[test]
    fn test_idle_timeout() {
        let watchdog = WatchdogPolicy::new(5000, 1000);
        assert_eq!(watchdog.check(LinkState::Established, 0, 500, 1500), None);
        assert_eq!(
            watchdog.check(LinkState::Established, 0, 500, 1501),
            Some(WatchdogAction::IdleTimeout)
        );
        // Not applied outside Established
        assert_eq!(watchdog.check(LinkState::Idle, 0, 0, 9999), None);
    }
}
