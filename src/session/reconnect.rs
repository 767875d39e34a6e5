//! Central-role reconnect gating with exponential backoff

use crate::config::reconnect::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS};

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    enabled: bool,
    on_access: bool,
    /// Wait applied after the next failed attempt
    backoff_ms: u32,
    /// No attempt before this instant
    not_before: u64,
    /// The application touched the stream while idle
    access_pending: bool,
    /// An automatic attempt has not yet succeeded or failed
    attempt_outstanding: bool,
    /// The application ended the link; stay down until it connects again
    suspended: bool,
}

impl ReconnectPolicy {
    pub fn new(enabled: bool, on_access: bool) -> Self {
        Self {
            enabled,
            on_access,
            backoff_ms: INITIAL_BACKOFF_MS,
            not_before: 0,
            access_pending: false,
            attempt_outstanding: false,
            suspended: false,
        }
    }

    pub fn backoff_ms(&self) -> u32 {
        self.backoff_ms
    }

    /// Record a read, peek or write made while idle.
    pub fn note_access(&mut self) {
        if self.on_access {
            self.access_pending = true;
        }
    }

    /// Whether an idle session should try to connect now.
    pub fn should_attempt(&self, now: u64) -> bool {
        ((self.enabled && !self.suspended) || self.access_pending)
            && !self.attempt_outstanding
            && now >= self.not_before
    }

    /// Hold off automatic attempts after a local teardown.
    pub fn suspend(&mut self) {
        self.suspended = true;
        self.attempt_outstanding = false;
        self.backoff_ms = INITIAL_BACKOFF_MS;
        self.not_before = 0;
    }

    /// An explicit connect re-arms automatic attempts.
    pub fn resume(&mut self) {
        self.suspended = false;
    }


    pub fn record_attempt(&mut self) {
        self.access_pending = false;
        self.attempt_outstanding = true;
    }

    /// The link reached `Established`.
    pub fn record_success(&mut self) {
        self.backoff_ms = INITIAL_BACKOFF_MS;
        self.not_before = 0;
        self.attempt_outstanding = false;
    }

    /// The session fell back to `Idle` at `now`.
    ///
    /// Only a failed automatic attempt is penalised; losing an established
    /// link allows an immediate retry.
    pub fn record_teardown(&mut self, now: u64) {
        if self.attempt_outstanding {
            self.not_before = now + u64::from(self.backoff_ms);
            log::debug!("Reconnect attempt failed, retrying in {} ms", self.backoff_ms);
            self.backoff_ms = self.backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
        }
        self.attempt_outstanding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_attempts() {
        let policy = ReconnectPolicy::new(false, false);
        assert!(!policy.should_attempt(0));
        assert!(!policy.should_attempt(1_000_000));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut policy = ReconnectPolicy::new(true, false);
        assert!(policy.should_attempt(0));

        let mut now = 0;
        let mut wait = INITIAL_BACKOFF_MS;
        for _ in 0..10 {
            policy.record_attempt();
            assert!(!policy.should_attempt(now));
            policy.record_teardown(now);

            assert!(!policy.should_attempt(now + u64::from(wait) - 1));
            now += u64::from(wait);
            assert!(policy.should_attempt(now));
            wait = (wait * 2).min(MAX_BACKOFF_MS);
            assert_eq!(policy.backoff_ms(), wait);
        }
        assert_eq!(policy.backoff_ms(), MAX_BACKOFF_MS);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut policy = ReconnectPolicy::new(true, false);
        policy.record_attempt();
        policy.record_teardown(0);
        assert_eq!(policy.backoff_ms(), 2 * INITIAL_BACKOFF_MS);

        policy.record_attempt();
        policy.record_success();
        assert_eq!(policy.backoff_ms(), INITIAL_BACKOFF_MS);

        // Losing an established link does not wait
        policy.record_teardown(5000);
        assert_eq!(policy.backoff_ms(), INITIAL_BACKOFF_MS);
        assert!(policy.should_attempt(5000));
    }

    #[test]
    fn test_access_triggers_single_attempt() {
        let mut policy = ReconnectPolicy::new(false, true);
        assert!(!policy.should_attempt(0));

        policy.note_access();
        assert!(policy.should_attempt(0));
        policy.record_attempt();
        policy.record_teardown(0);
        assert!(!policy.should_attempt(50_000));
    }

    #[test]
    fn test_suspend_holds_until_resume() {
        let mut policy = ReconnectPolicy::new(true, false);
        policy.record_attempt();
        policy.record_success();

        policy.suspend();
        policy.record_teardown(1000);
        assert!(!policy.should_attempt(1000));
        assert!(!policy.should_attempt(1_000_000));

        policy.resume();
        assert!(policy.should_attempt(1_000_000));
    }

    #[test]
    fn test_access_overrides_suspend() {
        let mut policy = ReconnectPolicy::new(true, true);
        policy.suspend();
        assert!(!policy.should_attempt(0));

        policy.note_access();
        assert!(policy.should_attempt(0));
    }

    #[test]
    fn test_access_ignored_without_autoconnect() {
        let mut policy = ReconnectPolicy::new(false, false);
        policy.note_access();
        assert!(!policy.should_attempt(0));
    }
}
