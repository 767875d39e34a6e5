//! Bridge configuration
//!
//! Compile-time constants grouped by concern, plus [`BridgeConfig`], the
//! settings record a bridge is constructed with.

use crate::session::state::Role;
use uuid::Uuid;

/// Nordic UART Service identifiers
pub mod nus {
    use uuid::Uuid;

    /// Service UUID: 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
    pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

    /// RX characteristic, the central writes commands here
    pub const RX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

    /// TX characteristic, the peripheral notifies responses here
    pub const TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

    /// CCCD value enabling notifications (0x0001, little-endian)
    pub const CCCD_ENABLE_NOTIFY: [u8; 2] = [0x01, 0x00];
}

/// ATT MTU limits
pub mod mtu {
    /// MTU every connection starts with before the exchange
    pub const DEFAULT: u16 = 23;

    /// MTU requested from the peer unless configured otherwise
    pub const DESIRED: u16 = 247;

    /// Largest MTU a peer may negotiate
    pub const MAX: u16 = 517;

    /// Bytes of every PDU taken by the ATT opcode and handle
    pub const ATT_HEADER_LEN: usize = 3;

    /// Payload used before the MTU exchange completes
    pub const FALLBACK_PAYLOAD: usize = 20;

    /// Largest attribute value GATT permits
    pub const MAX_PAYLOAD: usize = 512;
}

/// Ring buffer sizing
pub mod buffers {
    pub const RX_CAPACITY: usize = 512;
    pub const TX_CAPACITY: usize = 512;
}

/// Timeout defaults, all in milliseconds
pub mod timeouts {
    /// Time allowed in any transient link state
    pub const STATE_MS: u32 = 5000;

    /// Upper bound on a blocking flush
    pub const FLUSH_MS: u32 = 2000;

    /// Idle disconnect (0 = disabled)
    pub const IDLE_MS: u32 = 0;

    /// Delay between flush polls
    pub const FLUSH_POLL_MS: u32 = 5;
}

/// Central-role reconnect backoff
pub mod reconnect {
    pub const INITIAL_BACKOFF_MS: u32 = 1000;
    pub const MAX_BACKOFF_MS: u32 = 30_000;
}

/// Pairing parameters
pub mod security {
    /// Passkeys are six decimal digits
    pub const PASSKEY_MODULUS: u32 = 1_000_000;

    /// Encryption key size requested during pairing
    pub const MAX_KEY_SIZE: u8 = 16;
}

/// Queue depths
pub mod queues {
    /// Stack events buffered between the callback context and the tick
    pub const STACK_EVENTS: usize = 16;

    /// Connected/disconnected/tx-complete notifications awaiting the application
    pub const LINK_EVENTS: usize = 8;
}

/// Errors reported by [`BridgeConfig::validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Desired MTU outside 23..=517
    MtuOutOfRange(u16),
    /// Passkey with more than six digits
    PasskeyOutOfRange(u32),
    /// Two of the service/RX/TX UUIDs are equal
    DuplicateUuid,
    /// A zero state timeout would reset every transient state immediately
    ZeroStateTimeout,
}

/// Settings record for a bridge session
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Which side of the link this bridge plays
    pub role: Role,
    pub service_uuid: Uuid,
    pub rx_uuid: Uuid,
    pub tx_uuid: Uuid,
    /// Pairing passkey. `Some` means the link must be authenticated before
    /// it is treated as established (central role).
    pub passkey: Option<u32>,
    /// MTU requested from the peer
    pub desired_mtu: u16,
    pub flush_timeout_ms: u32,
    pub state_timeout_ms: u32,
    /// Idle disconnect after this long without byte activity (0 = disabled)
    pub idle_timeout_ms: u32,
    /// Central: reconnect with backoff whenever the session falls idle
    pub auto_reconnect: bool,
    /// Central: connect when the application touches the stream while idle
    pub autoconnect_on_access: bool,
    /// Peripheral: advertise at setup and after every client disconnect
    pub auto_advertise: bool,
    /// Peripheral: treat a fresh client as subscribed without waiting for
    /// its CCCD write
    pub assume_subscribed: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            role: Role::Central,
            service_uuid: nus::SERVICE_UUID,
            rx_uuid: nus::RX_UUID,
            tx_uuid: nus::TX_UUID,
            passkey: None,
            desired_mtu: mtu::DESIRED,
            flush_timeout_ms: timeouts::FLUSH_MS,
            state_timeout_ms: timeouts::STATE_MS,
            idle_timeout_ms: timeouts::IDLE_MS,
            auto_reconnect: false,
            autoconnect_on_access: false,
            auto_advertise: true,
            assume_subscribed: true,
        }
    }
}

impl BridgeConfig {
    /// Default configuration for the central (client) role
    pub fn central() -> Self {
        Self::default()
    }

    /// Default configuration for the peripheral (server) role
    pub fn peripheral() -> Self {
        Self {
            role: Role::Peripheral,
            ..Self::default()
        }
    }

    /// Set custom service and characteristic UUIDs
    pub fn with_uuids(mut self, service: Uuid, rx: Uuid, tx: Uuid) -> Self {
        self.service_uuid = service;
        self.rx_uuid = rx;
        self.tx_uuid = tx;
        self
    }

    /// Require pairing with the given passkey (reduced to six digits)
    pub fn with_passkey(mut self, pin: u32) -> Self {
        self.passkey = Some(pin % security::PASSKEY_MODULUS);
        self
    }

    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.desired_mtu = mtu;
        self
    }

    pub fn with_flush_timeout(mut self, timeout_ms: u32) -> Self {
        self.flush_timeout_ms = timeout_ms;
        self
    }

    pub fn with_state_timeout(mut self, timeout_ms: u32) -> Self {
        self.state_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout(mut self, timeout_ms: u32) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_autoconnect_on_access(mut self, enabled: bool) -> Self {
        self.autoconnect_on_access = enabled;
        self
    }

    pub fn with_auto_advertise(mut self, enabled: bool) -> Self {
        self.auto_advertise = enabled;
        self
    }

    pub fn with_assume_subscribed(mut self, enabled: bool) -> Self {
        self.assume_subscribed = enabled;
        self
    }

    /// Whether the link must be authenticated before it counts as established
    pub fn security_required(&self) -> bool {
        self.role == Role::Central && self.passkey.is_some()
    }

    /// Check the record for values the session cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(mtu::DEFAULT..=mtu::MAX).contains(&self.desired_mtu) {
            return Err(ConfigError::MtuOutOfRange(self.desired_mtu));
        }
        if let Some(pin) = self.passkey {
            if pin >= security::PASSKEY_MODULUS {
                return Err(ConfigError::PasskeyOutOfRange(pin));
            }
        }
        if self.service_uuid == self.rx_uuid
            || self.service_uuid == self.tx_uuid
            || self.rx_uuid == self.tx_uuid
        {
            return Err(ConfigError::DuplicateUuid);
        }
        if self.state_timeout_ms == 0 {
            return Err(ConfigError::ZeroStateTimeout);
        }
        Ok(())
    }

    /// Log the effective configuration
    pub fn dump(&self) {
        log::info!("NUS bridge ({:?})", self.role);
        log::info!("  Service UUID: {}", self.service_uuid);
        log::info!("  RX UUID: {}", self.rx_uuid);
        log::info!("  TX UUID: {}", self.tx_uuid);
        log::info!("  Desired MTU: {}", self.desired_mtu);
        log::info!("  Security: {}", if self.passkey.is_some() { "passkey" } else { "none" });
        log::info!("  State timeout: {} ms", self.state_timeout_ms);
        log::info!("  Flush timeout: {} ms", self.flush_timeout_ms);
        log::info!("  Idle timeout: {} ms", self.idle_timeout_ms);
        match self.role {
            Role::Central => {
                log::info!("  Auto reconnect: {}", self.auto_reconnect);
                log::info!("  Autoconnect on access: {}", self.autoconnect_on_access);
            }
            Role::Peripheral => {
                log::info!("  Auto advertise: {}", self.auto_advertise);
                log::info!("  Assume subscribed: {}", self.assume_subscribed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(BridgeConfig::central().validate(), Ok(()));
        assert_eq!(BridgeConfig::peripheral().validate(), Ok(()));
    }

    #[test]
    fn test_passkey_reduced_to_six_digits() {
        let config = BridgeConfig::central().with_passkey(12_345_678);
        assert_eq!(config.passkey, Some(345_678));
        assert!(config.security_required());
    }

    #[test]
    fn test_peripheral_never_requires_security() {
        let config = BridgeConfig::peripheral().with_passkey(123_456);
        assert!(!config.security_required());
    }

    #[test]
    fn test_mtu_range() {
        assert_eq!(
            BridgeConfig::central().with_mtu(22).validate(),
            Err(ConfigError::MtuOutOfRange(22))
        );
        assert_eq!(
            BridgeConfig::central().with_mtu(518).validate(),
            Err(ConfigError::MtuOutOfRange(518))
        );
        assert_eq!(BridgeConfig::central().with_mtu(517).validate(), Ok(()));
    }

    #[test]
    fn test_duplicate_uuids_rejected() {
        let config =
            BridgeConfig::central().with_uuids(nus::SERVICE_UUID, nus::RX_UUID, nus::RX_UUID);
        assert_eq!(config.validate(), Err(ConfigError::DuplicateUuid));
    }

    #[test]
    fn test_zero_state_timeout_rejected() {
        let config = BridgeConfig::central().with_state_timeout(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroStateTimeout));
    }
}
