//! Connection session: state machine, TX scheduling, supervision and the
//! byte-stream facade

pub mod bridge;
pub mod reconnect;
mod router;
pub mod scheduler;
pub mod state;
pub mod watchdog;

pub use bridge::NusBridge;
pub use state::{LinkState, Role};
