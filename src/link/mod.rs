//! Boundary between the session and the BLE stack

pub mod clock;
pub mod events;
pub mod traits;

pub use clock::Clock;
pub use events::{EventChannel, EventReceiver, EventSender, LinkEvent, StackEvent, Status};
pub use traits::{AttHandle, BleStack, CharacteristicHandles, ConnId, SecurityParams, StackError};
