//! Byte staging buffers shared by both link roles

pub mod peek;
pub mod ring;

pub use peek::PeekCache;
pub use ring::ByteRingBuffer;
