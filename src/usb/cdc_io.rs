//! `embedded_io_async` adapters for the CDC-ACM packet API

use embassy_usb::class::cdc_acm::{Receiver, Sender};
use embassy_usb::driver::{Driver, EndpointError};
use embedded_io_async::{ErrorType, Read, Write};

/// CDC port errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcError {
    /// Host closed the port or the bus was reset
    Disconnected,
    /// Packet larger than the endpoint allows
    Overflow,
}

impl From<EndpointError> for CdcError {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::BufferOverflow => CdcError::Overflow,
            EndpointError::Disabled => CdcError::Disconnected,
        }
    }
}

impl embedded_io::Error for CdcError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            CdcError::Disconnected => embedded_io::ErrorKind::NotConnected,
            CdcError::Overflow => embedded_io::ErrorKind::OutOfMemory,
        }
    }
}

/// Byte reader over a CDC receiver. Waits for DTR before each read.
pub struct CdcReader<'d, D: Driver<'d>> {
    inner: Receiver<'d, D>,
}

impl<'d, D: Driver<'d>> CdcReader<'d, D> {
    pub fn new(inner: Receiver<'d, D>) -> Self {
        Self { inner }
    }
}

impl<'d, D: Driver<'d>> ErrorType for CdcReader<'d, D> {
    type Error = CdcError;
}

impl<'d, D: Driver<'d>> Read for CdcReader<'d, D> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.inner.wait_connection().await;
        Ok(self.inner.read_packet(buf).await?)
    }
}

/// Byte writer over a CDC sender
///
/// Splits writes into endpoint-sized packets and terminates a transfer that
/// ends on a packet boundary with a zero-length packet on flush.
pub struct CdcWriter<'d, D: Driver<'d>> {
    inner: Sender<'d, D>,
    needs_zlp: bool,
}

impl<'d, D: Driver<'d>> CdcWriter<'d, D> {
    pub fn new(inner: Sender<'d, D>) -> Self {
        Self {
            inner,
            needs_zlp: false,
        }
    }
}

impl<'d, D: Driver<'d>> ErrorType for CdcWriter<'d, D> {
    type Error = CdcError;
}

impl<'d, D: Driver<'d>> Write for CdcWriter<'d, D> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.inner.wait_connection().await;

        let max = usize::from(self.inner.max_packet_size());
        let len = buf.len().min(max);
        self.inner.write_packet(&buf[..len]).await?;
        self.needs_zlp = len == max;
        Ok(len)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        if self.needs_zlp {
            self.inner.write_packet(&[]).await?;
            self.needs_zlp = false;
        }
        Ok(())
    }
}
