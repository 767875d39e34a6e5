//! Monotonic time source for timeouts

/// Millisecond clock
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Clock backed by the embassy time driver
#[cfg(feature = "embedded")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embedded")]
impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

#[cfg(test)]
pub mod mock {
    //! Manually advanced clock and a delay that advances it

    use super::Clock;
    use core::cell::Cell;
    use embedded_hal_async::delay::DelayNs;

    #[derive(Debug, Default)]
    pub struct MockClock {
        now: Cell<u64>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, ms: u64) {
            self.now.set(ms);
        }

        pub fn advance(&self, ms: u64) {
            self.now.set(self.now.get() + ms);
        }
    }

    impl Clock for MockClock {
        fn now_ms(&self) -> u64 {
            self.now.get()
        }
    }

    /// Delay that completes immediately and moves the clock forward
    pub struct MockDelay<'a> {
        clock: &'a MockClock,
    }

    impl<'a> MockDelay<'a> {
        pub fn new(clock: &'a MockClock) -> Self {
            Self { clock }
        }
    }

    impl DelayNs for MockDelay<'_> {
        async fn delay_ns(&mut self, ns: u32) {
            self.clock.advance(u64::from(ns).div_ceil(1_000_000));
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.clock.advance(u64::from(ms));
        }
    }
}
