use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Process-wide origin for monotonic timestamps
static ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic time source used for capture timestamps and interval math.
///
/// Timestamps are offsets from an arbitrary fixed origin; only differences
/// between them are meaningful.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Clock backed by `Instant`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&self) -> Duration {
        ORIGIN.elapsed()
    }
}

/// Convert a monotonic offset to whole nanoseconds, saturating on overflow.
pub fn as_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Interval for a target rate; a zero rate is treated as 1 Hz.
pub fn period_for_hz(hz: u32) -> Duration {
    Duration::from_secs(1) / hz.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_never_goes_backwards() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn period_for_hz_handles_zero() {
        assert_eq!(period_for_hz(0), Duration::from_secs(1));
        assert_eq!(period_for_hz(4), Duration::from_millis(250));
    }
}
