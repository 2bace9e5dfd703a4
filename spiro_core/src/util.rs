//! Period helpers shared by the cadences.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Sample period in microseconds; `hz` is clamped to at least 1 and the
/// result to at least 1 µs.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Sample period in milliseconds, clamped like [`period_us`].
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Samples covered by `period_ms` at `hz`, at least 1.
#[inline]
pub fn samples_per_period(hz: u32, period_ms: u64) -> u64 {
    (u64::from(hz).saturating_mul(period_ms) / MILLIS_PER_SEC).max(1)
}
