use std::ops::{Add, Sub, Mul};
use std::time::Duration;

/// A span of emulated time, independent of how fast the host actually runs.
///
/// Stored as nanoseconds with 16 fractional bits, so clocks whose period isn't a whole number
/// of nanoseconds (the CPU runs at 33.8688 MHz) don't drift. The integer part is wide enough
/// that system time never saturates in practice.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SysTime(u128);

impl SysTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self((nanos as u128) << FRAC_BITS)
    }

    /// From a fractional amount of nanoseconds. Used for clock periods.
    pub fn from_nanos_f64(nanos: f64) -> Self {
        Self((nanos * SCALING_FACTOR) as u128)
    }

    /// The period of a clock running at `hz`.
    pub fn period_of(hz: f64) -> Self {
        Self::from_nanos_f64(NANOS_PER_SECOND / hz)
    }

    /// Whole nanoseconds, saturating at `u64::MAX`.
    pub fn as_nanos(self) -> u64 {
        u64::try_from(self.0 >> FRAC_BITS).unwrap_or(u64::MAX)
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.as_nanos())
    }

    /// How many whole periods of length `period` fit in `self`.
    pub fn periods(self, period: SysTime) -> u64 {
        if period.0 == 0 {
            0
        } else {
            u64::try_from(self.0 / period.0).unwrap_or(u64::MAX)
        }
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl Add for SysTime {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for SysTime {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Mul<u64> for SysTime {
    type Output = Self;

    fn mul(self, other: u64) -> Self {
        Self(self.0.saturating_mul(u128::from(other)))
    }
}

const FRAC_BITS: u32 = 16;
const SCALING_FACTOR: f64 = (1_u128 << FRAC_BITS) as f64;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
