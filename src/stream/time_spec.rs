//! Time in whole seconds plus fractional seconds

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// A point in time or a duration, split into integer and fractional seconds
/// so that large tick counts keep sub-nanosecond resolution.
///
/// Always normalized: `0.0 <= frac_secs < 1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeSpec {
    full_secs: i64,
    frac_secs: f64,
}

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec {
        full_secs: 0,
        frac_secs: 0.0,
    };

    pub fn new(full_secs: i64, frac_secs: f64) -> Self {
        let carry = frac_secs.floor();
        let mut spec = Self {
            full_secs: full_secs + carry as i64,
            frac_secs: frac_secs - carry,
        };
        // rounding can land exactly on 1.0
        if spec.frac_secs >= 1.0 {
            spec.full_secs += 1;
            spec.frac_secs -= 1.0;
        }
        spec
    }

    pub fn from_real_secs(secs: f64) -> Self {
        Self::new(0, secs)
    }

    /// Convert a tick count at `tick_rate` Hz.
    ///
    /// Integer and fractional parts of the rate are handled separately so a
    /// non-integer rate does not lose precision on large counts.
    pub fn from_ticks(ticks: i64, tick_rate: f64) -> Self {
        let rate_i = tick_rate as i64;
        if rate_i == 0 {
            return Self::from_real_secs(ticks as f64 / tick_rate);
        }
        let rate_f = tick_rate - rate_i as f64;
        let secs_full = ticks / rate_i;
        let ticks_error = ticks - secs_full * rate_i;
        let ticks_frac = ticks_error as f64 - secs_full as f64 * rate_f;
        Self::new(secs_full, ticks_frac / tick_rate)
    }

    /// Tick count at `tick_rate` Hz, rounded to the nearest tick
    pub fn to_ticks(&self, tick_rate: f64) -> i64 {
        let rate_i = tick_rate as i64;
        let rate_f = tick_rate - rate_i as f64;
        let ticks_full = self.full_secs * rate_i;
        let ticks_frac = (self.full_secs as f64 * rate_f + self.frac_secs * tick_rate).round();
        ticks_full + ticks_frac as i64
    }

    pub fn full_secs(&self) -> i64 {
        self.full_secs
    }

    pub fn frac_secs(&self) -> f64 {
        self.frac_secs
    }

    pub fn real_secs(&self) -> f64 {
        self.full_secs as f64 + self.frac_secs
    }
}

impl Add for TimeSpec {
    type Output = TimeSpec;

    fn add(self, rhs: TimeSpec) -> TimeSpec {
        TimeSpec::new(self.full_secs + rhs.full_secs, self.frac_secs + rhs.frac_secs)
    }
}

impl Add<f64> for TimeSpec {
    type Output = TimeSpec;

    fn add(self, secs: f64) -> TimeSpec {
        self + TimeSpec::from_real_secs(secs)
    }
}

impl Sub for TimeSpec {
    type Output = TimeSpec;

    fn sub(self, rhs: TimeSpec) -> TimeSpec {
        TimeSpec::new(self.full_secs - rhs.full_secs, self.frac_secs - rhs.frac_secs)
    }
}

impl PartialOrd for TimeSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.full_secs.cmp(&other.full_secs) {
            Ordering::Equal => self.frac_secs.partial_cmp(&other.frac_secs),
            ord => Some(ord),
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.full_secs, (self.frac_secs * 1e9) as u64)
    }
}
