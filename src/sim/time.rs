//! Simulated time and durations.
//!
//! Every value carries its [`TimeUnit`]. Comparisons and arithmetic between
//! values in different units convert the right operand into the unit of the
//! left one, so a model tree may mix units as long as each model is
//! internally consistent.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Unit of a simulated time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Number of seconds in one unit.
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Milliseconds => 0.001,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
        }
    }

    fn convert(value: f64, from: TimeUnit, to: TimeUnit) -> f64 {
        if from == to || value.is_infinite() {
            value
        } else {
            value * from.seconds_per_unit() / to.seconds_per_unit()
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
        }
    }
}

/// A span of simulated time.
///
/// [`Duration::infinite`] is the distinguished value returned by a time
/// advance when no internal transition is pending.
///
/// # Examples
///
/// ```
/// use appliance_sim::sim::time::{Duration, TimeUnit};
///
/// let d = Duration::new(90.0, TimeUnit::Seconds);
/// assert_eq!(d.to_unit(TimeUnit::Minutes).value(), 1.5);
/// assert!(Duration::infinite(TimeUnit::Seconds).is_infinite());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Duration {
    value: f64,
    unit: TimeUnit,
}

impl Duration {
    /// Creates a finite, non-negative duration.
    ///
    /// # Panics
    ///
    /// Panics if `value` is negative or NaN.
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        assert!(value >= 0.0, "duration must be non-negative, got {value}");
        Self { value, unit }
    }

    pub fn zero(unit: TimeUnit) -> Self {
        Self { value: 0.0, unit }
    }

    pub fn infinite(unit: TimeUnit) -> Self {
        Self {
            value: f64::INFINITY,
            unit,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }

    /// Expresses this duration in `unit`.
    pub fn to_unit(self, unit: TimeUnit) -> Self {
        Self {
            value: TimeUnit::convert(self.value, self.unit, unit),
            unit,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        self.to_unit(TimeUnit::Seconds).value
    }

    pub fn as_hours(&self) -> f64 {
        self.to_unit(TimeUnit::Hours).value
    }

    /// Converts to a wall-clock duration, saturating for infinite or
    /// negative values.
    pub fn as_std(&self) -> std::time::Duration {
        let secs = self.as_seconds();
        if secs.is_infinite() {
            std::time::Duration::MAX
        } else if secs <= 0.0 {
            std::time::Duration::ZERO
        } else {
            std::time::Duration::from_secs_f64(secs)
        }
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let rhs = TimeUnit::convert(other.value, other.unit, self.unit);
        self.value.partial_cmp(&rhs)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration {
            value: self.value + TimeUnit::convert(rhs.value, rhs.unit, self.unit),
            unit: self.unit,
        }
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: f64) -> Duration {
        Duration {
            value: self.value * rhs,
            unit: self.unit,
        }
    }
}

impl Div<f64> for Duration {
    type Output = Duration;

    fn div(self, rhs: f64) -> Duration {
        Duration {
            value: self.value / rhs,
            unit: self.unit,
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf{}", self.unit.suffix())
        } else {
            write!(f, "{}{}", self.value, self.unit.suffix())
        }
    }
}

/// A point on the simulated time line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Time {
    value: f64,
    unit: TimeUnit,
}

impl Time {
    /// Creates a time point.
    ///
    /// # Panics
    ///
    /// Panics if `value` is NaN.
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        assert!(!value.is_nan(), "time must not be NaN");
        Self { value, unit }
    }

    pub fn zero(unit: TimeUnit) -> Self {
        Self { value: 0.0, unit }
    }

    pub fn infinite(unit: TimeUnit) -> Self {
        Self {
            value: f64::INFINITY,
            unit,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    pub fn to_unit(self, unit: TimeUnit) -> Self {
        Self {
            value: TimeUnit::convert(self.value, self.unit, unit),
            unit,
        }
    }

    /// Returns the earlier of two time points.
    pub fn min(self, other: Time) -> Time {
        if other < self { other } else { self }
    }

    /// Returns the later of two time points.
    pub fn max(self, other: Time) -> Time {
        if other > self { other } else { self }
    }

    /// Elapsed duration since `earlier`, clamped at zero.
    pub fn since(self, earlier: Time) -> Duration {
        let d = self - earlier;
        if d.value < 0.0 {
            Duration::zero(self.unit)
        } else {
            d
        }
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let rhs = TimeUnit::convert(other.value, other.unit, self.unit);
        self.value.partial_cmp(&rhs)
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time {
            value: self.value + TimeUnit::convert(rhs.value, rhs.unit, self.unit),
            unit: self.unit,
        }
    }
}

impl Sub for Time {
    type Output = Duration;

    /// Signed difference; may be negative when `rhs` is later.
    fn sub(self, rhs: Time) -> Duration {
        Duration {
            value: self.value - TimeUnit::convert(rhs.value, rhs.unit, self.unit),
            unit: self.unit,
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "t=inf")
        } else {
            write!(f, "t={}{}", self.value, self.unit.suffix())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion() {
        let d = Duration::new(2.0, TimeUnit::Hours);
        assert_eq!(d.to_unit(TimeUnit::Minutes).value(), 120.0);
        assert_eq!(d.as_seconds(), 7200.0);
    }

    #[test]
    fn comparison_across_units() {
        let a = Time::new(1.0, TimeUnit::Minutes);
        let b = Time::new(60.0, TimeUnit::Seconds);
        assert_eq!(a, b);
        assert!(Time::new(59.0, TimeUnit::Seconds) < a);
    }

    #[test]
    fn infinite_duration_dominates() {
        let t = Time::new(5.0, TimeUnit::Seconds);
        let never = t + Duration::infinite(TimeUnit::Seconds);
        assert!(never.is_infinite());
        assert!(t < never);
        assert_eq!(never.min(t), t);
        assert!(t.max(never).is_infinite());
    }

    #[test]
    fn time_arithmetic() {
        let t0 = Time::new(10.0, TimeUnit::Seconds);
        let t1 = t0 + Duration::new(500.0, TimeUnit::Milliseconds);
        assert_eq!(t1.value(), 10.5);
        assert_eq!((t1 - t0).value(), 0.5);
        assert_eq!(t0.since(t1).value(), 0.0);
    }

    #[test]
    fn scaling_and_std_conversion() {
        let d = Duration::new(4.0, TimeUnit::Seconds) / 2.0;
        assert_eq!(d.as_std(), std::time::Duration::from_secs(2));
        assert_eq!(
            Duration::infinite(TimeUnit::Seconds).as_std(),
            std::time::Duration::MAX
        );
        assert_eq!((d * 3.0).value(), 6.0);
    }

    #[test]
    #[should_panic]
    fn negative_duration_panics() {
        Duration::new(-1.0, TimeUnit::Seconds);
    }

    #[test]
    fn display_formats() {
        assert_eq!(Time::new(3.0, TimeUnit::Seconds).to_string(), "t=3s");
        assert_eq!(Duration::infinite(TimeUnit::Minutes).to_string(), "infmin");
    }
}
