//! Common helpers shared by the device models.

use rand::{Rng, rngs::StdRng};

use crate::sim::error::{SimError, SimResult};
use crate::sim::time::Time;

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Time integral of a piecewise-constant signal, in value·hours.
///
/// Call [`Integrator::advance`] with the current instant before changing the
/// value with [`Integrator::set`].
#[derive(Debug, Clone, Copy)]
pub struct Integrator {
    value: f64,
    total: f64,
    span_hours: f64,
    last: Time,
}

impl Integrator {
    pub fn new(start: Time, value: f64) -> Self {
        Self {
            value,
            total: 0.0,
            span_hours: 0.0,
            last: start,
        }
    }

    /// Accumulates the current value up to `now`.
    pub fn advance(&mut self, now: Time) {
        let hours = now.since(self.last).as_hours();
        self.total += self.value * hours;
        self.span_hours += hours;
        if now > self.last {
            self.last = now;
        }
    }

    pub fn set(&mut self, value: f64) {
        self.value = value;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Integral so far, in value·hours.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Time-weighted mean, or the current value over an empty span.
    pub fn mean(&self) -> f64 {
        if self.span_hours > 0.0 {
            self.total / self.span_hours
        } else {
            self.value
        }
    }
}

/// Rejects a non-positive or non-finite model constant.
pub fn positive(uri: &str, name: &str, value: f64) -> SimResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimError::InvalidParameter {
            name: format!("{uri}:{name}"),
            message: format!("must be positive, got {value}"),
        })
    }
}

/// Rejects a value outside `[0, 1]`.
pub fn fraction(uri: &str, name: &str, value: f64) -> SimResult<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SimError::InvalidParameter {
            name: format!("{uri}:{name}"),
            message: format!("must be within [0, 1], got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::time::TimeUnit;
    use rand::SeedableRng;

    fn secs(v: f64) -> Time {
        Time::new(v, TimeUnit::Seconds)
    }

    #[test]
    fn test_gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }

    #[test]
    fn test_gaussian_noise_seeded_is_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(gaussian_noise(&mut a, 1.0), gaussian_noise(&mut b, 1.0));
        }
    }

    #[test]
    fn test_integrator_piecewise() {
        let mut i = Integrator::new(secs(0.0), 1000.0);
        i.advance(secs(1800.0));
        i.set(0.0);
        i.advance(secs(3600.0));
        assert!((i.total() - 500.0).abs() < 1e-9);
        assert!((i.mean() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_integrator_ignores_backwards_time() {
        let mut i = Integrator::new(secs(10.0), 5.0);
        i.advance(secs(5.0));
        assert_eq!(i.total(), 0.0);
        assert_eq!(i.mean(), 5.0);
    }

    #[test]
    fn test_parameter_checks() {
        assert_eq!(positive("tank", "volume_l", 150.0), Ok(150.0));
        assert!(positive("tank", "volume_l", 0.0).is_err());
        assert!(fraction("battery", "initial_soc", 1.5).is_err());
    }
}
