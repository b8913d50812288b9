//! Randomised timing factors for request pacing and retry backoff.

use rand::Rng;

/// Uniform multiplier in `[1 - fraction, 1 + fraction]`.
pub fn jitter_factor(fraction: f64) -> f64 {
    let fraction = fraction.clamp(0.0, 0.99);
    if fraction == 0.0 {
        return 1.0;
    }
    rand::thread_rng().gen_range((1.0 - fraction)..=(1.0 + fraction))
}

/// Uniform multiplier in `[low, high]`.
pub fn uniform_factor(low: f64, high: f64) -> f64 {
    if high <= low {
        return low;
    }
    rand::thread_rng().gen_range(low..=high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_factor_bounds() {
        for _ in 0..1000 {
            let f = jitter_factor(0.2);
            assert!((0.8..=1.2).contains(&f), "factor {f} out of range");
        }
        assert_eq!(jitter_factor(0.0), 1.0);
    }

    #[test]
    fn test_uniform_factor_bounds() {
        for _ in 0..1000 {
            let f = uniform_factor(1.0, 3.0);
            assert!((1.0..=3.0).contains(&f));
        }
        assert_eq!(uniform_factor(2.0, 2.0), 2.0);
    }
}
