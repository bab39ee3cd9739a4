//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Round a f64 and clamp it to the u32 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    let max = cast::<u32, f64>(u32::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u32>(clamped).unwrap_or(0)
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Scale a millisecond delay by a factor, saturating instead of overflowing.
#[must_use]
pub fn scale_millis(millis: u64, factor: f64) -> u64 {
    if !factor.is_finite() || factor <= 0.0 {
        return 0;
    }
    let scaled = (u64_to_f64(millis) * factor).round();
    cast::<f64, u64>(scaled).unwrap_or(u64::MAX)
}

/// Arithmetic mean of the non-zero samples, or `None` when there are none.
#[must_use]
pub fn mean_nonzero(samples: impl IntoIterator<Item = u32>) -> Option<f64> {
    let (sum, count) = samples
        .into_iter()
        .filter(|v| *v > 0)
        .fold((0_u64, 0_u64), |(sum, count), v| {
            (sum + u64::from(v), count + 1)
        });
    if count == 0 {
        None
    } else {
        Some(u64_to_f64(sum) / u64_to_f64(count))
    }
}

/// Clamp an i64 day/second count into u32.
#[must_use]
pub fn clamp_i64_to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_handles_non_finite_and_negative() {
        assert_eq!(round_f64_to_u32(f64::NAN), 0);
        assert_eq!(round_f64_to_u32(-3.0), 0);
        assert_eq!(round_f64_to_u32(2.5), 3);
        assert_eq!(round_f64_to_u32(f64::INFINITY), u32::MAX);
    }

    #[test]
    fn mean_ignores_zero_samples() {
        assert_eq!(mean_nonzero([0, 0]), None);
        let mean = mean_nonzero([0, 10, 20]).unwrap();
        assert!((mean - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scale_millis_saturates() {
        assert_eq!(scale_millis(250, 1.2), 300);
        assert_eq!(scale_millis(250, 0.0), 0);
        assert_eq!(scale_millis(u64::MAX, 4.0), u64::MAX);
    }

    #[test]
    fn clamp_negative_to_zero() {
        assert_eq!(clamp_i64_to_u32(-5), 0);
        assert_eq!(clamp_i64_to_u32(i64::MAX), u32::MAX);
    }
}
