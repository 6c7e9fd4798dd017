use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};

/// `round(a * b / 2^31)` computed in 64 bits, saturating the single overflow
/// case `i32::MIN * i32::MIN`. Ties round toward positive infinity.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// `x / 2^exponent` rounded to nearest, ties away from zero.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: u32) -> i32 {
    if exponent == 0 {
        return x;
    }
    let exponent = exponent.min(62);
    let x = x as i64;
    let mask = (1i64 << exponent) - 1;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i64::from(x < 0);
    ((x >> exponent) + i64::from(remainder > threshold)) as i32
}

/// Rescale an accumulator by `multiplier * 2^(shift - 31)`.
///
/// `shift > 0` shifts left before the multiply (saturating), `shift < 0`
/// right-shifts the product by `|shift|` with rounding.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    let left = shift.clamp(0, 31) as u32;
    let right = shift.saturating_neg().max(0) as u32;
    let widened = ((x as i64) << left).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(widened, multiplier), right)
}

/// Split a positive real ratio into `(multiplier, shift)` with
/// `real ≈ multiplier * 2^(shift - 31)` and `multiplier` in `[2^30, 2^31)`.
/// `shift` follows the `multiply_by_quantized_multiplier` convention.
pub fn quantize_multiplier(real: f64) -> Result<(i32, i32)> {
    if real == 0.0 {
        return Ok((0, 0));
    }
    if !(real.is_finite() && real > 0.0) {
        return Err(KernelError::InvalidOutputStage(format!("multiplier {} is not a positive real", real)));
    }
    let mut shift = real.log2().floor() as i32 + 1;
    let mut q = real / 2f64.powi(shift);
    while q >= 1.0 { q /= 2.0; shift += 1; }
    while q < 0.5 { q *= 2.0; shift -= 1; }
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    if shift < -31 {
        return Ok((0, 0));
    }
    if shift > 30 {
        return Err(KernelError::InvalidOutputStage(format!("multiplier {} too large", real)));
    }
    Ok((q_fixed as i32, shift))
}

/// Fixed-point output rescale plus the activation range of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStage {
    pub output_multiplier: i32,
    /// Right-shift amount applied to the rescaled product; negative values
    /// shift left. The requantizer gets the negation, see [`OutputStage::exponent`].
    pub output_shift: i32,
    pub activation_min: i32,
    pub activation_max: i32,
}

impl OutputStage {
    /// Stage with the full int8 activation range.
    pub fn new(output_multiplier: i32, output_shift: i32) -> Self {
        Self { output_multiplier, output_shift, activation_min: i8::MIN as i32, activation_max: i8::MAX as i32 }
    }

    /// Stage approximating `real` (usually `input_scale * filter_scale / output_scale`).
    pub fn from_real_multiplier(real: f64) -> Result<Self> {
        let (multiplier, shift) = quantize_multiplier(real)?;
        Ok(Self::new(multiplier, -shift))
    }

    pub fn with_activation(mut self, activation_min: i32, activation_max: i32) -> Self {
        self.activation_min = activation_min;
        self.activation_max = activation_max;
        self
    }

    /// Shift as consumed by `multiply_by_quantized_multiplier` (positive = left).
    #[inline]
    pub fn exponent(&self) -> i32 { -self.output_shift }

    #[inline]
    pub fn rescale(&self, acc: i32) -> i32 {
        multiply_by_quantized_multiplier(acc, self.output_multiplier, self.exponent())
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_multiplier < 0 {
            return Err(KernelError::InvalidOutputStage(format!("negative multiplier {}", self.output_multiplier)));
        }
        if !(-30..=31).contains(&self.output_shift) {
            return Err(KernelError::InvalidOutputStage(format!("output shift {} outside [-30, 31]", self.output_shift)));
        }
        let (lo, hi) = (i8::MIN as i32, i8::MAX as i32);
        if self.activation_min > self.activation_max
            || self.activation_min < lo
            || self.activation_max > hi
        {
            return Err(KernelError::InvalidOutputStage(format!(
                "activation range [{}, {}] not within [{}, {}]",
                self.activation_min, self.activation_max, lo, hi
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_ratio_is_identity() {
        let (m, s) = quantize_multiplier(1.0).unwrap();
        assert_eq!((m, s), (1 << 30, 1));
        for x in [-100_000, -129, -1, 0, 1, 127, 99_999] {
            assert_eq!(multiply_by_quantized_multiplier(x, m, s), x);
        }
    }

    #[test]
    fn output_shift_is_a_right_shift() {
        // 0.5 * 2^-1: the stage stores a right shift of 1, the requantizer sees -1.
        let stage = OutputStage::new(1 << 30, 1);
        assert_eq!(stage.exponent(), -1);
        assert_eq!(stage.rescale(100), 25);
        let left = OutputStage::new(1 << 30, -2);
        assert_eq!(left.rescale(100), 200);
    }

    #[test]
    fn from_real_multiplier_negates_shift() {
        let stage = OutputStage::from_real_multiplier(0.25).unwrap();
        assert_eq!(stage.output_multiplier, 1 << 30);
        assert_eq!(stage.output_shift, 1);
        assert_eq!(stage.rescale(1000), 250);
    }

    #[test]
    fn rounding_divide_ties_away_from_zero() {
        assert_eq!(rounding_divide_by_pot(3, 1), 2);
        assert_eq!(rounding_divide_by_pot(-3, 1), -2);
        assert_eq!(rounding_divide_by_pot(5, 2), 1);
        assert_eq!(rounding_divide_by_pot(6, 2), 2);
        assert_eq!(rounding_divide_by_pot(-6, 2), -2);
        assert_eq!(rounding_divide_by_pot(-5, 2), -1);
        assert_eq!(rounding_divide_by_pot(i32::MIN, 31), -1);
        assert_eq!(rounding_divide_by_pot(i32::MAX, 31), 1);
    }

    #[test]
    fn doubling_high_mul_saturates() {
        assert_eq!(saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN), i32::MAX);
        assert_eq!(saturating_rounding_doubling_high_mul(i32::MAX, i32::MAX), i32::MAX - 1);
        assert_eq!(saturating_rounding_doubling_high_mul(1 << 20, 1 << 30), 1 << 19);
    }

    #[test]
    fn left_shift_saturates() {
        assert_eq!(multiply_by_quantized_multiplier(i32::MAX, 1 << 30, 2), i32::MAX / 2 + 1);
        assert_eq!(multiply_by_quantized_multiplier(i32::MIN, 1 << 30, 2), i32::MIN / 2);
    }

    #[test]
    fn quantize_multiplier_tracks_real() {
        for real in [0.0003_f64, 0.0123, 0.5, 0.75, 1.9, 37.5] {
            let (m, s) = quantize_multiplier(real).unwrap();
            assert!(m >= 1 << 30, "multiplier {} not normalized", m);
            let back = m as f64 * 2f64.powi(s - 31);
            assert!((back - real).abs() <= real * 1e-9, "{} vs {}", back, real);
        }
        assert_eq!(quantize_multiplier(0.0).unwrap(), (0, 0));
        assert!(quantize_multiplier(-1.0).is_err());
        assert!(quantize_multiplier(f64::INFINITY).is_err());
    }

    #[test]
    fn validate_rejects_bad_stages() {
        assert!(OutputStage::new(1 << 30, 0).validate().is_ok());
        assert!(OutputStage::new(-1, 0).validate().is_err());
        assert!(OutputStage::new(1 << 30, 32).validate().is_err());
        assert!(OutputStage::new(1 << 30, -31).validate().is_err());
        assert!(OutputStage::new(1 << 30, 0).with_activation(10, -10).validate().is_err());
        assert!(OutputStage::new(1 << 30, 0).with_activation(-200, 0).validate().is_err());
        assert!(OutputStage::new(1 << 30, 0).with_activation(0, 127).validate().is_ok());
    }
}
