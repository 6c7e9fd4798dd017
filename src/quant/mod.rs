//! Affine quantization mapping and the scalar helpers shared by the kernels.

pub mod requant;

pub use requant::{multiply_by_quantized_multiplier, quantize_multiplier, OutputStage};

use crate::error::{KernelError, Result};

/// Per-channel `(scale, zero_point)` pairs: `real = scale * (q - zero_point)`.
///
/// A single pair means per-tensor quantization; every channel index then
/// resolves to channel 0.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationParams {
    scales: Vec<f32>,
    zero_points: Vec<i32>,
    /// Axis whose index selects the channel when quantized per channel.
    channel_axis: usize,
}

impl QuantizationParams {
    pub fn per_tensor(scale: f32, zero_point: i32) -> Result<Self> {
        Self::per_channel(vec![scale], vec![zero_point], 0)
    }

    pub fn per_channel(scales: Vec<f32>, zero_points: Vec<i32>, channel_axis: usize) -> Result<Self> {
        let p = Self { scales, zero_points, channel_axis };
        p.validate()?;
        Ok(p)
    }

    /// Every scale finite and positive, one zero point per scale.
    pub fn validate(&self) -> Result<()> {
        if self.scales.is_empty() || self.scales.len() != self.zero_points.len() {
            return Err(KernelError::InvalidQuantization(format!(
                "{} scales vs {} zero points",
                self.scales.len(),
                self.zero_points.len()
            )));
        }
        if let Some((c, s)) = self.scales.iter().enumerate().find(|(_, s)| !(s.is_finite() && **s > 0.0)) {
            return Err(KernelError::InvalidQuantization(format!("scale[{}] = {} is not positive", c, s)));
        }
        Ok(())
    }

    #[inline]
    pub fn num_channels(&self) -> usize { self.scales.len() }

    #[inline]
    pub fn is_per_channel(&self) -> bool { self.scales.len() > 1 }

    #[inline]
    pub fn channel_axis(&self) -> usize { self.channel_axis }

    #[inline]
    fn resolve(&self, channel: usize) -> usize {
        if self.scales.len() == 1 {
            return 0;
        }
        debug_assert!(channel < self.scales.len(), "channel {} of {}", channel, self.scales.len());
        channel
    }

    #[inline]
    pub fn scale(&self, channel: usize) -> f32 { self.scales[self.resolve(channel)] }

    #[inline]
    pub fn zero_point(&self, channel: usize) -> i32 { self.zero_points[self.resolve(channel)] }
}

/// `scale * (q - zero_point)`; the difference is taken in i64 so full-range
/// i32 values (bias) cannot overflow.
#[inline]
pub fn dequantize(q: i32, scale: f32, zero_point: i32) -> f32 {
    (q as i64 - zero_point as i64) as f32 * scale
}

/// Nearest int8 for a real value, ties away from zero, saturated to i8.
#[inline]
pub fn quantize(real: f32, scale: f32, zero_point: i32) -> i8 {
    let q = (real / scale).round() as i32;
    saturate_i8(q.saturating_add(zero_point))
}

/// Narrow to int8 storage width, saturating out-of-range values.
#[inline]
pub fn saturate_i8(v: i32) -> i8 {
    v.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Clamp an accumulator to the activation range.
#[inline]
pub fn clamp_activation(v: i32, activation_min: i32, activation_max: i32) -> i32 {
    v.max(activation_min).min(activation_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tensor_resolves_every_channel_to_zero() {
        let p = QuantizationParams::per_tensor(0.25, -3).unwrap();
        assert_eq!(p.scale(7), 0.25);
        assert_eq!(p.zero_point(7), -3);
        assert!(!p.is_per_channel());
    }

    #[test]
    fn per_channel_indexes_channels() {
        let p = QuantizationParams::per_channel(vec![0.5, 0.25], vec![1, 2], 1).unwrap();
        assert_eq!(p.scale(1), 0.25);
        assert_eq!(p.zero_point(0), 1);
        assert_eq!(p.channel_axis(), 1);
    }

    #[test]
    fn rejects_non_positive_scale_and_length_mismatch() {
        assert!(QuantizationParams::per_tensor(0.0, 0).is_err());
        assert!(QuantizationParams::per_tensor(-1.0, 0).is_err());
        assert!(QuantizationParams::per_tensor(f32::NAN, 0).is_err());
        assert!(QuantizationParams::per_channel(vec![1.0, 1.0], vec![0], 0).is_err());
    }

    #[test]
    #[should_panic]
    fn per_channel_index_past_last_channel_panics() {
        let p = QuantizationParams::per_channel(vec![0.5, 0.25], vec![1, 2], 1).unwrap();
        p.scale(2);
    }

    #[test]
    fn dequantize_full_range_i32() {
        assert_eq!(dequantize(i32::MIN, 1.0, 1), -2_147_483_649.0f64 as f32);
        assert_eq!(dequantize(i32::MAX, 0.5, -1), 1_073_741_824.0);
        assert!(dequantize(i32::MIN, 1.0, 1) < 0.0);
    }

    #[test]
    fn saturate_i8_bounds() {
        assert_eq!(saturate_i8(300), 127);
        assert_eq!(saturate_i8(-300), -128);
        assert_eq!(saturate_i8(-5), -5);
        assert_eq!(saturate_i8(i32::MIN), -128);
    }

    #[test]
    fn quantize_rounds_half_away_from_zero() {
        assert_eq!(quantize(2.5, 1.0, 0), 3);
        assert_eq!(quantize(-2.5, 1.0, 0), -3);
        assert_eq!(quantize(1000.0, 1.0, 0), 127);
    }
}
