//! Randomized agreement checks between the integer kernels and the float reference.

use crate::error::Result;
use crate::kernel::{fully_connected, fully_connected_reference, fully_connected_with_bias};
use crate::quant::{OutputStage, QuantizationParams};
use crate::tensor::Tensor;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParityLimits {
    pub max_batches: usize,
    pub max_depth: usize,
    pub max_output: usize,
    /// Bias values are drawn from `[-bias_range, bias_range]`.
    pub bias_range: i32,
}

impl Default for ParityLimits {
    fn default() -> Self { Self { max_batches: 4, max_depth: 64, max_output: 16, bias_range: 1 << 14 } }
}

/// One randomly drawn dense layer problem.
pub struct ParityCase {
    pub batches: usize,
    pub accum_depth: usize,
    pub output_depth: usize,
    pub input: Tensor<i8>,
    pub filter: Tensor<i8>,
    pub bias: Option<Tensor<i32>>,
    pub output_params: QuantizationParams,
    pub stage: OutputStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParityOutcome {
    pub batches: usize,
    pub accum_depth: usize,
    pub output_depth: usize,
    pub with_bias: bool,
    pub max_abs_diff: i32,
    /// Count of elements at each absolute difference 0, 1, 2+.
    pub diff_histogram: [usize; 3],
}

fn random_i8s(rng: &mut SmallRng, n: usize) -> Vec<i8> {
    (0..n).map(|_| rng.gen::<i8>()).collect()
}

impl ParityCase {
    /// Draw a case from `seed`: full-range int8 data, random zero points,
    /// scales chosen so most outputs land inside the int8 range.
    pub fn random(seed: u64, limits: &ParityLimits) -> Result<Self> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let batches = rng.gen_range(1..=limits.max_batches.max(1));
        let accum_depth = rng.gen_range(1..=limits.max_depth.max(1));
        let output_depth = rng.gen_range(1..=limits.max_output.max(1));
        let with_bias = rng.gen_bool(0.5);

        let input_scale = rng.gen_range(0.005f32..0.1);
        let filter_scale = rng.gen_range(0.001f32..0.05);
        let spread = (accum_depth as f32).sqrt() * rng.gen_range(40.0f32..400.0);
        let output_scale = input_scale * filter_scale * spread;
        let input_params = QuantizationParams::per_tensor(input_scale, rng.gen_range(-128..=127))?;
        let filter_params = QuantizationParams::per_tensor(filter_scale, rng.gen_range(-20..=20))?;
        let output_params = QuantizationParams::per_tensor(output_scale, rng.gen_range(-30..=30))?;

        let lo = rng.gen_range(-128..=0);
        let hi = rng.gen_range(0..=127);
        let ratio = input_scale as f64 * filter_scale as f64 / output_scale as f64;
        let stage = OutputStage::from_real_multiplier(ratio)?.with_activation(lo, hi);

        let input = Tensor::from_vec(&[batches, accum_depth], random_i8s(&mut rng, batches * accum_depth), input_params)?;
        let filter =
            Tensor::from_vec(&[accum_depth, output_depth], random_i8s(&mut rng, accum_depth * output_depth), filter_params)?;
        let bias = if with_bias {
            let vals: Vec<i32> = (0..output_depth).map(|_| rng.gen_range(-limits.bias_range..=limits.bias_range)).collect();
            let bias_params = QuantizationParams::per_tensor(input_scale * filter_scale, 0)?;
            Some(Tensor::from_vec(&[output_depth], vals, bias_params)?)
        } else {
            None
        };
        Ok(Self { batches, accum_depth, output_depth, input, filter, bias, output_params, stage })
    }

    /// Integer result (with or without bias per the case).
    pub fn run_integer(&self) -> Result<Vec<i8>> {
        let mut out = Tensor::<i8>::zeros(&[self.batches, self.output_depth], self.output_params.clone())?;
        match &self.bias {
            Some(b) => fully_connected_with_bias(&mut out, &self.input, &self.filter, b, &self.stage)?,
            None => fully_connected(&mut out, &self.input, &self.filter, &self.stage)?,
        }
        out.to_vec()
    }

    /// Float reference result; a missing bias is zeros.
    pub fn run_reference(&self) -> Result<Vec<i8>> {
        let mut out = Tensor::<i8>::zeros(&[self.batches, self.output_depth], self.output_params.clone())?;
        let zero_params = QuantizationParams::per_tensor(1.0, 0)?;
        let zeros;
        let bias = match &self.bias {
            Some(b) => b,
            None => {
                zeros = Tensor::<i32>::zeros(&[self.output_depth], zero_params)?;
                &zeros
            }
        };
        fully_connected_reference(&mut out, &self.input, &self.filter, bias, self.stage.activation_min, self.stage.activation_max)?;
        out.to_vec()
    }

    pub fn compare(&self) -> Result<ParityOutcome> {
        let int = self.run_integer()?;
        let reference = self.run_reference()?;
        let mut hist = [0usize; 3];
        let mut max_abs_diff = 0;
        for (a, b) in int.iter().zip(&reference) {
            let d = (*a as i32 - *b as i32).abs();
            hist[(d as usize).min(2)] += 1;
            max_abs_diff = max_abs_diff.max(d);
        }
        Ok(ParityOutcome {
            batches: self.batches,
            accum_depth: self.accum_depth,
            output_depth: self.output_depth,
            with_bias: self.bias.is_some(),
            max_abs_diff,
            diff_histogram: hist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_case() {
        let limits = ParityLimits::default();
        let a = ParityCase::random(7, &limits).unwrap();
        let b = ParityCase::random(7, &limits).unwrap();
        assert_eq!((a.batches, a.accum_depth, a.output_depth), (b.batches, b.accum_depth, b.output_depth));
        assert_eq!(a.input.to_vec().unwrap(), b.input.to_vec().unwrap());
        assert_eq!(a.stage, b.stage);
    }
}
