//! Quantized fully-connected kernels.
//!
//! Layout shared by every variant:
//! - input  `[batches, accum_depth]`
//! - filter `[.., accum_depth, output_depth]` (reduction over the second-to-last axis)
//! - bias   `[output_depth]`
//! - output `[batches, output_depth]`
//!
//! Trailing (input, output) or leading (filter) unit axes are accepted, so
//! `[2, 3, 1, 1]` is a valid input for `accum_depth = 3`.

pub mod dense;
pub mod reference;

pub use dense::{fully_connected, fully_connected_with_bias};
pub use reference::fully_connected_reference;

use crate::error::{KernelError, Result};
use crate::tensor::{Element, Shape, Tensor};

/// Validated loop bounds of one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseDims {
    pub batches: usize,
    pub accum_depth: usize,
    pub output_depth: usize,
}

impl DenseDims {
    /// Check every dimension relation once, before any element is touched.
    pub fn validate(input: &Shape, filter: &Shape, output: &Shape, bias_len: Option<usize>) -> Result<Self> {
        for (what, s) in [("input rank", input), ("filter rank", filter), ("output rank", output)] {
            if s.num_dims() < 2 {
                return Err(KernelError::shape(what, 2, s.num_dims()));
            }
        }
        let rank = filter.num_dims();
        let accum_depth = filter[rank - 2];
        let output_depth = filter[rank - 1];
        if filter.num_elements() != accum_depth * output_depth {
            return Err(KernelError::shape("filter elements", accum_depth * output_depth, filter.num_elements()));
        }

        let batches = output[0];
        if output[1] != output_depth {
            return Err(KernelError::shape("output depth", output_depth, output[1]));
        }
        if output.num_elements() != batches * output_depth {
            return Err(KernelError::shape("output elements", batches * output_depth, output.num_elements()));
        }
        if input[0] != batches {
            return Err(KernelError::shape("input batches", batches, input[0]));
        }
        if input[1] != accum_depth {
            return Err(KernelError::shape("input depth", accum_depth, input[1]));
        }
        if input.num_elements() != batches * accum_depth {
            return Err(KernelError::shape("input elements", batches * accum_depth, input.num_elements()));
        }
        if let Some(n) = bias_len {
            if n != output_depth {
                return Err(KernelError::shape("bias length", output_depth, n));
            }
        }
        Ok(Self { batches, accum_depth, output_depth })
    }
}

/// Zero points of int8 tensors must be representable in int8.
pub(crate) fn check_i8_zero_point<T: Element>(what: &str, t: &Tensor<T>) -> Result<i32> {
    let zp = t.quantization_params().zero_point(0);
    if zp < i8::MIN as i32 || zp > i8::MAX as i32 {
        return Err(KernelError::InvalidQuantization(format!("{} zero point {} outside int8", what, zp)));
    }
    Ok(zp)
}
