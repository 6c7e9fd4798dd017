use crate::error::{KernelError, Result};
use crate::kernel::{check_i8_zero_point, DenseDims};
use crate::quant::{clamp_activation, saturate_i8, OutputStage};
use crate::tensor::Tensor;
use log::debug;

/// `output = clamp(rescale(input · filter) + zp_out)`, no bias.
pub fn fully_connected(
    output: &mut Tensor<i8>,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    stage: &OutputStage,
) -> Result<()> {
    run(output, input, filter, None, stage)
}

/// As [`fully_connected`] with an int32 bias already in the accumulator domain,
/// added once per output element before the rescale.
pub fn fully_connected_with_bias(
    output: &mut Tensor<i8>,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    bias: &Tensor<i32>,
    stage: &OutputStage,
) -> Result<()> {
    run(output, input, filter, Some(bias), stage)
}

fn run(
    output: &mut Tensor<i8>,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    bias: Option<&Tensor<i32>>,
    stage: &OutputStage,
) -> Result<()> {
    let dims = DenseDims::validate(input.shape(), filter.shape(), output.shape(), bias.map(|b| b.len()))?;
    stage.validate()?;
    if filter.quantization_params().is_per_channel() {
        return Err(KernelError::InvalidQuantization(
            "integer dense path takes a per-tensor filter; use the reference path for per-channel".to_string(),
        ));
    }
    let input_offset = -check_i8_zero_point("input", input)?;
    let filter_offset = -check_i8_zero_point("filter", filter)?;
    let output_offset = check_i8_zero_point("output", output)?;
    let DenseDims { batches, accum_depth, output_depth } = dims;
    debug!(
        "fully_connected: batches={} accum_depth={} output_depth={} bias={} multiplier={} shift={}",
        batches, accum_depth, output_depth, bias.is_some(), stage.output_multiplier, stage.output_shift
    );

    for b in 0..batches {
        for out_c in 0..output_depth {
            // i32 accumulation wraps for very deep reductions; (255 * 255) * depth must stay below 2^31.
            let mut acc: i32 = 0;
            for d in 0..accum_depth {
                let input_val = input.get_flat(b * accum_depth + d)? as i32;
                let filter_val = filter.get_flat(d * output_depth + out_c)? as i32;
                acc = acc.wrapping_add((filter_val + filter_offset) * (input_val + input_offset));
            }
            if let Some(bias) = bias {
                acc = acc.wrapping_add(bias.get_flat(out_c)?);
            }
            acc = stage.rescale(acc);
            acc = acc.saturating_add(output_offset);
            acc = clamp_activation(acc, stage.activation_min, stage.activation_max);
            output.set(&[b, out_c], saturate_i8(acc))?;
        }
    }
    output.sync()
}
