use crate::error::{KernelError, Result};
use crate::kernel::DenseDims;
use crate::quant::{clamp_activation, dequantize, saturate_i8, QuantizationParams};
use crate::tensor::Tensor;
use log::debug;

/// Floating-point reference for the integer dense kernels.
///
/// Every operand is dequantized with its own `(scale, zero_point)`, the layer
/// is evaluated in f32 and the result quantized with the output params
/// (round half away from zero), clamped to int8 and then to
/// `[activation_min, activation_max]`. Filter and bias may be quantized per
/// output channel.
pub fn fully_connected_reference(
    output: &mut Tensor<i8>,
    input: &Tensor<i8>,
    filter: &Tensor<i8>,
    bias: &Tensor<i32>,
    activation_min: i32,
    activation_max: i32,
) -> Result<()> {
    let DenseDims { batches, accum_depth, output_depth } =
        DenseDims::validate(input.shape(), filter.shape(), output.shape(), Some(bias.len()))?;
    if activation_min > activation_max {
        return Err(KernelError::InvalidOutputStage(format!(
            "activation range [{}, {}] is empty",
            activation_min, activation_max
        )));
    }
    check_channels("filter channels", filter.quantization_params(), filter.shape().num_dims() - 1, output_depth)?;
    check_channels("bias channels", bias.quantization_params(), 0, output_depth)?;
    debug!("fully_connected_reference: batches={} accum_depth={} output_depth={}", batches, accum_depth, output_depth);

    let iq = input.quantization_params();
    let (input_scale, input_zp) = (iq.scale(0), iq.zero_point(0));
    let fq = filter.quantization_params();
    let bq = bias.quantization_params();
    let oq = output.quantization_params();
    let (output_scale, output_zp) = (oq.scale(0), oq.zero_point(0));

    for b in 0..batches {
        for out_c in 0..output_depth {
            let (filter_scale, filter_zp) = (fq.scale(out_c), fq.zero_point(out_c));
            let mut acc = 0f32;
            for d in 0..accum_depth {
                let input_f = dequantize(input.get_flat(b * accum_depth + d)? as i32, input_scale, input_zp);
                let filter_f = dequantize(filter.get_flat(d * output_depth + out_c)? as i32, filter_scale, filter_zp);
                acc += input_f * filter_f;
            }
            acc += dequantize(bias.get_flat(out_c)?, bq.scale(out_c), bq.zero_point(out_c));
            let q = quantize_output(acc, output_scale, output_zp);
            let q = clamp_activation(q, activation_min, activation_max);
            output.set(&[b, out_c], saturate_i8(q))?;
        }
    }
    output.sync()
}

/// `round(value / scale) + zero_point`, clamped to the int8 range.
#[inline]
fn quantize_output(value: f32, scale: f32, zero_point: i32) -> i32 {
    let unclamped = ((value / scale).round() as i32).saturating_add(zero_point);
    unclamped.clamp(i8::MIN as i32, i8::MAX as i32)
}

/// Per-channel params must run along the output-channel axis (`channel_axis`)
/// with one pair per output channel.
fn check_channels(what: &'static str, params: &QuantizationParams, channel_axis: usize, output_depth: usize) -> Result<()> {
    if !params.is_per_channel() {
        return Ok(());
    }
    if params.channel_axis() != channel_axis {
        return Err(KernelError::InvalidQuantization(format!(
            "{}: quantized along axis {}, expected output-channel axis {}",
            what,
            params.channel_axis(),
            channel_axis
        )));
    }
    if params.num_channels() != output_depth {
        return Err(KernelError::shape(what, output_depth, params.num_channels()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_output_rounds_and_clamps() {
        assert_eq!(quantize_output(2.5, 1.0, 0), 3);
        assert_eq!(quantize_output(-2.5, 1.0, 0), -3);
        assert_eq!(quantize_output(1.0, 0.5, 10), 12);
        assert_eq!(quantize_output(1e9, 1.0, 0), 127);
        assert_eq!(quantize_output(-1e9, 1.0, 0), -128);
    }

    #[test]
    fn per_channel_filter_scales_columns() {
        let unit = QuantizationParams::per_tensor(1.0, 0).unwrap();
        let input = Tensor::from_vec(&[1, 2], vec![2i8, 3], unit.clone()).unwrap();
        let fq = QuantizationParams::per_channel(vec![1.0, 0.5], vec![0, 0], 1).unwrap();
        let filter = Tensor::from_vec(&[2, 2], vec![1i8, 4, 1, 4], fq).unwrap();
        let bias = Tensor::from_vec(&[2], vec![0i32, 0], unit.clone()).unwrap();
        let mut out = Tensor::<i8>::zeros(&[1, 2], unit).unwrap();
        fully_connected_reference(&mut out, &input, &filter, &bias, -128, 127).unwrap();
        // column 0: 2*1 + 3*1 = 5; column 1: 2*2 + 3*2 = 10
        assert_eq!(out.to_vec().unwrap(), vec![5, 10]);
    }

    #[test]
    fn per_channel_count_must_match_output_depth() {
        let unit = QuantizationParams::per_tensor(1.0, 0).unwrap();
        let input = Tensor::from_vec(&[1, 1], vec![1i8], unit.clone()).unwrap();
        let fq = QuantizationParams::per_channel(vec![1.0, 1.0, 1.0], vec![0, 0, 0], 1).unwrap();
        let filter = Tensor::from_vec(&[1, 2], vec![1i8, 1], fq).unwrap();
        let bias = Tensor::from_vec(&[2], vec![0i32, 0], unit.clone()).unwrap();
        let mut out = Tensor::<i8>::zeros(&[1, 2], unit).unwrap();
        let err = fully_connected_reference(&mut out, &input, &filter, &bias, -128, 127).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { what: "filter channels", .. }));
    }

    #[test]
    fn per_channel_along_reduction_axis_is_rejected() {
        let unit = QuantizationParams::per_tensor(1.0, 0).unwrap();
        let input = Tensor::from_vec(&[1, 2], vec![2i8, 3], unit.clone()).unwrap();
        let fq = QuantizationParams::per_channel(vec![1.0, 0.5], vec![0, 0], 0).unwrap();
        let filter = Tensor::from_vec(&[2, 2], vec![1i8, 1, 2, 2], fq).unwrap();
        let bias = Tensor::from_vec(&[2], vec![0i32, 0], unit.clone()).unwrap();
        let mut out = Tensor::from_vec(&[1, 2], vec![99i8, 99], unit.clone()).unwrap();
        let err = fully_connected_reference(&mut out, &input, &filter, &bias, -128, 127).unwrap_err();
        assert!(matches!(err, KernelError::InvalidQuantization(_)));
        assert_eq!(out.to_vec().unwrap(), vec![99, 99]);

        let bq = QuantizationParams::per_channel(vec![1.0, 1.0], vec![0, 0], 1).unwrap();
        let bias = Tensor::from_vec(&[2], vec![0i32, 0], bq).unwrap();
        let filter = Tensor::from_vec(&[2, 2], vec![1i8, 1, 2, 2], unit).unwrap();
        let err = fully_connected_reference(&mut out, &input, &filter, &bias, -128, 127).unwrap_err();
        assert!(matches!(err, KernelError::InvalidQuantization(_)));
    }

    #[test]
    fn full_range_bias_with_zero_point_keeps_its_sign() {
        let unit = QuantizationParams::per_tensor(1.0, 0).unwrap();
        let input = Tensor::from_vec(&[1, 1], vec![1i8], unit.clone()).unwrap();
        let filter = Tensor::from_vec(&[1, 1], vec![1i8], unit.clone()).unwrap();
        let bias = Tensor::from_vec(&[1], vec![i32::MIN], QuantizationParams::per_tensor(1.0, 1).unwrap()).unwrap();
        let mut out = Tensor::<i8>::zeros(&[1, 1], unit).unwrap();
        fully_connected_reference(&mut out, &input, &filter, &bias, -128, 127).unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![-128]);
    }
}
