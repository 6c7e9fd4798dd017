use crate::error::Result;
use crate::kernel::{fully_connected, fully_connected_reference, fully_connected_with_bias};
use crate::quant::{OutputStage, QuantizationParams};
use crate::tensor::Tensor;

pub mod config;
pub mod loader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMeta {
    pub version: u32,
    pub input_dim: usize,
    pub output_dim: usize,
}

/// One quantized fully-connected layer: int8 filter, optional int32 bias and
/// the fixed-point output stage.
#[derive(Debug)]
pub struct QuantDenseLayer {
    pub meta: LayerMeta,
    pub input_params: QuantizationParams,
    pub output_params: QuantizationParams,
    pub filter: Tensor<i8>,          // input_dim x output_dim
    pub bias: Option<Tensor<i32>>,   // output_dim
    pub bias_params: QuantizationParams,
    pub stage: OutputStage,
}

impl QuantDenseLayer {
    /// Input tensor for `rows.len() / input_dim` batches using the layer's input params.
    pub fn input_tensor(&self, rows: Vec<i8>) -> Result<Tensor<i8>> {
        let batches = rows.len() / self.meta.input_dim.max(1);
        Tensor::from_vec(&[batches, self.meta.input_dim], rows, self.input_params.clone())
    }

    /// Fresh in-memory output tensor for `batches` rows.
    pub fn output_tensor(&self, batches: usize) -> Result<Tensor<i8>> {
        Tensor::zeros(&[batches, self.meta.output_dim], self.output_params.clone())
    }

    /// Integer forward pass into a caller-owned output (which may be paged).
    pub fn forward_into(&self, input: &Tensor<i8>, output: &mut Tensor<i8>) -> Result<()> {
        match &self.bias {
            Some(bias) => fully_connected_with_bias(output, input, &self.filter, bias, &self.stage),
            None => fully_connected(output, input, &self.filter, &self.stage),
        }
    }

    pub fn forward(&self, input: &Tensor<i8>) -> Result<Tensor<i8>> {
        let mut out = self.output_tensor(input.shape()[0])?;
        self.forward_into(input, &mut out)?;
        Ok(out)
    }

    /// Float reference forward pass; a missing bias is treated as zeros.
    pub fn forward_reference(&self, input: &Tensor<i8>) -> Result<Tensor<i8>> {
        let mut out = self.output_tensor(input.shape()[0])?;
        let zeros;
        let bias = match &self.bias {
            Some(b) => b,
            None => {
                zeros = Tensor::<i32>::zeros(&[self.meta.output_dim], self.bias_params.clone())?;
                &zeros
            }
        };
        fully_connected_reference(&mut out, input, &self.filter, bias, self.stage.activation_min, self.stage.activation_max)?;
        Ok(out)
    }
}
