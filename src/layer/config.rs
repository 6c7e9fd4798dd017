use crate::layer::{loader::LAYER_VERSION, LayerMeta, QuantDenseLayer};
use crate::quant::{OutputStage, QuantizationParams};
use crate::tensor::Tensor;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantConfig {
    pub scale: f32,
    #[serde(default)]
    pub zero_point: i32,
}

impl QuantConfig {
    fn params(&self, what: &str) -> Result<QuantizationParams> {
        QuantizationParams::per_tensor(self.scale, self.zero_point).with_context(|| format!("{} quantization", what))
    }
}

fn default_activation_min() -> i32 { i8::MIN as i32 }
fn default_activation_max() -> i32 { i8::MAX as i32 }
fn default_true() -> bool { true }

/// JSON description of a dense layer's shape and quantization.
///
/// `bias` defaults to `scale = input.scale * filter.scale, zero_point = 0`.
/// When `output_multiplier`/`output_shift` are omitted they are derived from
/// `input.scale * filter.scale / output.scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayerConfig {
    pub input_dim: usize,
    pub output_dim: usize,
    pub input: QuantConfig,
    pub filter: QuantConfig,
    #[serde(default)]
    pub bias: Option<QuantConfig>,
    pub output: QuantConfig,
    #[serde(default)]
    pub output_multiplier: Option<i32>,
    #[serde(default)]
    pub output_shift: Option<i32>,
    #[serde(default = "default_activation_min")]
    pub activation_min: i32,
    #[serde(default = "default_activation_max")]
    pub activation_max: i32,
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

impl DenseLayerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read layer config: {}", path.as_ref().display()))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).context("parse layer config")?;
        if cfg.input_dim == 0 || cfg.output_dim == 0 {
            bail!("layer config dims must be positive, got {}x{}", cfg.input_dim, cfg.output_dim);
        }
        Ok(cfg)
    }

    pub fn bias_quant(&self) -> QuantConfig {
        self.bias.unwrap_or(QuantConfig { scale: self.input.scale * self.filter.scale, zero_point: 0 })
    }

    /// Real rescale ratio `input.scale * filter.scale / output.scale`.
    pub fn real_multiplier(&self) -> f64 {
        self.input.scale as f64 * self.filter.scale as f64 / self.output.scale as f64
    }

    pub fn output_stage(&self) -> Result<OutputStage> {
        let stage = match (self.output_multiplier, self.output_shift) {
            (Some(m), Some(s)) => OutputStage::new(m, s),
            (None, None) => OutputStage::from_real_multiplier(self.real_multiplier()).context("derive output multiplier")?,
            _ => bail!("output_multiplier and output_shift must be given together"),
        };
        let stage = stage.with_activation(self.activation_min, self.activation_max);
        stage.validate().context("output stage")?;
        Ok(stage)
    }

    /// Build a layer from row-major `[input_dim, output_dim]` weights.
    pub fn build(&self, filter: Vec<i8>, bias: Option<Vec<i32>>) -> Result<QuantDenseLayer> {
        let bias_params = self.bias_quant().params("bias")?;
        let filter = Tensor::from_vec(&[self.input_dim, self.output_dim], filter, self.filter.params("filter")?)
            .context("filter weights")?;
        let bias = match (self.use_bias, bias) {
            (true, Some(b)) => Some(Tensor::from_vec(&[self.output_dim], b, bias_params.clone()).context("bias")?),
            (true, None) => bail!("config requires a bias but none was given"),
            (false, _) => None,
        };
        Ok(QuantDenseLayer {
            meta: LayerMeta { version: LAYER_VERSION, input_dim: self.input_dim, output_dim: self.output_dim },
            input_params: self.input.params("input")?,
            output_params: self.output.params("output")?,
            filter,
            bias,
            bias_params,
            stage: self.output_stage()?,
        })
    }
}
