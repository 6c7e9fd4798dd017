use crate::layer::{LayerMeta, QuantDenseLayer};
use crate::quant::{OutputStage, QuantizationParams};
use crate::tensor::element::{decode_into, encode_slice};
use crate::tensor::Tensor;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const LAYER_MAGIC: &[u8; 8] = b"PIEFC001"; // Pie fully-connected v1
pub const LAYER_VERSION: u32 = 1;

// Layout (little endian):
// magic: 8 bytes b"PIEFC001"
// u32 version
// u32 input_dim, u32 output_dim
// (f32 scale, i32 zero_point) for input, filter, bias, output
// i32 output_multiplier, i32 output_shift
// i32 activation_min, i32 activation_max
// u8  has_bias
// i8  filter[input_dim * output_dim]   row-major [input_dim, output_dim]
// i32 bias[output_dim]                 only if has_bias

const HEADER_BYTES: u64 = 8 + 4 + 8 + 4 * 8 + 4 * 4 + 1;

fn read_u32<R: Read>(r: &mut R, what: &str) -> Result<u32> {
    let mut b4 = [0u8; 4];
    r.read_exact(&mut b4).with_context(|| format!("read {}", what))?;
    Ok(u32::from_le_bytes(b4))
}

fn read_i32<R: Read>(r: &mut R, what: &str) -> Result<i32> {
    Ok(read_u32(r, what)? as i32)
}

fn read_params<R: Read>(r: &mut R, what: &str) -> Result<QuantizationParams> {
    let scale = f32::from_bits(read_u32(r, what)?);
    let zero_point = read_i32(r, what)?;
    QuantizationParams::per_tensor(scale, zero_point).with_context(|| format!("{} quantization", what))
}

fn write_params<W: Write>(w: &mut W, p: &QuantizationParams) -> Result<()> {
    w.write_all(&p.scale(0).to_le_bytes())?;
    w.write_all(&p.zero_point(0).to_le_bytes())?;
    Ok(())
}

impl QuantDenseLayer {
    pub fn load_quantized<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open dense layer file: {}", path.as_ref().display()))?;
        let file_len = f.metadata().context("stat dense layer file")?.len();
        let mut r = BufReader::new(f);
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).context("read magic")?;
        if &magic != LAYER_MAGIC { bail!("bad dense layer magic"); }
        let version = read_u32(&mut r, "version")?;
        if version != LAYER_VERSION { bail!("unsupported dense layer version {}", version); }
        let input_dim = read_u32(&mut r, "input_dim")? as usize;
        let output_dim = read_u32(&mut r, "output_dim")? as usize;
        if input_dim == 0 || output_dim == 0 { bail!("empty dense layer {}x{}", input_dim, output_dim); }
        // Header dims are untrusted; the filter alone must fit in what is left of the file.
        let filter_len = (input_dim as u64).checked_mul(output_dim as u64);
        match filter_len {
            Some(n) if n <= file_len.saturating_sub(HEADER_BYTES) => {}
            _ => bail!("dense layer {}x{} does not fit in a {} byte file", input_dim, output_dim, file_len),
        }

        let input_params = read_params(&mut r, "input")?;
        let filter_params = read_params(&mut r, "filter")?;
        let bias_params = read_params(&mut r, "bias")?;
        let output_params = read_params(&mut r, "output")?;
        let stage = OutputStage {
            output_multiplier: read_i32(&mut r, "output_multiplier")?,
            output_shift: read_i32(&mut r, "output_shift")?,
            activation_min: read_i32(&mut r, "activation_min")?,
            activation_max: read_i32(&mut r, "activation_max")?,
        };
        stage.validate().context("output stage")?;
        let mut flag = [0u8; 1];
        r.read_exact(&mut flag).context("read has_bias")?;

        let mut w_bytes = vec![0u8; input_dim * output_dim];
        r.read_exact(&mut w_bytes).context("read filter weights")?;
        let w: Vec<i8> = w_bytes.into_iter().map(|b| b as i8).collect();
        let filter = Tensor::from_vec(&[input_dim, output_dim], w, filter_params)?;

        let bias = if flag[0] != 0 {
            let mut b_bytes = vec![0u8; output_dim * 4];
            r.read_exact(&mut b_bytes).context("read bias")?;
            let mut b = vec![0i32; output_dim];
            decode_into(&b_bytes, &mut b);
            Some(Tensor::from_vec(&[output_dim], b, bias_params.clone())?)
        } else {
            None
        };

        Ok(Self {
            meta: LayerMeta { version, input_dim, output_dim },
            input_params,
            output_params,
            filter,
            bias,
            bias_params,
            stage,
        })
    }

    pub fn write_quantized<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let f = File::create(&path).with_context(|| format!("create dense layer file: {}", path.as_ref().display()))?;
        let mut w = BufWriter::new(f);
        w.write_all(LAYER_MAGIC)?;
        w.write_all(&LAYER_VERSION.to_le_bytes())?;
        w.write_all(&(self.meta.input_dim as u32).to_le_bytes())?;
        w.write_all(&(self.meta.output_dim as u32).to_le_bytes())?;
        write_params(&mut w, &self.input_params)?;
        write_params(&mut w, self.filter.quantization_params())?;
        write_params(&mut w, &self.bias_params)?;
        write_params(&mut w, &self.output_params)?;
        for v in [self.stage.output_multiplier, self.stage.output_shift, self.stage.activation_min, self.stage.activation_max] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&[u8::from(self.bias.is_some())])?;
        w.write_all(&encode_slice(&self.filter.to_vec()?))?;
        if let Some(bias) = &self.bias {
            w.write_all(&encode_slice(&bias.to_vec()?))?;
        }
        w.flush().context("flush dense layer file")?;
        Ok(())
    }
}
