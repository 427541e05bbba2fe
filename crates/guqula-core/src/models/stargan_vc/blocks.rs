//! Gated convolutional building blocks for StarGAN-VC.
//!
//! Every block is a pure forward transformation loaded from a `VarBuilder`.
//! The architecture leans on three pieces candle does not ship directly:
//! GLU gating, sub-pixel shuffling, and instance normalization variants
//! (plain affine, adaptive, conditional). They are implemented here on top
//! of raw tensor ops.

use candle_core::{Tensor, D};
use candle_nn::ops::sigmoid;
use candle_nn::{
    Conv1d, Conv1dConfig, ConvTranspose2d, ConvTranspose2dConfig, Linear, Module, VarBuilder,
};

use crate::error::{Error, Result};
use crate::models::stargan_vc::config::Conditioning;

/// Epsilon used by the conditioned normalization blocks.
const COND_NORM_EPS: f64 = 1e-8;

/// Epsilon used by plain affine instance normalization.
const INSTANCE_NORM_EPS: f64 = 1e-5;

/// Gated linear unit: split `x` in half along `dim`, gate the first half
/// with the sigmoid of the second.
pub fn glu(x: &Tensor, dim: usize) -> Result<Tensor> {
    let size = x.dim(dim)?;
    if size % 2 != 0 {
        return Err(Error::InvalidInput(format!(
            "glu requires an even size along dim {dim}, got {size}"
        )));
    }
    let chunks = x.chunk(2, dim)?;
    let gate = sigmoid(&chunks[1])?;
    Ok((&chunks[0] * &gate)?)
}

/// Combine two gated paths as `a * sigmoid(b)`.
pub fn sigmoid_gate(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    Ok((a * &sigmoid(b)?)?)
}

/// Sub-pixel shuffle: rearrange `[B, C*r^2, H, W]` into `[B, C, H*r, W*r]`.
pub fn pixel_shuffle(x: &Tensor, r: usize) -> Result<Tensor> {
    let (b, c, h, w) = x.dims4()?;
    if c % (r * r) != 0 {
        return Err(Error::InvalidInput(format!(
            "pixel_shuffle requires channels divisible by {}, got {c}",
            r * r
        )));
    }
    let c_out = c / (r * r);
    // [B, C, r, r, H, W] -> [B, C, H, r, W, r] -> [B, C, H*r, W*r]
    let x = x.reshape((b, c_out, r, r, h, w))?;
    let x = x.transpose(3, 4)?.transpose(2, 3)?.transpose(4, 5)?;
    Ok(x.contiguous()?.reshape((b, c_out, h * r, w * r))?)
}

/// 2-D convolution with independent padding per spatial axis.
///
/// Candle's conv2d applies one padding value to both axes; the StarGAN-VC
/// stem and head use rectangular kernels like (5, 15) with padding (2, 7),
/// so the input is zero-padded explicitly before an unpadded convolution.
#[derive(Debug)]
pub struct PadConv2d {
    weight: Tensor,
    bias: Option<Tensor>,
    stride: usize,
    padding: (usize, usize),
}

impl PadConv2d {
    pub fn load(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: usize,
        padding: (usize, usize),
        bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight = vb.get((out_channels, in_channels, kernel.0, kernel.1), "weight")?;
        let bias = if bias {
            Some(vb.get(out_channels, "bias")?)
        } else {
            None
        };
        Ok(Self {
            weight,
            bias,
            stride,
            padding,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (ph, pw) = self.padding;
        let mut x = x.clone();
        if ph > 0 {
            x = x.pad_with_zeros(2, ph, ph)?;
        }
        if pw > 0 {
            x = x.pad_with_zeros(3, pw, pw)?;
        }
        let mut out = x.conv2d(&self.weight, 0, self.stride, 1, 1)?;
        if let Some(bias) = &self.bias {
            let out_channels = bias.dim(0)?;
            out = out.broadcast_add(&bias.reshape((1, out_channels, 1, 1))?)?;
        }
        Ok(out)
    }
}

/// Affine instance normalization over the trailing spatial/temporal axes.
///
/// Accepts `[B, C, T]` and `[B, C, H, W]` inputs; statistics are per sample
/// and per channel.
#[derive(Debug)]
pub struct InstanceNorm {
    weight: Tensor,
    bias: Tensor,
}

impl InstanceNorm {
    pub fn load(channels: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get(channels, "weight")?;
        let bias = vb.get(channels, "bias")?;
        Ok(Self { weight, bias })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let channels = self.weight.dim(0)?;
        let (mean, var, scale_shape) = match x.rank() {
            3 => {
                let mean = x.mean_keepdim(2)?;
                let diff = x.broadcast_sub(&mean)?;
                let var = (&diff * &diff)?.mean_keepdim(2)?;
                (mean, var, vec![1, channels, 1])
            }
            4 => {
                let mean = x.mean_keepdim((2, 3))?;
                let diff = x.broadcast_sub(&mean)?;
                let var = (&diff * &diff)?.mean_keepdim((2, 3))?;
                (mean, var, vec![1, channels, 1, 1])
            }
            rank => {
                return Err(Error::InvalidInput(format!(
                    "instance norm expects rank 3 or 4 input, got rank {rank}"
                )));
            }
        };
        let std = (var + INSTANCE_NORM_EPS)?.sqrt()?;
        let normalized = x.broadcast_sub(&mean)?.broadcast_div(&std)?;
        let weight = self.weight.reshape(scale_shape.clone())?;
        let bias = self.bias.reshape(scale_shape)?;
        Ok(normalized.broadcast_mul(&weight)?.broadcast_add(&bias)?)
    }
}

/// Adaptive instance normalization over `[B, C, T]` features.
///
/// A single linear layer maps the style vector to per-channel (gamma, beta);
/// the output is `(1 + gamma) * (x - mean) / std + beta`.
#[derive(Debug)]
pub struct AdaIn {
    fc: Linear,
}

impl AdaIn {
    pub fn load(channels: usize, style_dim: usize, vb: VarBuilder) -> Result<Self> {
        let fc = candle_nn::linear(style_dim, channels * 2, vb.pp("fc"))?;
        Ok(Self { fc })
    }

    pub fn forward(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        let h = self.fc.forward(style)?.unsqueeze(D::Minus1)?;
        let chunks = h.chunk(2, 1)?;
        let gamma = &chunks[0];
        let beta = &chunks[1];

        let mean = x.mean_keepdim(2)?;
        let diff = x.broadcast_sub(&mean)?;
        let var = (&diff * &diff)?.mean_keepdim(2)?;
        let std = (var + COND_NORM_EPS)?.sqrt()?;

        let normalized = diff.broadcast_div(&std)?;
        Ok(normalized
            .broadcast_mul(&(gamma + 1.0)?)?
            .broadcast_add(beta)?)
    }
}

/// Conditional instance normalization over `[B, C, T]` features.
///
/// Separate linears produce gamma and beta from the style vector; the output
/// is `gamma * (x - mean) / std + beta`.
#[derive(Debug)]
pub struct Cin {
    gamma: Linear,
    beta: Linear,
}

impl Cin {
    pub fn load(channels: usize, style_dim: usize, vb: VarBuilder) -> Result<Self> {
        let gamma = candle_nn::linear(style_dim, channels, vb.pp("gamma"))?;
        let beta = candle_nn::linear(style_dim, channels, vb.pp("beta"))?;
        Ok(Self { gamma, beta })
    }

    pub fn forward(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        let gamma = self.gamma.forward(style)?.unsqueeze(D::Minus1)?;
        let beta = self.beta.forward(style)?.unsqueeze(D::Minus1)?;

        let mean = x.mean_keepdim(2)?;
        let diff = x.broadcast_sub(&mean)?;
        let var = (&diff * &diff)?.mean_keepdim(2)?;
        let std = (var + COND_NORM_EPS)?.sqrt()?;

        let normalized = diff.broadcast_div(&std)?;
        Ok(normalized.broadcast_mul(&gamma)?.broadcast_add(&beta)?)
    }
}

/// Style-conditioned normalization selected by config.
#[derive(Debug)]
pub enum CondNorm {
    Adain(AdaIn),
    Cin(Cin),
}

impl CondNorm {
    pub fn load(
        channels: usize,
        style_dim: usize,
        conditioning: Conditioning,
        vb: VarBuilder,
    ) -> Result<Self> {
        match conditioning {
            Conditioning::Adain => Ok(Self::Adain(AdaIn::load(
                channels,
                style_dim,
                vb.pp("adain"),
            )?)),
            Conditioning::Cin => Ok(Self::Cin(Cin::load(channels, style_dim, vb.pp("cin"))?)),
        }
    }

    pub fn forward(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        match self {
            Self::Adain(norm) => norm.forward(x, style),
            Self::Cin(norm) => norm.forward(x, style),
        }
    }
}

/// Strided down-sampling with dual gated paths.
///
/// Each path runs conv -> instance norm -> GLU; the outputs are combined as
/// `a * sigmoid(b)`, so the block halves the conv channel count twice over.
#[derive(Debug)]
pub struct DownsampleBlock {
    conv: PadConv2d,
    norm: InstanceNorm,
    conv_gated: PadConv2d,
    norm_gated: InstanceNorm,
}

impl DownsampleBlock {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        in_channels: usize,
        out_channels: usize,
        kernel: (usize, usize),
        stride: usize,
        padding: (usize, usize),
        bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let conv = PadConv2d::load(
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            bias,
            vb.pp("conv"),
        )?;
        let norm = InstanceNorm::load(out_channels, vb.pp("norm"))?;
        let conv_gated = PadConv2d::load(
            in_channels,
            out_channels,
            kernel,
            stride,
            padding,
            bias,
            vb.pp("conv_gated"),
        )?;
        let norm_gated = InstanceNorm::load(out_channels, vb.pp("norm_gated"))?;
        Ok(Self {
            conv,
            norm,
            conv_gated,
            norm_gated,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let a = glu(&self.norm.forward(&self.conv.forward(x)?)?, 1)?;
        let b = glu(&self.norm_gated.forward(&self.conv_gated.forward(x)?)?, 1)?;
        sigmoid_gate(&a, &b)
    }
}

/// Sub-pixel up-sampling with dual gated paths.
///
/// Each path runs transposed conv -> pixel shuffle (x2) -> GLU, combined as
/// `a * sigmoid(b)`.
#[derive(Debug)]
pub struct UpsampleBlock {
    conv: ConvTranspose2d,
    conv_gated: ConvTranspose2d,
}

impl UpsampleBlock {
    pub fn load(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let config = ConvTranspose2dConfig {
            padding,
            output_padding: 0,
            stride,
            dilation: 1,
        };
        let load_one = |vb: VarBuilder| -> Result<ConvTranspose2d> {
            let conv = if bias {
                candle_nn::conv_transpose2d(in_channels, out_channels, kernel, config, vb)?
            } else {
                candle_nn::conv_transpose2d_no_bias(in_channels, out_channels, kernel, config, vb)?
            };
            Ok(conv)
        };
        let conv = load_one(vb.pp("conv"))?;
        let conv_gated = load_one(vb.pp("conv_gated"))?;
        Ok(Self { conv, conv_gated })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let a = glu(&pixel_shuffle(&self.conv.forward(x)?, 2)?, 1)?;
        let b = glu(&pixel_shuffle(&self.conv_gated.forward(x)?, 2)?, 1)?;
        sigmoid_gate(&a, &b)
    }
}

/// Style-conditioned residual block over `[B, C, T]` features.
///
/// conv -> conditioned norm -> GLU, added back onto the block input. The
/// conv doubles the channel count so the GLU returns to the input width.
#[derive(Debug)]
pub struct ResidualBlock {
    conv: Conv1d,
    norm: CondNorm,
}

impl ResidualBlock {
    pub fn load(
        in_channels: usize,
        conv_channels: usize,
        kernel: usize,
        padding: usize,
        style_dim: usize,
        conditioning: Conditioning,
        vb: VarBuilder,
    ) -> Result<Self> {
        let config = Conv1dConfig {
            padding,
            ..Default::default()
        };
        let conv = candle_nn::conv1d(in_channels, conv_channels, kernel, config, vb.pp("conv"))?;
        let norm = CondNorm::load(conv_channels, style_dim, conditioning, vb)?;
        Ok(Self { conv, norm })
    }

    pub fn forward(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        let h = self.conv.forward(x)?;
        let h = self.norm.forward(&h, style)?;
        let h = glu(&h, 1)?;
        Ok((x + &h)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn zeros_vb() -> VarBuilder<'static> {
        VarBuilder::zeros(DType::F32, &Device::Cpu)
    }

    #[test]
    fn glu_gates_first_half_with_second() {
        let x = Tensor::from_vec(vec![1.0f32, 0.0], (1, 2, 1, 1), &Device::Cpu).unwrap();
        let out = glu(&x, 1).unwrap();
        assert_eq!(out.dims(), &[1, 1, 1, 1]);
        let value = out.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0];
        // sigmoid(0) = 0.5
        assert!((value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn glu_rejects_odd_channel_count() {
        let x = Tensor::zeros((1, 3, 2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(glu(&x, 1), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn pixel_shuffle_rearranges_channels_into_space() {
        let x = Tensor::from_vec(vec![0.0f32, 1.0, 2.0, 3.0], (1, 4, 1, 1), &Device::Cpu).unwrap();
        let out = pixel_shuffle(&x, 2).unwrap();
        assert_eq!(out.dims(), &[1, 1, 2, 2]);
        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn pixel_shuffle_rejects_indivisible_channels() {
        let x = Tensor::zeros((1, 6, 2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(pixel_shuffle(&x, 2), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn adain_with_zero_weights_normalizes_per_channel() {
        // Zero fc weights make gamma = beta = 0, so the output is the plain
        // per-channel normalization of the input.
        let norm = AdaIn::load(2, 3, zeros_vb()).unwrap();
        let x = Tensor::from_vec(
            vec![1.0f32, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0],
            (1, 2, 4),
            &Device::Cpu,
        )
        .unwrap();
        let style = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).unwrap();
        let out = norm.forward(&x, &style).unwrap();
        assert_eq!(out.dims(), &[1, 2, 4]);
        let means = out.mean(2).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for mean in means {
            assert!(mean.abs() < 1e-5);
        }
    }

    #[test]
    fn cin_with_zero_weights_collapses_to_zero() {
        let norm = Cin::load(2, 3, zeros_vb()).unwrap();
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (1, 2, 2), &Device::Cpu).unwrap();
        let style = Tensor::zeros((1, 3), DType::F32, &Device::Cpu).unwrap();
        let out = norm.forward(&x, &style).unwrap();
        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn pad_conv2d_applies_asymmetric_padding() {
        let conv = PadConv2d::load(1, 2, (1, 5), 1, (0, 2), false, zeros_vb()).unwrap();
        let x = Tensor::zeros((1, 1, 3, 8), DType::F32, &Device::Cpu).unwrap();
        let out = conv.forward(&x).unwrap();
        assert_eq!(out.dims(), &[1, 2, 3, 8]);
    }

    #[test]
    fn downsample_block_halves_space_and_gates_channels() {
        let block = DownsampleBlock::load(4, 8, (3, 3), 2, (1, 1), false, zeros_vb()).unwrap();
        let x = Tensor::zeros((1, 4, 8, 8), DType::F32, &Device::Cpu).unwrap();
        let out = block.forward(&x).unwrap();
        assert_eq!(out.dims(), &[1, 4, 4, 4]);
    }

    #[test]
    fn upsample_block_doubles_space() {
        let block = UpsampleBlock::load(8, 16, 5, 1, 2, false, zeros_vb()).unwrap();
        let x = Tensor::zeros((1, 8, 4, 4), DType::F32, &Device::Cpu).unwrap();
        let out = block.forward(&x).unwrap();
        assert_eq!(out.dims(), &[1, 2, 8, 8]);
    }

    #[test]
    fn residual_block_preserves_shape() {
        let block = ResidualBlock::load(4, 8, 5, 2, 6, Conditioning::Adain, zeros_vb()).unwrap();
        let x = Tensor::zeros((2, 4, 8), DType::F32, &Device::Cpu).unwrap();
        let style = Tensor::zeros((2, 6), DType::F32, &Device::Cpu).unwrap();
        let out = block.forward(&x, &style).unwrap();
        assert_eq!(out.dims(), &[2, 4, 8]);
    }
}
