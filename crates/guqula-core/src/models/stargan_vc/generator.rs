//! StarGAN-VC generator.
//!
//! A 2-D gated encoder squeezes the mel feature map into a 1-D bottleneck,
//! style-conditioned residual blocks transform it, and a sub-pixel decoder
//! restores the spatial layout. The same generator serves every conversion
//! direction; the direction is carried entirely by the source/target one-hot
//! condition pair.

use candle_core::Tensor;
use candle_nn::{Conv1d, Conv1dConfig, Module, VarBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::stargan_vc::blocks::{
    glu, DownsampleBlock, InstanceNorm, PadConv2d, ResidualBlock, UpsampleBlock,
};
use crate::models::stargan_vc::config::StarGanVcConfig;
use crate::models::stargan_vc::speaker::concat_condition;

#[derive(Debug)]
pub struct Generator {
    stem: PadConv2d,
    down_sample_1: DownsampleBlock,
    down_sample_2: DownsampleBlock,
    down_conversion_conv: Conv1d,
    down_conversion_norm: InstanceNorm,
    residual: Vec<ResidualBlock>,
    up_conversion: Conv1d,
    up_sample_1: UpsampleBlock,
    up_sample_2: UpsampleBlock,
    out: PadConv2d,
    config: StarGanVcConfig,
}

impl Generator {
    pub fn load(config: &StarGanVcConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let bottleneck = config.bottleneck_width();
        let style_dim = config.condition_dim();
        debug!(bottleneck, style_dim, "loading generator");

        let stem = PadConv2d::load(1, 128, (5, 15), 1, (2, 7), true, vb.pp("stem"))?;

        let down_sample_1 =
            DownsampleBlock::load(64, 256, (5, 5), 2, (2, 2), false, vb.pp("down_sample_1"))?;
        let down_sample_2 =
            DownsampleBlock::load(128, 512, (5, 5), 2, (2, 2), false, vb.pp("down_sample_2"))?;

        let k1 = Conv1dConfig::default();
        let down_conversion_conv = candle_nn::conv1d_no_bias(
            bottleneck,
            256,
            1,
            k1,
            vb.pp("down_conversion").pp("conv"),
        )?;
        let down_conversion_norm = InstanceNorm::load(256, vb.pp("down_conversion").pp("norm"))?;

        let mut residual = Vec::with_capacity(config.num_residual_blocks);
        for idx in 0..config.num_residual_blocks {
            let block = ResidualBlock::load(
                256,
                512,
                5,
                2,
                style_dim,
                config.conditioning,
                vb.pp(format!("residual.{idx}")),
            )?;
            residual.push(block);
        }

        let up_conversion =
            candle_nn::conv1d_no_bias(256, bottleneck, 1, k1, vb.pp("up_conversion"))?;

        let up_sample_1 = UpsampleBlock::load(256, 1024, 5, 1, 2, false, vb.pp("up_sample_1"))?;
        let up_sample_2 = UpsampleBlock::load(128, 512, 5, 1, 2, false, vb.pp("up_sample_2"))?;

        let out = PadConv2d::load(64, 1, (5, 15), 1, (2, 7), false, vb.pp("out"))?;

        Ok(Self {
            stem,
            down_sample_1,
            down_sample_2,
            down_conversion_conv,
            down_conversion_norm,
            residual,
            up_conversion,
            up_sample_1,
            up_sample_2,
            out,
            config: config.clone(),
        })
    }

    /// Convert a feature map from the source style to the target style.
    ///
    /// `x` is `[B, 1, num_mels, T]` with `T` divisible by 4; `source` and
    /// `target` are `[B, num_speakers]` one-hot vectors. Returns
    /// `[B, 1, num_mels - 1, T]`.
    pub fn forward(&self, x: &Tensor, source: &Tensor, target: &Tensor) -> Result<Tensor> {
        let (batch, channels, height, width) = x.dims4()?;
        if channels != 1 || height != self.config.num_mels {
            return Err(Error::InvalidInput(format!(
                "generator expects [batch, 1, {}, frames] input, got {:?}",
                self.config.num_mels,
                x.dims()
            )));
        }
        if width == 0 || width % 4 != 0 {
            return Err(Error::InvalidInput(format!(
                "frame count must be a nonzero multiple of 4, got {width}"
            )));
        }
        let style = concat_condition(source, target, batch, self.config.num_speakers)?;

        let x = glu(&self.stem.forward(x)?, 1)?;
        let x = self.down_sample_1.forward(&x)?;
        let x = self.down_sample_2.forward(&x)?;

        // Fold the mel axis into the channel axis for the 1-D bottleneck.
        let x = x
            .contiguous()?
            .reshape((batch, self.config.bottleneck_width(), width / 4))?;
        let x = self.down_conversion_conv.forward(&x)?;
        let mut x = self.down_conversion_norm.forward(&x)?;

        for block in &self.residual {
            x = block.forward(&x, &style)?;
        }

        let x = self.up_conversion.forward(&x)?;
        let x = x.reshape((batch, 256, self.config.num_mels / 4, width / 4))?;

        let x = self.up_sample_1.forward(&x)?;
        let x = self.up_sample_2.forward(&x)?;

        let out = self.out.forward(&x)?;
        // The reference head emits one fewer mel row than it consumes.
        Ok(out.narrow(2, 0, self.config.num_mels - 1)?)
    }

    pub fn config(&self) -> &StarGanVcConfig {
        &self.config
    }
}
