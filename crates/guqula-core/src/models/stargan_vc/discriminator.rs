//! StarGAN-VC projection discriminator.
//!
//! A gated convolutional stack pools the feature map into a single vector
//! per sample; the real/fake score is a linear head plus a projection of the
//! source/target condition onto that vector.

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::stargan_vc::blocks::{glu, sigmoid_gate, DownsampleBlock, PadConv2d};
use crate::models::stargan_vc::config::StarGanVcConfig;
use crate::models::stargan_vc::speaker::concat_condition;

#[derive(Debug)]
pub struct Discriminator {
    stem: PadConv2d,
    stem_gated: PadConv2d,
    down_sample_1: DownsampleBlock,
    down_sample_2: DownsampleBlock,
    down_sample_3: DownsampleBlock,
    down_sample_4: DownsampleBlock,
    head: Linear,
    projection: Linear,
    config: StarGanVcConfig,
}

impl Discriminator {
    pub fn load(config: &StarGanVcConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let style_dim = config.condition_dim();
        debug!(style_dim, "loading discriminator");

        let stem = PadConv2d::load(1, 128, (3, 3), 1, (1, 1), true, vb.pp("stem"))?;
        let stem_gated = PadConv2d::load(1, 128, (3, 3), 1, (1, 1), true, vb.pp("stem_gated"))?;

        let down_sample_1 =
            DownsampleBlock::load(64, 256, (3, 3), 2, (1, 1), false, vb.pp("down_sample_1"))?;
        let down_sample_2 =
            DownsampleBlock::load(128, 512, (3, 3), 2, (1, 1), false, vb.pp("down_sample_2"))?;
        let down_sample_3 =
            DownsampleBlock::load(256, 1024, (3, 3), 2, (1, 1), false, vb.pp("down_sample_3"))?;
        let down_sample_4 =
            DownsampleBlock::load(512, 1024, (1, 5), 1, (0, 2), false, vb.pp("down_sample_4"))?;

        let head = candle_nn::linear(512, 1, vb.pp("head"))?;
        let projection = candle_nn::linear(style_dim, 512, vb.pp("projection"))?;

        Ok(Self {
            stem,
            stem_gated,
            down_sample_1,
            down_sample_2,
            down_sample_3,
            down_sample_4,
            head,
            projection,
            config: config.clone(),
        })
    }

    /// Score a feature map as real or fake under the given condition pair.
    ///
    /// `x` is `[B, 1, H, T]`; `source` and `target` are `[B, num_speakers]`
    /// one-hot vectors. Returns `[B, 1]`.
    pub fn forward(&self, x: &Tensor, source: &Tensor, target: &Tensor) -> Result<Tensor> {
        let (batch, channels, _height, _width) = x.dims4()?;
        if channels != 1 {
            return Err(Error::InvalidInput(format!(
                "discriminator expects a single-channel feature map, got {:?}",
                x.dims()
            )));
        }
        let style = concat_condition(source, target, batch, self.config.num_speakers)?;

        let a = glu(&self.stem.forward(x)?, 1)?;
        let b = glu(&self.stem_gated.forward(x)?, 1)?;
        let x = sigmoid_gate(&a, &b)?;

        let x = self.down_sample_1.forward(&x)?;
        let x = self.down_sample_2.forward(&x)?;
        let x = self.down_sample_3.forward(&x)?;
        let x = self.down_sample_4.forward(&x)?;

        // Global sum pooling over the remaining spatial extent.
        let pooled = x.sum((2, 3))?;

        let score = self.head.forward(&pooled)?;
        let projected = self.projection.forward(&style)?;
        let conditioned = (&projected * &pooled)?.sum_keepdim(1)?;
        Ok((&score + &conditioned)?)
    }

    pub fn config(&self) -> &StarGanVcConfig {
        &self.config
    }
}
