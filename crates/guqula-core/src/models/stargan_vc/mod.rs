//! StarGAN-VC voice conversion networks.
//!
//! One generator serves every conversion direction between the configured
//! speakers; a projection discriminator scores feature maps under the same
//! source/target condition pair. Weights load from a model directory holding
//! `config.json` and `model.safetensors` with `generator.*` and
//! `discriminator.*` tensor prefixes.

pub mod blocks;
pub mod config;
pub mod discriminator;
pub mod generator;
pub mod speaker;

pub use config::{Conditioning, StarGanVcConfig};
pub use discriminator::Discriminator;
pub use generator::Generator;

use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::info;

use crate::error::{Error, Result};

/// Generator/discriminator pair sharing one configuration.
#[derive(Debug)]
pub struct StarGanVc {
    generator: Generator,
    discriminator: Discriminator,
    config: StarGanVcConfig,
}

impl StarGanVc {
    /// Load both networks from a model directory.
    pub fn load(model_dir: &Path, device: Device, dtype: DType) -> Result<Self> {
        info!("loading StarGAN-VC model from {:?}", model_dir);

        let config = StarGanVcConfig::from_file(&model_dir.join("config.json"))?;

        let weights_path = model_dir.join("model.safetensors");
        if !weights_path.exists() {
            return Err(Error::ModelLoadError(format!(
                "missing weights file {:?}",
                weights_path
            )));
        }
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, &device)? };

        Self::from_var_builder(&config, vb)
    }

    /// Build both networks from an already-open `VarBuilder`.
    pub fn from_var_builder(config: &StarGanVcConfig, vb: VarBuilder) -> Result<Self> {
        let generator = Generator::load(config, vb.pp("generator"))?;
        let discriminator = Discriminator::load(config, vb.pp("discriminator"))?;
        Ok(Self {
            generator,
            discriminator,
            config: config.clone(),
        })
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn config(&self) -> &StarGanVcConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stargan_vc::speaker::one_hot;
    use candle_core::Tensor;

    #[test]
    fn generator_and_discriminator_share_config() {
        let config = StarGanVcConfig {
            num_speakers: 2,
            num_mels: 8,
            num_residual_blocks: 1,
            ..Default::default()
        };
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = StarGanVc::from_var_builder(&config, vb).unwrap();
        assert_eq!(model.generator().config().num_speakers, 2);
        assert_eq!(model.discriminator().config().num_mels, 8);
    }

    #[test]
    fn converted_features_are_scorable() {
        let device = Device::Cpu;
        let config = StarGanVcConfig {
            num_speakers: 2,
            num_mels: 8,
            num_residual_blocks: 1,
            ..Default::default()
        };
        let vb = VarBuilder::zeros(DType::F32, &device);
        let model = StarGanVc::from_var_builder(&config, vb).unwrap();

        let x = Tensor::zeros((1, 1, 8, 4), DType::F32, &device).unwrap();
        let src = one_hot(&[0], 2, &device).unwrap();
        let tgt = one_hot(&[1], 2, &device).unwrap();

        let converted = model.generator().forward(&x, &src, &tgt).unwrap();
        let score = model
            .discriminator()
            .forward(&converted, &src, &tgt)
            .unwrap();
        assert_eq!(score.dims(), &[1, 1]);
    }

    #[test]
    fn load_reports_missing_weights() {
        let dir = std::env::temp_dir().join("guqula-stargan-missing-weights");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), "{}").unwrap();
        let err = StarGanVc::load(&dir, Device::Cpu, DType::F32).unwrap_err();
        assert!(matches!(err, Error::ModelLoadError(_)));
    }
}
