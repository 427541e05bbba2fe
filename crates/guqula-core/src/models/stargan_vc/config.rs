//! Configuration parsing for StarGAN-VC models.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Conditioning block used inside the generator bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conditioning {
    /// Adaptive instance normalization (default).
    Adain,
    /// Conditional instance normalization.
    Cin,
}

impl Default for Conditioning {
    fn default() -> Self {
        Conditioning::Adain
    }
}

/// StarGAN-VC model configuration.
///
/// The channel widths of the networks are fixed by the architecture; the
/// config controls the speaker count, the mel resolution and the bottleneck
/// depth.
#[derive(Debug, Clone, Deserialize)]
pub struct StarGanVcConfig {
    /// Number of speakers/styles the condition vectors index into.
    #[serde(default = "default_num_speakers")]
    pub num_speakers: usize,

    /// Mel-cepstral bins per frame of the input feature map.
    #[serde(default = "default_num_mels")]
    pub num_mels: usize,

    /// Number of conditioned residual blocks in the bottleneck.
    #[serde(default = "default_num_residual_blocks")]
    pub num_residual_blocks: usize,

    #[serde(default)]
    pub conditioning: Conditioning,
}

fn default_num_speakers() -> usize {
    4
}

fn default_num_mels() -> usize {
    36
}

fn default_num_residual_blocks() -> usize {
    9
}

impl Default for StarGanVcConfig {
    fn default() -> Self {
        Self {
            num_speakers: default_num_speakers(),
            num_mels: default_num_mels(),
            num_residual_blocks: default_num_residual_blocks(),
            conditioning: Conditioning::default(),
        }
    }
}

impl StarGanVcConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Width of the concatenated source+target condition vector.
    pub fn condition_dim(&self) -> usize {
        self.num_speakers * 2
    }

    /// Channel count of the flattened bottleneck input. Both down-sampling
    /// stages halve the mel axis, leaving 256 channels x num_mels/4 rows.
    pub fn bottleneck_width(&self) -> usize {
        256 * (self.num_mels / 4)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_speakers == 0 {
            return Err(Error::ConfigError("num_speakers must be nonzero".into()));
        }
        if self.num_mels == 0 || self.num_mels % 4 != 0 {
            return Err(Error::ConfigError(format!(
                "num_mels must be a nonzero multiple of 4, got {}",
                self.num_mels
            )));
        }
        if self.num_residual_blocks == 0 {
            return Err(Error::ConfigError(
                "num_residual_blocks must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
