//! Guqula Core - StarGAN-VC voice conversion networks
//!
//! This crate provides candle-based implementations of the StarGAN-VC
//! generator and discriminator: gated convolutional networks over
//! mel-cepstral feature maps, conditioned on one-hot speaker vectors.
//!
//! # Example
//!
//! ```ignore
//! use guqula_core::models::stargan_vc::{StarGanVc, speaker};
//!
//! let model = StarGanVc::load(model_dir, device.clone(), DType::F32)?;
//! let src = speaker::one_hot(&[0], 4, &device)?;
//! let tgt = speaker::one_hot(&[2], 4, &device)?;
//! let converted = model.generator().forward(&features, &src, &tgt)?;
//! ```

pub mod device;
pub mod error;
pub mod models;

pub use device::{select_device, DeviceKind};
pub use error::{Error, Result};
pub use models::stargan_vc::{Discriminator, Generator, StarGanVc, StarGanVcConfig};
