//! Native model implementations.

pub mod stargan_vc;

pub use stargan_vc::{Discriminator, Generator, StarGanVc, StarGanVcConfig};
