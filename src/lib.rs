//! # Despejar: Single-Image Reflection Removal Training Framework
//!
//! Despejar trains and evaluates networks that split a photograph taken
//! through glass into a clean transmission image and a reflection image.
//!
//! ## Architecture
//!
//! - **data**: Datasets, phase-aware dataloaders, background prefetching
//! - **nn**: Parameters, state dicts, convolution ops with backward passes
//! - **archs**: Reflection-removal network architectures
//! - **model**: Base training module (weight loading, validation, EMA)
//! - **optim**: Optimizers (Adam, AdamW, Adamax, SGD, ASGD, RMSprop, Rprop)
//!   and learning-rate schedulers
//! - **metrics**: Image quality metrics (PSNR, SSIM)
//! - **io**: Checkpoint saving and loading (safetensors format)
//! - **config**: Declarative YAML configuration
//! - **train**: High-level training loop
//! - **report**: Rank-aware logging and scalar series

pub mod archs;
pub mod cli;
pub mod config;
pub mod data;
pub mod imgproc;
pub mod io;
pub mod metrics;
pub mod model;
pub mod nn;
pub mod optim;
pub mod report;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};
pub use nn::{Param, StateDict};
