//! Network architectures for reflection removal
//!
//! Architectures are registered as a compile-time enum; the options file
//! selects one by its `type` tag. Every network produces a list of stage
//! outputs, and the last stage carries 3 clean channels followed by the
//! reflection channels.

mod dualstream;

pub use dualstream::DualStreamNet;

use crate::config::NetworkOptions;
use crate::error::{Error, Result};
use crate::nn::{Param, StateDict};
use ndarray::Array4;

/// A trainable image-to-image network with staged outputs.
pub trait ReflectionNet {
    /// Run inference. Returns one output per stage; the last stage is the
    /// one consumers split into clean and reflection channels.
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>>;

    /// Like [`forward`](Self::forward) but retains the activations needed
    /// by [`backward`](Self::backward).
    fn forward_train(&mut self, input: &Array4<f32>) -> Result<Vec<Array4<f32>>>;

    /// Accumulate parameter gradients from the gradient of the last stage
    /// output. Requires a preceding [`forward_train`](Self::forward_train).
    fn backward(&mut self, d_last: &Array4<f32>) -> Result<()>;

    /// Mutable references to every parameter, in a stable order
    fn params_mut(&mut self) -> Vec<&mut Param>;

    /// Snapshot of all parameters by name
    fn state_dict(&self) -> StateDict;

    /// Overwrite parameters from a snapshot. Every key must name an
    /// existing parameter with a matching shape.
    fn apply_state(&mut self, state: &StateDict) -> Result<()>;
}

/// Registered architecture tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchKind {
    DualStream,
}

impl ArchKind {
    /// Parse the `type` tag from the network options
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "dualstream" | "dualstreamnet" => Ok(ArchKind::DualStream),
            _ => Err(Error::UnknownArch(tag.to_string())),
        }
    }
}

/// Construct the network named by the options.
///
/// `seed` fixes the weight initialization so runs are reproducible.
pub fn build_network(opts: &NetworkOptions, seed: u64) -> Result<Box<dyn ReflectionNet>> {
    match ArchKind::from_tag(&opts.network_type)? {
        ArchKind::DualStream => Ok(Box::new(DualStreamNet::new(
            opts.num_feat,
            opts.num_refl,
            seed,
        ))),
    }
}
