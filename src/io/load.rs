//! Checkpoint loading functionality

use crate::error::{Error, Result};
use crate::nn::StateDict;
use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A loaded checkpoint: the flat tensor map plus its string metadata
///
/// Group views are carved out of the flat map by name prefix. A tensor
/// stored as `params.stage0.weight` belongs to the `params` group under
/// the key `stage0.weight`, and to the flat view under its full name.
#[derive(Debug)]
pub struct Checkpoint {
    tensors: StateDict,
    metadata: HashMap<String, String>,
}

impl Checkpoint {
    /// The whole checkpoint as one state dict with full tensor names
    pub fn tensors(&self) -> &StateDict {
        &self.tensors
    }

    /// True if any tensor belongs to the named group
    pub fn has_group(&self, key: &str) -> bool {
        let prefix = format!("{key}.");
        self.tensors.keys().any(|name| name.starts_with(&prefix))
    }

    /// Extract the named group with the group prefix stripped
    pub fn group(&self, key: &str) -> Option<StateDict> {
        let prefix = format!("{key}.");
        let mut out = StateDict::new();
        for (name, tensor) in &self.tensors {
            if let Some(stripped) = name.strip_prefix(&prefix) {
                out.insert(stripped.to_string(), tensor.clone());
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Raw string metadata stored with the checkpoint
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Epochs completed when the checkpoint was taken
    pub fn epoch(&self) -> Option<u64> {
        self.metadata.get("epoch").and_then(|v| v.parse().ok())
    }

    /// Optimizer steps completed when the checkpoint was taken
    pub fn iter(&self) -> Option<u64> {
        self.metadata.get("iter").and_then(|v| v.parse().ok())
    }
}

/// Load a safetensors checkpoint from disk
///
/// Only F32 tensors are accepted. Filesystem failures surface as I/O
/// errors; malformed files surface as checkpoint errors naming the path.
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let data = fs::read(path)?;

    let (_, header) = SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Checkpoint(format!("{}: {e}", path.display())))?;
    let metadata = header.metadata().clone().unwrap_or_default();

    let parsed = SafeTensors::deserialize(&data)
        .map_err(|e| Error::Checkpoint(format!("{}: {e}", path.display())))?;

    let mut tensors = StateDict::new();
    for (name, view) in parsed.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(Error::Checkpoint(format!(
                "tensor {name} has unsupported dtype {:?}",
                view.dtype()
            )));
        }

        // Byte-wise decode keeps the read independent of buffer alignment
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let tensor = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
            .map_err(|e| Error::Checkpoint(format!("tensor {name}: {e}")))?;
        tensors.insert(name, tensor);
    }

    Ok(Checkpoint { tensors, metadata })
}
