//! Checkpoint saving functionality

use crate::error::{Error, Result};
use crate::nn::StateDict;
use chrono::Utc;
use safetensors::tensor::{Dtype, TensorView};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Save parameter groups into a single safetensors checkpoint
///
/// Each tensor is stored under `<group>.<param>` so multiple state dicts
/// (live weights, EMA weights) share one file. The epoch and iteration
/// counters and a timestamp are written as string metadata.
///
/// # Arguments
///
/// * `path` - Output file path; parent directories are created
/// * `groups` - Parameter groups keyed by name, e.g. `params`, `params_ema`
/// * `epoch` - Epochs completed when the checkpoint was taken
/// * `iter` - Optimizer steps completed when the checkpoint was taken
pub fn save_checkpoint(
    path: impl AsRef<Path>,
    groups: &BTreeMap<String, StateDict>,
    epoch: u64,
    iter: u64,
) -> Result<()> {
    let path = path.as_ref();

    let mut tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = Vec::new();
    for (group, state) in groups {
        for (name, tensor) in state {
            let full_name = format!("{group}.{name}");
            let values: Vec<f32> = tensor.iter().copied().collect();
            let bytes: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
            tensor_data.push((full_name, bytes, tensor.shape().to_vec()));
        }
    }

    let views = tensor_data
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| Error::Serialization(format!("tensor {name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("epoch".to_string(), epoch.to_string());
    metadata.insert("iter".to_string(), iter.to_string());
    metadata.insert("saved_at".to_string(), Utc::now().to_rfc3339());

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("checkpoint serialization failed: {e}")))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;
    use tempfile::TempDir;

    fn state_with(name: &str, values: &[f32]) -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            name.to_string(),
            ArrayD::from_shape_vec(ndarray::IxDyn(&[values.len()]), values.to_vec()).unwrap(),
        );
        state
    }

    #[test]
    fn test_save_checkpoint_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("net_g.safetensors");

        let mut groups = BTreeMap::new();
        groups.insert("params".to_string(), state_with("stage0.weight", &[1.0, 2.0]));

        save_checkpoint(&path, &groups, 3, 120).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        let loaded = safetensors::SafeTensors::deserialize(&bytes).unwrap();
        assert_eq!(loaded.names(), vec!["params.stage0.weight"]);
    }

    #[test]
    fn test_save_checkpoint_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/ckpt.safetensors");

        let mut groups = BTreeMap::new();
        groups.insert("params".to_string(), state_with("w", &[0.5]));

        save_checkpoint(&path, &groups, 0, 0).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_checkpoint_multiple_groups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.safetensors");

        let mut groups = BTreeMap::new();
        groups.insert("params".to_string(), state_with("w", &[1.0]));
        groups.insert("params_ema".to_string(), state_with("w", &[0.9]));

        save_checkpoint(&path, &groups, 1, 10).unwrap();

        let bytes = fs::read(&path).unwrap();
        let loaded = safetensors::SafeTensors::deserialize(&bytes).unwrap();
        let mut names = loaded.names();
        names.sort();
        assert_eq!(names, vec!["params.w", "params_ema.w"]);
    }

    #[test]
    fn test_save_checkpoint_invalid_path_errors() {
        let mut groups = BTreeMap::new();
        groups.insert("params".to_string(), state_with("w", &[1.0]));

        let result = save_checkpoint("/proc/invalid/ckpt.safetensors", &groups, 0, 0);
        assert!(result.is_err());
    }
}
