//! Checkpoint persistence
//!
//! Checkpoints are single safetensors files. Parameter groups share the
//! file through `<group>.<param>` tensor names, and training progress
//! rides in the string metadata header.

mod load;
mod save;

pub use load::{load_checkpoint, Checkpoint};
pub use save::save_checkpoint;
