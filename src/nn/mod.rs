//! Neural network building blocks
//!
//! Parameters and named state dicts, together with the small set of
//! tensor operations the bundled architectures are made of. Activations
//! are NCHW `Array4<f32>` batches; parameters are dynamic-dimensional so
//! they can round-trip through checkpoints without shape gymnastics.

pub mod ops;
mod param;

pub use param::Param;

use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Ordered parameter-name to tensor mapping.
///
/// Ordering is deterministic (lexicographic) so checkpoint serialization
/// and key-set diff reports are stable across runs.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;
