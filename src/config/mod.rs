//! Declarative YAML configuration
//!
//! An options file describes a complete run; [`load_options`] parses and
//! validates it into the [`Options`] tree consumed by the builders.

pub mod loader;
pub mod schema;

pub use loader::{load_options, normalize, validate};
pub use schema::{
    CheckpointSection, DatasetOptions, MetricOptions, NetworkOptions, OptimOptions, Options,
    PathOptions, SchedulerOptions, TrainSection, ValSection,
};
