pub mod cache;
pub mod deadline;
pub(crate) mod progress_bar_builder;
pub mod skew_plotter;

pub use cache::CacheStore;
pub use skew_plotter::{ArtifactRenderer, SkewPlotter};
