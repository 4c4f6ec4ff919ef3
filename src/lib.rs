pub mod api;
pub mod batch;
pub mod cli;
pub mod commands;
pub mod config;
pub mod sequence;
pub mod skew;
pub mod types;
pub mod utils;

// Re-export main API
pub use api::*;
