mod config;

pub use config::SkewConfig;
