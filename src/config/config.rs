use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewConfig {
    /// Flat directory holding rendered artifacts and transient downloads
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Cap on contributing sequence lines read from a source
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout: u64,
    /// Seconds allowed for one batch record end to end
    #[serde(default = "default_task_timeout")]
    pub task_timeout: u64,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "gcskew", "gcskew-tools")
}

fn default_output_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().join("plots"))
        .unwrap_or_else(|| PathBuf::from("plots"))
}

fn default_max_lines() -> usize {
    1000
}

fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_download_timeout() -> u64 {
    300
}

fn default_task_timeout() -> u64 {
    600
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_lines: default_max_lines(),
            max_concurrency: default_max_concurrency(),
            download_timeout: default_download_timeout(),
            task_timeout: default_task_timeout(),
        }
    }
}

impl SkewConfig {
    pub fn load() -> Self {
        if let Some(proj_dirs) = project_dirs() {
            let config_path = proj_dirs.config_dir().join("config.toml");

            if config_path.exists() {
                match fs::read_to_string(&config_path) {
                    Ok(content) => match toml::from_str::<SkewConfig>(&content) {
                        Ok(config) => return config.normalized(),
                        Err(e) => log::warn!(
                            "Ignoring malformed config {}: {}",
                            config_path.display(),
                            e
                        ),
                    },
                    Err(e) => log::warn!("Cannot read config {}: {}", config_path.display(), e),
                }
            }
        }
        SkewConfig::default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(proj_dirs) = project_dirs() {
            let config_dir = proj_dirs.config_dir();
            fs::create_dir_all(config_dir)?;

            let config_path = config_dir.join("config.toml");
            let content = toml::to_string_pretty(self)?;
            fs::write(config_path, content)?;
        }
        Ok(())
    }

    /// Zero limits are meaningless, clamp them to 1.
    pub fn normalized(mut self) -> Self {
        self.max_lines = self.max_lines.max(1);
        self.max_concurrency = self.max_concurrency.max(1);
        self.download_timeout = self.download_timeout.max(1);
        self.task_timeout = self.task_timeout.max(1);
        self
    }

    pub fn download_deadline(&self) -> Duration {
        Duration::from_secs(self.download_timeout)
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SkewConfig = toml::from_str("max_lines = 50\noutput_dir = \"/tmp/skew\"").unwrap();
        assert_eq!(config.max_lines, 50);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/skew"));
        assert_eq!(config.download_timeout, 300);
        assert_eq!(config.task_timeout, 600);
        assert!(config.max_concurrency >= 1);
    }

    #[test]
    fn test_normalized_clamps_zero_limits() {
        let config = SkewConfig {
            max_lines: 0,
            max_concurrency: 0,
            ..SkewConfig::default()
        }
        .normalized();
        assert_eq!(config.max_lines, 1);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = SkewConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SkewConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
