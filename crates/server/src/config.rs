use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scholarly_common::AppConfig;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/scholarly.yaml";

/// Resolved configuration with the path it was read from, if any.
pub struct LoadedConfig {
    pub config: AppConfig,
    pub config_path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Load `explicit` if given, otherwise the default path when it exists,
    /// otherwise built-in defaults. Environment overrides apply in every case.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let path = match explicit {
            Some(path) => PathBuf::from(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => PathBuf::from(DEFAULT_CONFIG_PATH),
            None => {
                warn!(path = DEFAULT_CONFIG_PATH, "no configuration file, using defaults");
                let mut config = AppConfig::default();
                config.apply_env_overrides(|key| std::env::var(key).ok())?;
                config.validate()?;
                return Ok(Self {
                    config,
                    config_path: None,
                });
            }
        };

        info!(path = %path.display(), "loading configuration");
        let config = AppConfig::load(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        Ok(Self {
            config,
            config_path: Some(path),
        })
    }
}
