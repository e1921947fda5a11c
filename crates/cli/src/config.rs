//! `drill.toml` loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use drill_curriculum::CurriculumConfig;
use drill_progress::ProgressionPolicy;
use drill_training::TrainingConfig;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "drill.toml";
pub const DEFAULT_DATA_DIR: &str = ".drill";

/// Store behind the data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per record
    #[default]
    Json,
    /// `drill.db` inside the data directory; needs the `sqlite` feature
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub curriculum: CurriculumConfig,
    pub policy: ProgressionPolicy,
    pub training: TrainingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            backend: Backend::default(),
            curriculum: CurriculumConfig::default(),
            policy: ProgressionPolicy::default(),
            training: TrainingConfig::default(),
        }
    }
}

/// Load the configuration.
///
/// An explicit path must exist. Without one, `drill.toml` in the working
/// directory is read if present and defaults are used otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None if Path::new(CONFIG_FILE).exists() => PathBuf::from(CONFIG_FILE),
        None => return Ok(Config::default()),
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config in {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    config.policy.validate()?;
    Ok(config)
}
