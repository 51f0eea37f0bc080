//! Config store for loading and saving rollout.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{RolloutConfig, parser};

pub const CONFIG_FILE_NAME: &str = "rollout.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
    project_root: PathBuf,
}

impl ConfigStore {
    /// Store for `<project_root>/rollout.toml`.
    pub fn for_project(project_root: PathBuf) -> Self {
        Self {
            config_path: project_root.join(CONFIG_FILE_NAME),
            project_root,
        }
    }

    /// Store for an explicit config file; its directory is the project root.
    pub fn from_path(config_path: PathBuf) -> Self {
        let project_root = config_path
            .parent()
            .map(Path::to_path_buf)
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_path,
            project_root,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Load the configuration. A missing file is an error: there is nothing to deploy.
    pub fn load(&self) -> anyhow::Result<RolloutConfig> {
        if !self.config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}",
                self.config_path.display()
            );
        }
        parser::parse_rollout_toml(&self.config_path)
    }

    /// Write `config` as a new file. An existing file is never replaced.
    pub fn create(&self, config: &RolloutConfig) -> anyhow::Result<()> {
        if self.config_path.exists() {
            anyhow::bail!(
                "Config file already exists: {}",
                self.config_path.display()
            );
        }
        self.save(config)
    }

    pub fn save(&self, config: &RolloutConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;
        Ok(())
    }
}
