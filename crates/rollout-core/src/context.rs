//! Application context for dependency injection.

use std::path::{Path, PathBuf};

use crate::config::{ConfigStore, RolloutConfig};
use crate::executor::ProjectLayout;
use crate::state::ArtifactStateStore;

/// Paths shared by every command.
///
/// Frontends create this once and derive the stores they need from it.
#[derive(Debug, Clone)]
pub struct AppContext {
    project_root: PathBuf,
    config_path: PathBuf,
    state_root: PathBuf,
}

impl AppContext {
    /// The project root is made absolute so that it can be mounted into containers.
    pub fn new(config_store: &ConfigStore, state_root: PathBuf) -> Self {
        let project_root = config_store.project_root();
        Self {
            project_root: std::fs::canonicalize(project_root)
                .unwrap_or_else(|_| project_root.to_path_buf()),
            config_path: config_store.config_path().to_path_buf(),
            state_root,
        }
    }

    /// Context using the default state directory.
    pub fn with_default_state(config_store: &ConfigStore) -> anyhow::Result<Self> {
        Ok(Self::new(config_store, ArtifactStateStore::default_root()?))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_path(self.config_path.clone())
    }

    /// Artifact store for this project.
    pub fn state_store(&self) -> ArtifactStateStore {
        ArtifactStateStore::open(&self.state_root, &self.project_root)
    }

    /// Disk layout of the services declared in `config`.
    pub fn layout(&self, config: &RolloutConfig) -> ProjectLayout {
        config.services.iter().fold(
            ProjectLayout::new(self.project_root.clone(), config.project.version.clone()),
            |layout, service| match &service.dir {
                Some(dir) => layout.with_service(service.name.clone(), dir),
                None => layout,
            },
        )
    }
}
