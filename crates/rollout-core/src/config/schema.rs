//! rollout.toml schema

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::{ExternalStep, GraphContext};
use crate::login::{DEFAULT_LOGIN_VALIDITY_HOURS, LoginCache, MAX_LOGIN_VALIDITY_HOURS};
use crate::profile::validated::{DEFAULT_BUILD_CONTEXT_DIR, DEFAULT_CHART_DIR};
use crate::profile::{BlockInheritance, BuildBlock, DEFAULT_PROFILE, DeployBlock, Profile};
use crate::state::is_plain_segment;

/// Root of a `rollout.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub settings: Settings,

    /// Default profiles, applied in declaration order
    #[serde(default, rename = "default", skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<Profile>,

    /// Override profiles
    #[serde(default, rename = "profile", skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<Profile>,

    #[serde(default, rename = "service", skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, ExternalStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Base of generated image versions
    #[serde(default = "default_project_version")]
    pub version: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            version: default_project_version(),
        }
    }
}

fn default_project_version() -> String {
    "0.0.0".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub inherit: BlockInheritance,

    #[serde(default = "default_login_validity_hours")]
    pub login_validity_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inherit: BlockInheritance::default(),
            login_validity_hours: DEFAULT_LOGIN_VALIDITY_HOURS,
        }
    }
}

fn default_login_validity_hours() -> i64 {
    DEFAULT_LOGIN_VALIDITY_HOURS
}

/// A deployable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    /// Directory relative to the project root; the root itself when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl RolloutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting point for a new project: the default profile builds `service` and
    /// deploys it to the `default` namespace.
    pub fn starter(service: impl Into<String>) -> Self {
        let mut config = Self::new();
        config.profiles.push(
            Profile::new(DEFAULT_PROFILE)
                .with_build(BuildBlock {
                    context_dir: DEFAULT_BUILD_CONTEXT_DIR.to_string().into(),
                    ..Default::default()
                })
                .with_deploy(DeployBlock {
                    chart_dir: DEFAULT_CHART_DIR.to_string().into(),
                    target_namespaces: vec!["default".to_string()].into(),
                    ..Default::default()
                }),
        );
        config.services.push(ServiceEntry {
            name: service.into(),
            dir: None,
        });
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::Parse("service name must not be empty".to_string()));
            }
            if !is_plain_segment(&service.name) {
                return Err(ConfigError::Parse(format!(
                    "service name '{}' must be a plain name without path separators",
                    service.name
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Parse(format!(
                    "service '{}' is declared more than once",
                    service.name
                )));
            }
        }

        for (name, step) in &self.steps {
            if step.command.is_empty() {
                return Err(ConfigError::Parse(format!(
                    "step '{name}' has an empty command"
                )));
            }
        }

        if !(1..=MAX_LOGIN_VALIDITY_HOURS).contains(&self.settings.login_validity_hours) {
            return Err(ConfigError::Parse(format!(
                "settings.login_validity_hours must be between 1 and {MAX_LOGIN_VALIDITY_HOURS}"
            )));
        }

        for profile in self.defaults.iter().chain(&self.profiles) {
            if !is_plain_segment(&profile.name) {
                return Err(ConfigError::Parse(format!(
                    "profile name '{}' must be a plain name without path separators",
                    profile.name
                )));
            }
            let namespaces = profile
                .deploy
                .as_ref()
                .and_then(|deploy| deploy.target_namespaces.get());
            for namespace in namespaces.into_iter().flatten() {
                if !is_plain_segment(namespace) {
                    return Err(ConfigError::Parse(format!(
                        "namespace '{namespace}' of profile '{}' is not a plain name",
                        profile.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn graph_context(&self) -> GraphContext {
        GraphContext::with_steps(self.steps.clone())
    }

    pub fn login_cache(&self) -> LoginCache {
        Duration::try_hours(self.settings.login_validity_hours)
            .map(LoginCache::new)
            .unwrap_or_default()
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.name.as_str())
    }
}
