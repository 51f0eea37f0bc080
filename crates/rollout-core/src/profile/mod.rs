//! Deployment profiles
//!
//! A profile is a named bundle of optional blocks, one per operation kind:
//! - `login`: registry authentication
//! - `build` / `scan`: image build and vulnerability scan
//! - `push`: image publication
//! - `deploy`: chart release into one or more namespaces
//! - `chart_push`: chart publication
//!
//! Every field is a [`Setting`] so that "not configured" stays distinguishable from
//! "configured as empty" when default profiles are merged in.

pub mod registry;
pub mod setting;
pub mod validated;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use registry::{BlockInheritance, ProfileRegistry};
pub use setting::Setting;
pub use validated::{
    ValidatedBuild, ValidatedChartPush, ValidatedDeploy, ValidatedLogin, ValidatedProfile,
    ValidatedPush, ValidatedScan,
};

/// Name of the conventional base profile.
pub const DEFAULT_PROFILE: &str = "default";

/// How to authenticate against a container registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// `docker login <host>` with username and password
    #[default]
    Classic,
    /// ECR token from `aws ecr get-login-password`
    Aws,
    /// `docker login` against Docker Hub
    Dockerhub,
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginMethod::Classic => "CLASSIC",
            LoginMethod::Aws => "AWS",
            LoginMethod::Dockerhub => "DOCKERHUB",
        };
        f.write_str(name)
    }
}

/// Vulnerability severity at which a scan fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginBlock {
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub registry_root: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub login_method: Setting<LoginMethod>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub username: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub password: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub aws_profile: Setting<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildBlock {
    /// Name of an external step that prepares the build context
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub prepare_step: Setting<String>,
    /// Fixed image version instead of a generated one
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub version: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub context_dir: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub architecture: Setting<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanBlock {
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub context_dir: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub fail_on: Setting<Severity>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub ignore_file: Setting<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushBlock {
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub registry_root: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub login_method: Setting<LoginMethod>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub username: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub password: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub aws_profile: Setting<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployBlock {
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub chart_dir: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub kube_context: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub kube_config: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub target_namespaces: Setting<Vec<String>>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub skip_layer_check: Setting<bool>,
    /// Extra `--set` values, rendered as `key=value`
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub attributes: Setting<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartPushBlock {
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub chart_dir: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub repository_url: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub username: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub password: Setting<String>,
    #[serde(skip_serializing_if = "Setting::is_unset")]
    pub version: Setting<String>,
}

/// A named, mergeable bundle of deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_push: Option<ChartPushBlock>,
}

impl Profile {
    /// Create a profile without any blocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            login: None,
            build: None,
            scan: None,
            push: None,
            deploy: None,
            chart_push: None,
        }
    }

    pub fn with_login(mut self, block: LoginBlock) -> Self {
        self.login = Some(block);
        self
    }

    pub fn with_build(mut self, block: BuildBlock) -> Self {
        self.build = Some(block);
        self
    }

    pub fn with_scan(mut self, block: ScanBlock) -> Self {
        self.scan = Some(block);
        self
    }

    pub fn with_push(mut self, block: PushBlock) -> Self {
        self.push = Some(block);
        self
    }

    pub fn with_deploy(mut self, block: DeployBlock) -> Self {
        self.deploy = Some(block);
        self
    }

    pub fn with_chart_push(mut self, block: ChartPushBlock) -> Self {
        self.chart_push = Some(block);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_with_blocks() {
        let toml = r#"
name = "staging"

[push]
registry_root = "registry.example.com"
login_method = "aws"

[deploy]
target_namespaces = ["stage"]
attributes = { replicas = "2" }
"#;
        let profile: Profile = toml::from_str(toml).unwrap();

        assert_eq!(profile.name, "staging");
        let push = profile.push.unwrap();
        assert_eq!(push.registry_root.get().unwrap(), "registry.example.com");
        assert_eq!(push.login_method, Setting::Value(LoginMethod::Aws));
        assert!(push.username.is_unset());

        let deploy = profile.deploy.unwrap();
        assert_eq!(deploy.target_namespaces, Setting::Value(vec!["stage".to_string()]));
        assert!(deploy.chart_dir.is_unset());
        assert!(profile.login.is_none());
    }

    #[test]
    fn test_explicit_empty_value_is_set() {
        let toml = r#"
name = "dev"
[login]
registry_root = "r.example.com"
password = ""
"#;
        let profile: Profile = toml::from_str(toml).unwrap();
        let login = profile.login.unwrap();
        assert_eq!(login.password, Setting::Value(String::new()));
        assert!(login.username.is_unset());
    }

    #[test]
    fn test_empty_block_is_present() {
        let profile: Profile = toml::from_str("name = \"x\"\n[build]\n").unwrap();
        assert_eq!(profile.build, Some(BuildBlock::default()));
    }

    #[test]
    fn test_serialize_skips_unset_fields() {
        let profile = Profile::new("a").with_push(PushBlock {
            registry_root: "r".to_string().into(),
            ..Default::default()
        });
        let out = toml::to_string(&profile).unwrap();
        assert!(out.contains("registry_root = \"r\""));
        assert!(!out.contains("username"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::High);
        assert_eq!(Severity::Critical.as_str(), "critical");
    }
}
