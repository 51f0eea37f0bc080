//! Validated profiles
//!
//! Materializes a merged [`Profile`] into a snapshot where every field an operation needs
//! is present. Validation is pure: no I/O and no dependency on other profiles.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    BuildBlock, ChartPushBlock, DEFAULT_PROFILE, DeployBlock, LoginBlock, LoginMethod, Profile,
    PushBlock, ScanBlock, Setting, Severity,
};
use crate::error::ConfigError;
use crate::graph::naming::capitalize;

pub const DEFAULT_CHART_DIR: &str = "src/helm";
pub const DEFAULT_BUILD_CONTEXT_DIR: &str = "build/buildDocker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedLogin {
    pub registry_root: String,
    pub login_method: LoginMethod,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub aws_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedBuild {
    pub prepare_step: Option<String>,
    pub version: Option<String>,
    pub context_dir: String,
    pub architecture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedScan {
    /// Falls back to the build context directory when unset
    pub context_dir: Option<String>,
    pub fail_on: Severity,
    pub ignore_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedPush {
    pub registry_root: String,
    pub login_method: LoginMethod,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub aws_profile: Option<String>,
}

impl ValidatedPush {
    /// Login settings implied by the push target.
    pub fn login(&self) -> ValidatedLogin {
        ValidatedLogin {
            registry_root: self.registry_root.clone(),
            login_method: self.login_method,
            username: self.username.clone(),
            password: self.password.clone(),
            aws_profile: self.aws_profile.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedDeploy {
    pub chart_dir: String,
    pub kube_context: Option<String>,
    pub kube_config: Option<String>,
    pub target_namespaces: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub skip_layer_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedChartPush {
    pub chart_dir: String,
    pub repository_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub version: Option<String>,
}

/// Immutable, fully defaulted profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedProfile {
    name: String,
    login: Option<ValidatedLogin>,
    build: Option<ValidatedBuild>,
    scan: Option<ValidatedScan>,
    push: Option<ValidatedPush>,
    deploy: Option<ValidatedDeploy>,
    chart_push: Option<ValidatedChartPush>,
}

impl ValidatedProfile {
    /// Validate every block present in `profile`.
    pub fn validate(profile: &Profile) -> Result<Self, ConfigError> {
        let name = profile.name.as_str();
        Ok(Self {
            name: profile.name.clone(),
            login: profile
                .login
                .as_ref()
                .map(|block| validate_login(name, block))
                .transpose()?,
            build: profile.build.as_ref().map(validate_build),
            scan: profile.scan.as_ref().map(validate_scan),
            push: profile
                .push
                .as_ref()
                .map(|block| validate_push(name, block))
                .transpose()?,
            deploy: profile.deploy.as_ref().map(validate_deploy),
            chart_push: profile
                .chart_push
                .as_ref()
                .map(|block| validate_chart_push(name, block))
                .transpose()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Suffix used in node names: empty for the default profile, else the capitalized name.
    pub fn task_suffix(&self) -> String {
        if self.name == DEFAULT_PROFILE {
            String::new()
        } else {
            capitalize(&self.name)
        }
    }

    pub fn login(&self) -> Option<&ValidatedLogin> {
        self.login.as_ref()
    }

    pub fn build(&self) -> Option<&ValidatedBuild> {
        self.build.as_ref()
    }

    pub fn scan(&self) -> Option<&ValidatedScan> {
        self.scan.as_ref()
    }

    pub fn push(&self) -> Option<&ValidatedPush> {
        self.push.as_ref()
    }

    pub fn deploy(&self) -> Option<&ValidatedDeploy> {
        self.deploy.as_ref()
    }

    pub fn chart_push(&self) -> Option<&ValidatedChartPush> {
        self.chart_push.as_ref()
    }
}

impl TryFrom<&Profile> for ValidatedProfile {
    type Error = ConfigError;

    fn try_from(profile: &Profile) -> Result<Self, Self::Error> {
        Self::validate(profile)
    }
}

fn required(profile: &str, field: &str, value: &Setting<String>) -> Result<String, ConfigError> {
    value
        .get()
        .cloned()
        .ok_or_else(|| ConfigError::MissingRequiredField {
            profile: profile.to_string(),
            field: field.to_string(),
        })
}

fn validate_login(profile: &str, block: &LoginBlock) -> Result<ValidatedLogin, ConfigError> {
    Ok(ValidatedLogin {
        registry_root: required(profile, "login.registry_root", &block.registry_root)?,
        login_method: block.login_method.clone().unwrap_or_default(),
        username: block.username.clone().unwrap_or_default(),
        password: block.password.clone().unwrap_or_default(),
        aws_profile: block.aws_profile.clone().into_option(),
    })
}

fn validate_build(block: &BuildBlock) -> ValidatedBuild {
    ValidatedBuild {
        prepare_step: block.prepare_step.clone().into_option(),
        version: block.version.clone().into_option(),
        context_dir: block
            .context_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_BUILD_CONTEXT_DIR.to_string()),
        architecture: block.architecture.clone().into_option(),
    }
}

fn validate_scan(block: &ScanBlock) -> ValidatedScan {
    ValidatedScan {
        context_dir: block.context_dir.clone().into_option(),
        fail_on: block.fail_on.clone().unwrap_or(Severity::High),
        ignore_file: block.ignore_file.clone().into_option(),
    }
}

fn validate_push(profile: &str, block: &PushBlock) -> Result<ValidatedPush, ConfigError> {
    Ok(ValidatedPush {
        registry_root: required(profile, "push.registry_root", &block.registry_root)?,
        login_method: block.login_method.clone().unwrap_or_default(),
        username: block.username.clone().unwrap_or_default(),
        password: block.password.clone().unwrap_or_default(),
        aws_profile: block.aws_profile.clone().into_option(),
    })
}

fn validate_deploy(block: &DeployBlock) -> ValidatedDeploy {
    ValidatedDeploy {
        chart_dir: block
            .chart_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_CHART_DIR.to_string()),
        kube_context: block.kube_context.clone().into_option(),
        kube_config: block.kube_config.clone().into_option(),
        target_namespaces: block.target_namespaces.clone().unwrap_or_default(),
        attributes: block.attributes.clone().unwrap_or_default(),
        skip_layer_check: block.skip_layer_check.clone().unwrap_or(false),
    }
}

fn validate_chart_push(
    profile: &str,
    block: &ChartPushBlock,
) -> Result<ValidatedChartPush, ConfigError> {
    Ok(ValidatedChartPush {
        chart_dir: block
            .chart_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_CHART_DIR.to_string()),
        repository_url: required(profile, "chart_push.repository_url", &block.repository_url)?,
        username: block.username.clone().unwrap_or_default(),
        password: block.password.clone().unwrap_or_default(),
        version: block.version.clone().into_option(),
    })
}
