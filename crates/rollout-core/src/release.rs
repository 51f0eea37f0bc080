//! Chart releases through the helm CLI.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{ExecutionError, RemoteQueryError};
use crate::process::{CommandSpec, ProcessRunner};
use crate::profile::ValidatedDeploy;

/// One `helm upgrade --install` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest<'a> {
    pub release: &'a str,
    pub namespace: &'a str,
    pub version: &'a str,
    pub repository: Option<&'a str>,
    pub deploy: &'a ValidatedDeploy,
}

impl ReleaseRequest<'_> {
    /// `image.version=<v>[,image.repository=<r>],k=v,...`
    pub fn flattened_attributes(&self) -> String {
        flatten_attributes(self.version, self.repository, &self.deploy.attributes)
    }
}

pub fn flatten_attributes(
    version: &str,
    repository: Option<&str>,
    attributes: &BTreeMap<String, String>,
) -> String {
    let mut parts = vec![format!("image.version={version}")];
    if let Some(repository) = repository {
        parts.push(format!("image.repository={repository}"));
    }
    parts.extend(attributes.iter().map(|(key, value)| format!("{key}={value}")));
    parts.join(",")
}

/// Helm-backed release tool.
pub struct ReleaseTool<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> ReleaseTool<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    /// Command for `request`, run inside the chart directory resolved against `base_dir`.
    pub fn upgrade_command(&self, base_dir: &Path, request: &ReleaseRequest<'_>) -> CommandSpec {
        let mut command = CommandSpec::new("helm")
            .args(["upgrade", "--install", request.release, "."])
            .args(["--set".to_string(), request.flattened_attributes()])
            .args(["-n", request.namespace])
            .current_dir(base_dir.join(&request.deploy.chart_dir));
        if let Some(context) = &request.deploy.kube_context {
            command = command.args(["--kube-context", context.as_str()]);
        }
        if let Some(config) = &request.deploy.kube_config {
            command = command.args(["--kubeconfig", config.as_str()]);
        }
        command
    }

    pub fn upgrade(&self, base_dir: &Path, request: &ReleaseRequest<'_>) -> Result<(), ExecutionError> {
        let command = self.upgrade_command(base_dir, request);
        info!(release = request.release, namespace = request.namespace, version = request.version, "releasing chart");
        self.runner.run(&command)?;
        Ok(())
    }

    /// Version label of the currently deployed release.
    pub fn query_remote_version(
        &self,
        release: &str,
        namespace: &str,
        deploy: &ValidatedDeploy,
    ) -> Result<Option<String>, RemoteQueryError> {
        let mut command = CommandSpec::new("helm").args(["get", "values", "-n", namespace, release]);
        if let Some(context) = &deploy.kube_context {
            command = command.args(["--kube-context", context.as_str()]);
        }
        if let Some(config) = &deploy.kube_config {
            command = command.args(["--kubeconfig", config.as_str()]);
        }
        let output = self.runner.run(&command).map_err(|err| RemoteQueryError {
            release: release.to_string(),
            namespace: namespace.to_string(),
            reason: err.to_string(),
        })?;
        Ok(parse_version_label(&output.stdout))
    }

    /// [`query_remote_version`](Self::query_remote_version) with failures reported as no version.
    pub fn remote_version(
        &self,
        release: &str,
        namespace: &str,
        deploy: &ValidatedDeploy,
    ) -> Option<String> {
        match self.query_remote_version(release, namespace, deploy) {
            Ok(version) => version,
            Err(err) => {
                warn!(error = %err, "treating release as not deployed");
                None
            }
        }
    }
}

/// First `version:` line of `helm get values` output.
pub fn parse_version_label(values: &str) -> Option<String> {
    values
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("version:"))
        .map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
