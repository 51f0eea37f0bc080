//! Node actions.
//!
//! [`ActionExecutor`] interprets the [`NodeAction`] bound to each node. Results that later
//! nodes need are written to the [`ArtifactStateStore`]; nothing is passed in memory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::graph::{ExternalStep, NodeAction, NodeExecutor, OperationNode};
use crate::image::DockerCli;
use crate::login::{self, LoginCache};
use crate::process::{CommandSpec, ProcessRunner};
use crate::profile::{
    ValidatedBuild, ValidatedChartPush, ValidatedDeploy, ValidatedLogin, ValidatedPush,
    ValidatedScan,
};
use crate::release::{ReleaseRequest, ReleaseTool};
use crate::state::{ArtifactRef, ArtifactStateStore, StateKey};
use crate::version::VersionDecisionEngine;

pub const GRYPE_IMAGE: &str = "anchore/grype:latest";
/// Directory (relative to the service) that OCI chart packages are written to
pub const CHART_PACKAGE_DIR: &str = "build/buildHelm";

/// Credentials read by the helm-push plugin.
pub const HELM_REPO_USERNAME_ENV: &str = "HELM_REPO_USERNAME";
pub const HELM_REPO_PASSWORD_ENV: &str = "HELM_REPO_PASSWORD";

struct DeployableImage {
    version: String,
    repository: String,
    /// `image.repository` is only overridden for images pulled from a registry
    from_registry: bool,
}

/// Where things live on disk.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    version: String,
    services: BTreeMap<String, PathBuf>,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            version: version.into(),
            services: BTreeMap::new(),
        }
    }

    /// Register `service` as living in `dir`, relative to the project root.
    pub fn with_service(mut self, service: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.services.insert(service.into(), dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Services without a registered directory live at the project root.
    pub fn service_dir(&self, service: &str) -> PathBuf {
        match self.services.get(service) {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        }
    }
}

/// Default [`NodeExecutor`]: docker for images, helm for charts.
pub struct ActionExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    store: &'a ArtifactStateStore,
    layout: ProjectLayout,
    login_cache: LoginCache,
    clock: fn() -> DateTime<Utc>,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        store: &'a ArtifactStateStore,
        layout: ProjectLayout,
    ) -> Self {
        Self {
            runner,
            store,
            layout,
            login_cache: LoginCache::default(),
            clock: Utc::now,
        }
    }

    pub fn with_login_cache(mut self, cache: LoginCache) -> Self {
        self.login_cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    fn login(&self, login: &ValidatedLogin) -> Result<(), ExecutionError> {
        let now = (self.clock)();
        if self
            .login_cache
            .is_cached(self.store, &login.registry_root, now)?
        {
            info!(registry = %login.registry_root, "login still valid, skipping");
            return Ok(());
        }
        login::login(self.runner, login)?;
        self.login_cache
            .record(self.store, &login.registry_root, now)
    }

    fn collect_build_context(&self, service: &str, context_dir: &str) -> Result<(), ExecutionError> {
        let service_dir = self.layout.service_dir(service);
        let target = service_dir.join(context_dir);

        if target.exists() {
            fs::remove_dir_all(&target).map_err(|err| {
                ExecutionError::io(format!("Failed to clear {}", target.display()), err)
            })?;
        }
        fs::create_dir_all(&target).map_err(|err| {
            ExecutionError::io(format!("Failed to create {}", target.display()), err)
        })?;

        let mut copied = 0;
        for source in [service_dir.join("build/libs"), service_dir.join("src/docker")] {
            copied += copy_files(&source, &target)?;
        }
        info!(service, files = copied, dir = %target.display(), "collected build context");
        Ok(())
    }

    fn external(&self, step: &str, spec: &ExternalStep) -> Result<(), ExecutionError> {
        let Some((program, args)) = spec.command.split_first() else {
            return Err(ExecutionError::UnknownStep(step.to_string()));
        };
        let cwd = match &spec.dir {
            Some(dir) => self.layout.root().join(dir),
            None => self.layout.root().to_path_buf(),
        };
        let mut command = CommandSpec::new(program.as_str())
            .args(args.iter().cloned())
            .current_dir(cwd);
        for (key, value) in &spec.env {
            command = command.env(key.as_str(), value.as_str());
        }
        info!(step, "running external step");
        self.runner.run(&command)?;
        Ok(())
    }

    fn build(&self, service: &str, profile: &str, build: &ValidatedBuild) -> Result<(), ExecutionError> {
        let version = match &build.version {
            Some(version) => version.clone(),
            None => format!(
                "{}-{}",
                self.layout.version(),
                (self.clock)().timestamp_millis()
            ),
        };
        let tag = format!("{service}:{version}");
        let context = self.layout.service_dir(service).join(&build.context_dir);

        let mut command = CommandSpec::new("docker").args(["build", ".", "-t", tag.as_str()]);
        if let Some(architecture) = &build.architecture {
            command = command.args(["--platform", architecture.as_str()]);
        }
        self.runner.run(&command.current_dir(&context))?;
        let latest = format!("{service}:latest");
        self.runner
            .run(&CommandSpec::new("docker").args(["tag", tag.as_str(), latest.as_str()]))?;

        let artifact = ArtifactRef::new(service, profile);
        self.store
            .write(&StateKey::BuiltTag(artifact.clone()), &tag)?;
        self.store
            .write(&StateKey::BuiltVersion(artifact.clone()), &version)?;
        self.store
            .write(&StateKey::BuiltRepository(artifact), service)?;
        self.record_latest(service, &version, service)?;
        info!(service, %tag, "built image");
        Ok(())
    }

    fn scan(
        &self,
        service: &str,
        scan: &ValidatedScan,
        build_context_dir: &str,
    ) -> Result<(), ExecutionError> {
        let service_dir = self.layout.service_dir(service);
        let context = service_dir.join(scan.context_dir.as_deref().unwrap_or(build_context_dir));
        let mount = format!("/var/{service}");

        let mut command = CommandSpec::new("docker").args(["run", "--rm", "-v"]).arg(format!(
            "{}:{mount}",
            context.display()
        ));
        if let Some(ignore_file) = &scan.ignore_file {
            let path = self.layout.root().join(ignore_file);
            command = command
                .arg("-v")
                .arg(format!("{}:/.grype.yaml", path.display()));
        }
        command = command
            .arg(GRYPE_IMAGE)
            .arg(format!("dir:{mount}"))
            .args(["--fail-on", scan.fail_on.as_str()]);

        info!(service, fail_on = scan.fail_on.as_str(), "scanning build context");
        self.runner.run(&command)?;
        Ok(())
    }

    fn push(&self, service: &str, profile: &str, push: &ValidatedPush) -> Result<(), ExecutionError> {
        let artifact = ArtifactRef::new(service, profile);
        let built_tag = self.store.require(&StateKey::BuiltTag(artifact.clone()))?;
        let version = self
            .store
            .require(&StateKey::BuiltVersion(artifact.clone()))?;

        let repository = image_repository(&push.registry_root, service);
        let pushed_tag = format!("{repository}:{version}");
        let latest_tag = format!("{repository}:latest");

        for tag in [&pushed_tag, &latest_tag] {
            self.runner.run(
                &CommandSpec::new("docker").args(["tag", built_tag.as_str(), tag.as_str()]),
            )?;
            self.runner
                .run(&CommandSpec::new("docker").args(["push", tag.as_str()]))?;
        }

        self.store
            .write(&StateKey::PushedTag(artifact.clone()), &pushed_tag)?;
        self.store
            .write(&StateKey::PushedRepository(artifact), &repository)?;
        self.record_latest(service, &version, &repository)?;
        info!(service, tag = %pushed_tag, "pushed image");
        Ok(())
    }

    fn deploy(
        &self,
        service: &str,
        profile: &str,
        namespace: &str,
        deploy: &ValidatedDeploy,
        pushed: bool,
    ) -> Result<(), ExecutionError> {
        let image = self.deployable_image(service, profile, pushed)?;
        let local_version = image.version;
        let repository = image.repository;

        let release = ReleaseTool::new(self.runner);
        let remote_version = release.remote_version(service, namespace, deploy);
        info!(
            service,
            namespace,
            current = remote_version.as_deref().unwrap_or("none"),
            "deploying"
        );

        let docker = DockerCli::new(self.runner);
        let engine = VersionDecisionEngine::new(&docker, &docker);
        let local_tag = format!("{repository}:{local_version}");
        let remote_tag = format!(
            "{repository}:{}",
            remote_version.as_deref().unwrap_or_default()
        );
        let version = engine.decide_with_bypass(
            deploy.skip_layer_check,
            &local_tag,
            &remote_tag,
            remote_version.as_deref(),
            &local_version,
        );

        let request = ReleaseRequest {
            release: service,
            namespace,
            version: &version,
            repository: image.from_registry.then_some(repository.as_str()),
            deploy,
        };
        release.upgrade(&self.service_root(service), &request)?;

        self.store.write(
            &StateKey::DeployedAttributes {
                service: service.to_string(),
                namespace: namespace.to_string(),
                profile: profile.to_string(),
            },
            &request.flattened_attributes(),
        )?;
        info!(service, namespace, %version, "deployed");
        Ok(())
    }

    fn chart_push(&self, service: &str, chart_push: &ValidatedChartPush) -> Result<(), ExecutionError> {
        let service_dir = self.service_root(service);
        let chart_dir = service_dir.join(&chart_push.chart_dir);

        if chart_push.repository_url.starts_with("oci://") {
            let package_dir = service_dir.join(CHART_PACKAGE_DIR);
            fs::create_dir_all(&package_dir).map_err(|err| {
                ExecutionError::io(format!("Failed to create {}", package_dir.display()), err)
            })?;
            let mut package = CommandSpec::new("helm")
                .arg("package")
                .arg(chart_dir.display().to_string())
                .arg("-d")
                .arg(package_dir.display().to_string());
            if let Some(version) = &chart_push.version {
                package = package.args(["--version", version.as_str()]);
            }
            let output = self.runner.run(&package.current_dir(&service_dir))?;
            let archive = packaged_chart(&output.stdout).ok_or_else(|| {
                ExecutionError::MissingArtifact {
                    key: format!("packaged chart of {service}"),
                }
            })?;
            debug!(service, %archive, "packaged chart");
            self.runner.run(
                &CommandSpec::new("helm").args([
                    "push",
                    archive.as_str(),
                    chart_push.repository_url.as_str(),
                ]),
            )?;
        } else {
            // credentials go through the environment so they stay out of argv and logs
            let mut command = CommandSpec::new("helmpush")
                .args([".", chart_push.repository_url.as_str()])
                .env(HELM_REPO_USERNAME_ENV, chart_push.username.as_str())
                .env(HELM_REPO_PASSWORD_ENV, chart_push.password.as_str());
            if let Some(version) = &chart_push.version {
                command = command.args(["-v", version.as_str()]);
            }
            self.runner.run(&command.arg("-f").current_dir(&chart_dir))?;
        }
        info!(service, repository = %chart_push.repository_url, "pushed chart");
        Ok(())
    }

    fn record_latest(
        &self,
        service: &str,
        version: &str,
        repository: &str,
    ) -> Result<(), ExecutionError> {
        let service = service.to_string();
        self.store.write(
            &StateKey::LatestVersion {
                service: service.clone(),
            },
            version,
        )?;
        self.store
            .write(&StateKey::LatestRepository { service }, repository)
    }

    /// Image a deploy rolls out.
    ///
    /// A deploy behind a push of its own profile uses that push. Otherwise it takes the
    /// most recent build or push of the service, whichever profile produced it.
    fn deployable_image(
        &self,
        service: &str,
        profile: &str,
        pushed: bool,
    ) -> Result<DeployableImage, ExecutionError> {
        if pushed {
            let artifact = ArtifactRef::new(service, profile);
            return Ok(DeployableImage {
                version: self
                    .store
                    .require(&StateKey::BuiltVersion(artifact.clone()))?,
                repository: self.store.require(&StateKey::PushedRepository(artifact))?,
                from_registry: true,
            });
        }

        let version = self.store.require(&StateKey::LatestVersion {
            service: service.to_string(),
        })?;
        let repository = self
            .store
            .read(&StateKey::LatestRepository {
                service: service.to_string(),
            })?
            .unwrap_or_else(|| service.to_string());
        debug!(service, %version, %repository, "deploying latest image of service");
        Ok(DeployableImage {
            from_registry: repository != service,
            version,
            repository,
        })
    }

    fn service_root(&self, service: &str) -> PathBuf {
        self.layout.service_dir(service)
    }
}

impl NodeExecutor for ActionExecutor<'_> {
    fn execute(&self, node: &OperationNode) -> Result<(), ExecutionError> {
        match node.action() {
            NodeAction::Login(login) => self.login(login),
            NodeAction::CollectBuildContext {
                service,
                context_dir,
            } => self.collect_build_context(service, context_dir),
            NodeAction::External { step, spec } => self.external(step, spec),
            NodeAction::Build {
                service,
                profile,
                build,
            } => self.build(service, profile, build),
            NodeAction::Scan {
                service,
                scan,
                build_context_dir,
            } => self.scan(service, scan, build_context_dir),
            NodeAction::Push {
                service,
                profile,
                push,
            } => self.push(service, profile, push),
            NodeAction::Deploy {
                service,
                profile,
                namespace,
                deploy,
                pushed,
            } => self.deploy(service, profile, namespace, deploy, *pushed),
            NodeAction::ChartPush {
                service,
                chart_push,
            } => self.chart_push(service, chart_push),
            NodeAction::Aggregate => Ok(()),
        }
    }
}

/// `<registry>/<service>`, or just the service for an empty registry root.
pub fn image_repository(registry_root: &str, service: &str) -> String {
    let registry = registry_root.trim_end_matches('/');
    if registry.is_empty() {
        service.to_string()
    } else {
        format!("{registry}/{service}")
    }
}

/// Archive path reported by `helm package`.
fn packaged_chart(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.split_once("saved it to:"))
        .map(|(_, path)| path.trim().to_string())
        .filter(|path| !path.is_empty())
}

/// Copy the regular files directly under `source` into `target`. A missing source is skipped.
fn copy_files(source: &Path, target: &Path) -> Result<usize, ExecutionError> {
    if !source.is_dir() {
        debug!(dir = %source.display(), "build context source missing, skipping");
        return Ok(0);
    }
    let entries = fs::read_dir(source).map_err(|err| {
        ExecutionError::io(format!("Failed to read {}", source.display()), err)
    })?;

    let mut copied = 0;
    for entry in entries {
        let entry = entry.map_err(|err| {
            ExecutionError::io(format!("Failed to read {}", source.display()), err)
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        fs::copy(&path, target.join(entry.file_name())).map_err(|err| {
            ExecutionError::io(format!("Failed to copy {}", path.display()), err)
        })?;
        copied += 1;
    }
    Ok(copied)
}
