//! Graph construction for one (profile, service) pair at a time.
//!
//! Repeated calls share one [`OperationGraph`], so login nodes, namespace aggregates and
//! anything else with the same derived name are reused instead of redefined.

use std::collections::BTreeMap;

use tracing::debug;

use super::{ExternalStep, NodeAction, NodeKind, NodeName, OperationGraph, naming};
use crate::error::ConfigError;
use crate::profile::{ValidatedBuild, ValidatedDeploy, ValidatedProfile};

/// Inputs the builder needs besides the profile itself.
#[derive(Debug, Clone, Default)]
pub struct GraphContext {
    steps: BTreeMap<String, ExternalStep>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: BTreeMap<String, ExternalStep>) -> Self {
        Self { steps }
    }

    pub fn step(&self, name: &str) -> Option<&ExternalStep> {
        self.steps.get(name)
    }
}

#[derive(Debug)]
pub struct TaskGraphBuilder {
    context: GraphContext,
    graph: OperationGraph,
}

impl TaskGraphBuilder {
    pub fn new(context: GraphContext) -> Self {
        Self {
            context,
            graph: OperationGraph::new(),
        }
    }

    pub fn graph(&self) -> &OperationGraph {
        &self.graph
    }

    pub fn finish(self) -> OperationGraph {
        self.graph
    }

    /// Register the nodes of `profile` for `service`.
    ///
    /// Returns the terminal nodes: one deploy node per namespace, then the push node and
    /// the chart push node when present. A blank `service` only registers the login node.
    pub fn build(
        &mut self,
        profile: &ValidatedProfile,
        service: &str,
    ) -> Result<Vec<NodeName>, ConfigError> {
        let suffix = profile.task_suffix();

        if let Some(login) = profile.login() {
            let name = naming::login(&suffix);
            self.graph
                .get_or_create(&name, NodeKind::Login, || NodeAction::Login(login.clone()))?;
        }

        if service.trim().is_empty() {
            debug!(profile = profile.name(), "no service, registering login only");
            return Ok(Vec::new());
        }

        let build_node = match profile.build() {
            Some(build) => Some(self.register_build(profile, build, service, &suffix)?),
            None => None,
        };

        let scan_node = match profile.scan() {
            Some(scan) => {
                let (build_node, build) = match (&build_node, profile.build()) {
                    (Some(node), Some(build)) => (node, build),
                    _ => return Err(missing_dependency(profile, "scan needs a build first")),
                };
                let name = naming::scan(&suffix, service);
                self.graph.register(
                    &name,
                    NodeKind::Scan,
                    NodeAction::Scan {
                        service: service.to_string(),
                        scan: scan.clone(),
                        build_context_dir: build.context_dir.clone(),
                    },
                    [build_node.clone()],
                )?;
                Some(name)
            }
            None => None,
        };

        let push_node = match profile.push() {
            Some(push) => {
                let Some(build_node) = &build_node else {
                    return Err(missing_dependency(profile, "push needs a build first"));
                };
                let login_node = naming::login(&suffix);
                self.graph
                    .get_or_create(&login_node, NodeKind::Login, || {
                        NodeAction::Login(push.login())
                    })?;

                let name = naming::push(&suffix, service);
                let mut predecessors = vec![build_node.clone(), login_node];
                predecessors.extend(scan_node.clone());
                self.graph.register(
                    &name,
                    NodeKind::Push,
                    NodeAction::Push {
                        service: service.to_string(),
                        profile: profile.name().to_string(),
                        push: push.clone(),
                    },
                    predecessors,
                )?;
                Some(name)
            }
            None => None,
        };

        let mut terminals = match profile.deploy() {
            Some(deploy) => {
                self.register_deploys(profile, deploy, service, &suffix, push_node.as_deref())?
            }
            None => Vec::new(),
        };
        terminals.extend(push_node);

        if let Some(chart_push) = profile.chart_push() {
            let name = naming::chart_push(&suffix, service);
            self.graph.register(
                &name,
                NodeKind::ChartPush,
                NodeAction::ChartPush {
                    service: service.to_string(),
                    chart_push: chart_push.clone(),
                },
                Vec::<NodeName>::new(),
            )?;
            terminals.push(name);
        }

        Ok(terminals)
    }

    fn register_build(
        &mut self,
        profile: &ValidatedProfile,
        build: &ValidatedBuild,
        service: &str,
        suffix: &str,
    ) -> Result<NodeName, ConfigError> {
        let prepare_node = match &build.prepare_step {
            Some(step) => {
                let spec = self.context.step(step).cloned().ok_or_else(|| {
                    missing_dependency(
                        profile,
                        &format!("prepare step '{step}' is not declared"),
                    )
                })?;
                self.graph.get_or_create(step, NodeKind::ExternalStep, || {
                    NodeAction::External {
                        step: step.clone(),
                        spec,
                    }
                })?;
                step.clone()
            }
            None => {
                let name = naming::prepare(suffix, service);
                self.graph.get_or_create(&name, NodeKind::Prepare, || {
                    NodeAction::CollectBuildContext {
                        service: service.to_string(),
                        context_dir: build.context_dir.clone(),
                    }
                })?;
                name
            }
        };

        let name = naming::build(suffix, service);
        self.graph.register(
            &name,
            NodeKind::Build,
            NodeAction::Build {
                service: service.to_string(),
                profile: profile.name().to_string(),
                build: build.clone(),
            },
            [prepare_node],
        )?;
        Ok(name)
    }

    fn register_deploys(
        &mut self,
        profile: &ValidatedProfile,
        deploy: &ValidatedDeploy,
        service: &str,
        suffix: &str,
        push_node: Option<&str>,
    ) -> Result<Vec<NodeName>, ConfigError> {
        let mut deploy_nodes = Vec::with_capacity(deploy.target_namespaces.len());

        for namespace in &deploy.target_namespaces {
            let name = naming::deploy(suffix, service, namespace);
            self.graph.register(
                &name,
                NodeKind::Deploy,
                NodeAction::Deploy {
                    service: service.to_string(),
                    profile: profile.name().to_string(),
                    namespace: namespace.clone(),
                    deploy: deploy.clone(),
                    pushed: push_node.is_some(),
                },
                push_node.map(str::to_string),
            )?;

            self.graph
                .get_or_create(&naming::namespace_deploy(namespace), NodeKind::NamespaceDeploy, || {
                    NodeAction::Aggregate
                })?
                .depends_on(name.clone());

            deploy_nodes.push(name);
        }

        self.graph.register(
            &naming::profile_deploy(suffix, service),
            NodeKind::ProfileDeploy,
            NodeAction::Aggregate,
            deploy_nodes.clone(),
        )?;

        Ok(deploy_nodes)
    }
}

fn missing_dependency(profile: &ValidatedProfile, reason: &str) -> ConfigError {
    ConfigError::MissingDependency {
        profile: profile.name().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{
        BuildBlock, ChartPushBlock, DeployBlock, LoginBlock, Profile, PushBlock, ScanBlock,
    };

    fn validated(profile: Profile) -> ValidatedProfile {
        ValidatedProfile::validate(&profile).unwrap()
    }

    fn push_block() -> PushBlock {
        PushBlock {
            registry_root: "registry.example.com".to_string().into(),
            ..Default::default()
        }
    }

    fn deploy_block(namespaces: &[&str]) -> DeployBlock {
        DeployBlock {
            target_namespaces: namespaces
                .iter()
                .map(|ns| ns.to_string())
                .collect::<Vec<_>>()
                .into(),
            ..Default::default()
        }
    }

    fn predecessors(graph: &OperationGraph, name: &str) -> Vec<String> {
        graph
            .get(name)
            .unwrap_or_else(|| panic!("missing node {name}"))
            .predecessors()
            .iter()
            .cloned()
            .collect()
    }

    #[test]
    fn test_full_profile_wiring() {
        let profile = validated(
            Profile::new("staging")
                .with_build(BuildBlock::default())
                .with_push(push_block())
                .with_deploy(deploy_block(&["stage"])),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        let terminals = builder.build(&profile, "api").unwrap();
        let graph = builder.finish();

        assert_eq!(terminals, vec!["deployStagingApiStage", "pushStagingApi"]);
        assert_eq!(predecessors(&graph, "buildStagingApi"), vec!["prepareStagingApi"]);
        assert_eq!(
            predecessors(&graph, "pushStagingApi"),
            vec!["buildStagingApi", "loginStaging"]
        );
        assert_eq!(predecessors(&graph, "deployStagingApiStage"), vec!["pushStagingApi"]);
        assert_eq!(predecessors(&graph, "deployStage"), vec!["deployStagingApiStage"]);
        assert_eq!(predecessors(&graph, "deployStagingApi"), vec!["deployStagingApiStage"]);
        assert_eq!(graph.get("loginStaging").unwrap().kind(), NodeKind::Login);
    }

    #[test]
    fn test_push_without_build_fails() {
        let profile = validated(Profile::new("prod").with_push(push_block()));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        let err = builder.build(&profile, "api").unwrap_err();

        assert_eq!(
            err,
            ConfigError::MissingDependency {
                profile: "prod".to_string(),
                reason: "push needs a build first".to_string(),
            }
        );
    }

    #[test]
    fn test_scan_without_build_fails() {
        let profile = validated(Profile::new("prod").with_scan(ScanBlock::default()));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        assert!(matches!(
            builder.build(&profile, "api"),
            Err(ConfigError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_blank_service_registers_login_only() {
        let profile = validated(
            Profile::new("default")
                .with_login(LoginBlock {
                    registry_root: "r".to_string().into(),
                    ..Default::default()
                })
                .with_build(BuildBlock::default()),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        let terminals = builder.build(&profile, "  ").unwrap();
        let graph = builder.finish();

        assert!(terminals.is_empty());
        assert_eq!(graph.len(), 1);
        assert!(graph.contains("login"));
    }

    #[test]
    fn test_deploy_without_push_has_no_predecessor() {
        let profile = validated(Profile::new("default").with_deploy(deploy_block(&["prod"])));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        builder.build(&profile, "api").unwrap();
        let graph = builder.finish();

        assert!(predecessors(&graph, "deployApiProd").is_empty());
        match graph.get("deployApiProd").unwrap().action() {
            NodeAction::Deploy { pushed, .. } => assert!(!pushed),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_scan_precedes_push() {
        let profile = validated(
            Profile::new("default")
                .with_build(BuildBlock::default())
                .with_scan(ScanBlock::default())
                .with_push(push_block()),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        builder.build(&profile, "api").unwrap();
        let graph = builder.finish();

        assert_eq!(predecessors(&graph, "scanApi"), vec!["buildApi"]);
        assert_eq!(predecessors(&graph, "pushApi"), vec!["buildApi", "login", "scanApi"]);
    }

    #[test]
    fn test_explicit_prepare_step_is_reused_verbatim() {
        let mut steps = BTreeMap::new();
        steps.insert(
            "bootJar".to_string(),
            ExternalStep {
                command: vec!["./gradlew".to_string(), "bootJar".to_string()],
                dir: None,
                env: BTreeMap::new(),
            },
        );
        let profile = validated(Profile::new("default").with_build(BuildBlock {
            prepare_step: "bootJar".to_string().into(),
            ..Default::default()
        }));
        let mut builder = TaskGraphBuilder::new(GraphContext::with_steps(steps));
        builder.build(&profile, "api").unwrap();
        let graph = builder.finish();

        assert_eq!(predecessors(&graph, "buildApi"), vec!["bootJar"]);
        assert_eq!(graph.get("bootJar").unwrap().kind(), NodeKind::ExternalStep);
        assert!(!graph.contains("prepareApi"));
    }

    #[test]
    fn test_undeclared_prepare_step_fails() {
        let profile = validated(Profile::new("default").with_build(BuildBlock {
            prepare_step: "bootJar".to_string().into(),
            ..Default::default()
        }));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        assert!(matches!(
            builder.build(&profile, "api"),
            Err(ConfigError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_chart_push_is_independent() {
        let profile = validated(
            Profile::new("default")
                .with_build(BuildBlock::default())
                .with_chart_push(ChartPushBlock {
                    repository_url: "https://charts.example.com".to_string().into(),
                    ..Default::default()
                }),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        let terminals = builder.build(&profile, "api").unwrap();
        let graph = builder.finish();

        assert_eq!(terminals, vec!["chartPushApi"]);
        assert!(predecessors(&graph, "chartPushApi").is_empty());
    }

    #[test]
    fn test_build_twice_is_idempotent() {
        let profile = validated(
            Profile::new("staging")
                .with_login(LoginBlock {
                    registry_root: "r".to_string().into(),
                    ..Default::default()
                })
                .with_build(BuildBlock::default())
                .with_push(push_block())
                .with_deploy(deploy_block(&["a", "b"])),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        let first_terminals = builder.build(&profile, "api").unwrap();
        let first = builder.graph().clone();
        let second_terminals = builder.build(&profile, "api").unwrap();
        let second = builder.finish();

        assert_eq!(first_terminals, second_terminals);
        assert_eq!(first.len(), second.len());
        for node in first.nodes() {
            assert_eq!(
                node.predecessors(),
                second.get(node.name()).unwrap().predecessors()
            );
        }
    }

    #[test]
    fn test_profiles_share_namespace_aggregate() {
        let a = validated(Profile::new("a").with_deploy(deploy_block(&["prod"])));
        let b = validated(Profile::new("b").with_deploy(deploy_block(&["prod"])));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        builder.build(&a, "api").unwrap();
        builder.build(&b, "api").unwrap();
        let graph = builder.finish();

        let aggregates: Vec<_> = graph
            .nodes()
            .filter(|node| node.kind() == NodeKind::NamespaceDeploy)
            .collect();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(
            predecessors(&graph, "deployProd"),
            vec!["deployAApiProd", "deployBApiProd"]
        );
    }

    #[test]
    fn test_services_share_login_node() {
        let profile = validated(
            Profile::new("default")
                .with_build(BuildBlock::default())
                .with_push(push_block()),
        );
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        builder.build(&profile, "api").unwrap();
        builder.build(&profile, "worker").unwrap();
        let graph = builder.finish();

        let logins = graph
            .nodes()
            .filter(|node| node.kind() == NodeKind::Login)
            .count();
        assert_eq!(logins, 1);
        assert_eq!(predecessors(&graph, "pushWorker"), vec!["buildWorker", "login"]);
    }

    #[test]
    fn test_aggregate_name_collision_is_reported() {
        // profile aggregate `deployProd` (service "prod") vs namespace aggregate `deployProd`
        let profile = validated(Profile::new("default").with_deploy(deploy_block(&["prod"])));
        let mut builder = TaskGraphBuilder::new(GraphContext::new());
        builder.build(&profile, "api").unwrap();
        assert!(matches!(
            builder.build(&profile, "prod"),
            Err(ConfigError::NodeConflict { .. })
        ));
    }
}
