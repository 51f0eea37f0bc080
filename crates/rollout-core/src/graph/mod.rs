//! Operation graph
//!
//! Nodes are keyed by their derived name. Registering a name twice merges the
//! predecessor sets and keeps the first action; registering it under a different
//! kind is a configuration error.

pub mod builder;
pub mod naming;
pub mod schedule;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::profile::{
    ValidatedBuild, ValidatedChartPush, ValidatedDeploy, ValidatedLogin, ValidatedPush,
    ValidatedScan,
};

pub use builder::{GraphContext, TaskGraphBuilder};
pub use schedule::{NodeExecutor, RunReport, Scheduler, SequentialScheduler, execution_order};

pub type NodeName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Login,
    Prepare,
    ExternalStep,
    Build,
    Scan,
    Push,
    Deploy,
    ProfileDeploy,
    NamespaceDeploy,
    ChartPush,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Login => "login",
            NodeKind::Prepare => "prepare",
            NodeKind::ExternalStep => "external-step",
            NodeKind::Build => "build",
            NodeKind::Scan => "scan",
            NodeKind::Push => "push",
            NodeKind::Deploy => "deploy",
            NodeKind::ProfileDeploy => "profile-deploy",
            NodeKind::NamespaceDeploy => "namespace-deploy",
            NodeKind::ChartPush => "chart-push",
        };
        f.write_str(name)
    }
}

/// A user-declared command that can stand in for the build-context preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStep {
    pub command: Vec<String>,
    /// Working directory relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Behavior bound to a node at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    Login(ValidatedLogin),
    CollectBuildContext {
        service: String,
        context_dir: String,
    },
    External {
        step: String,
        spec: ExternalStep,
    },
    Build {
        service: String,
        profile: String,
        build: ValidatedBuild,
    },
    Scan {
        service: String,
        scan: ValidatedScan,
        build_context_dir: String,
    },
    Push {
        service: String,
        profile: String,
        push: ValidatedPush,
    },
    Deploy {
        service: String,
        profile: String,
        namespace: String,
        deploy: ValidatedDeploy,
        /// Whether a push node of the same profile precedes this deploy
        pushed: bool,
    },
    ChartPush {
        service: String,
        chart_push: ValidatedChartPush,
    },
    /// No behavior of its own; completes when its predecessors do
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationNode {
    name: NodeName,
    kind: NodeKind,
    predecessors: BTreeSet<NodeName>,
    action: NodeAction,
}

impl OperationNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn predecessors(&self) -> &BTreeSet<NodeName> {
        &self.predecessors
    }

    pub fn action(&self) -> &NodeAction {
        &self.action
    }

    /// Add a dependency edge. Adding the same edge twice is a no-op.
    pub fn depends_on(&mut self, predecessor: impl Into<NodeName>) -> &mut Self {
        self.predecessors.insert(predecessor.into());
        self
    }
}

/// Serializable view of a node for plan output.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: NodeName,
    pub kind: NodeKind,
    pub predecessors: Vec<NodeName>,
}

impl From<&OperationNode> for NodeSummary {
    fn from(node: &OperationNode) -> Self {
        Self {
            name: node.name.clone(),
            kind: node.kind,
            predecessors: node.predecessors.iter().cloned().collect(),
        }
    }
}

/// Name-keyed node registry for one orchestration run.
#[derive(Debug, Clone, Default)]
pub struct OperationGraph {
    nodes: BTreeMap<NodeName, OperationNode>,
}

impl OperationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the node called `name` or create it with `kind` and `action`.
    ///
    /// This is the only way nodes enter the graph. An existing node keeps its action;
    /// a kind mismatch is reported as [`ConfigError::NodeConflict`].
    pub fn get_or_create(
        &mut self,
        name: &str,
        kind: NodeKind,
        action: impl FnOnce() -> NodeAction,
    ) -> Result<&mut OperationNode, ConfigError> {
        if let Some(existing) = self.nodes.get(name)
            && existing.kind != kind
        {
            return Err(ConfigError::NodeConflict {
                name: name.to_string(),
                existing: existing.kind.to_string(),
                requested: kind.to_string(),
            });
        }

        let node = self.nodes.entry(name.to_string()).or_insert_with(|| {
            debug!(node = name, %kind, "registered node");
            OperationNode {
                name: name.to_string(),
                kind,
                predecessors: BTreeSet::new(),
                action: action(),
            }
        });
        Ok(node)
    }

    /// Register a node with its predecessors, merging into an existing node of the same name.
    pub fn register<I, S>(
        &mut self,
        name: &str,
        kind: NodeKind,
        action: NodeAction,
        predecessors: I,
    ) -> Result<&OperationNode, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeName>,
    {
        let node = self.get_or_create(name, kind, || action)?;
        for predecessor in predecessors {
            node.depends_on(predecessor);
        }
        Ok(node)
    }

    pub fn get(&self, name: &str) -> Option<&OperationNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.values()
    }

    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.nodes().map(NodeSummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_merges_predecessors() {
        let mut graph = OperationGraph::new();
        graph
            .register("deployProd", NodeKind::NamespaceDeploy, NodeAction::Aggregate, ["a"])
            .unwrap();
        graph
            .register(
                "deployProd",
                NodeKind::NamespaceDeploy,
                NodeAction::Aggregate,
                ["a", "b"],
            )
            .unwrap();

        let node = graph.get("deployProd").unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(
            node.predecessors().iter().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_existing_action_is_kept() {
        let mut graph = OperationGraph::new();
        graph
            .register(
                "prepareApi",
                NodeKind::Prepare,
                NodeAction::CollectBuildContext {
                    service: "api".to_string(),
                    context_dir: "first".to_string(),
                },
                Vec::<String>::new(),
            )
            .unwrap();
        graph
            .register(
                "prepareApi",
                NodeKind::Prepare,
                NodeAction::CollectBuildContext {
                    service: "api".to_string(),
                    context_dir: "second".to_string(),
                },
                Vec::<String>::new(),
            )
            .unwrap();

        match graph.get("prepareApi").unwrap().action() {
            NodeAction::CollectBuildContext { context_dir, .. } => assert_eq!(context_dir, "first"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_kind_mismatch_is_a_conflict() {
        let mut graph = OperationGraph::new();
        graph
            .get_or_create("deployProd", NodeKind::NamespaceDeploy, || NodeAction::Aggregate)
            .unwrap();
        let err = graph
            .get_or_create("deployProd", NodeKind::ProfileDeploy, || NodeAction::Aggregate)
            .unwrap_err();

        assert!(matches!(err, ConfigError::NodeConflict { ref name, .. } if name == "deployProd"));
    }

    #[test]
    fn test_summaries_are_name_ordered() {
        let mut graph = OperationGraph::new();
        for name in ["c", "a", "b"] {
            graph
                .get_or_create(name, NodeKind::ProfileDeploy, || NodeAction::Aggregate)
                .unwrap();
        }
        let names: Vec<_> = graph.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
