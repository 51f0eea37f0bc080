//! Deployment planning
//!
//! Runs the configuration pipeline end to end: merge profiles, validate them, and build one
//! operation graph covering every (profile, service) pair. Any error aborts the plan, so a
//! partially built graph is never handed to a scheduler.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::RolloutConfig;
use crate::error::ConfigError;
use crate::graph::{NodeName, NodeSummary, OperationGraph, TaskGraphBuilder, execution_order};
use crate::profile::{ProfileRegistry, ValidatedProfile};

/// Terminal nodes registered for one profile and service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanTarget {
    pub profile: String,
    pub service: String,
    pub terminals: Vec<NodeName>,
}

#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    profiles: BTreeMap<String, ValidatedProfile>,
    graph: OperationGraph,
    targets: Vec<PlanTarget>,
}

impl DeploymentPlan {
    pub fn build(config: &RolloutConfig) -> Result<Self, ConfigError> {
        let resolved = ProfileRegistry::resolve(
            &config.defaults,
            config.profiles.clone(),
            config.settings.inherit,
        )?;

        let mut profiles = BTreeMap::new();
        for (name, profile) in &resolved {
            profiles.insert(name.clone(), ValidatedProfile::validate(profile)?);
        }

        let mut builder = TaskGraphBuilder::new(config.graph_context());
        let mut targets = Vec::new();
        for profile in profiles.values() {
            if config.services.is_empty() {
                builder.build(profile, "")?;
                continue;
            }
            for service in config.service_names() {
                let terminals = builder.build(profile, service)?;
                debug!(profile = profile.name(), service, ?terminals, "planned");
                targets.push(PlanTarget {
                    profile: profile.name().to_string(),
                    service: service.to_string(),
                    terminals,
                });
            }
        }

        let graph = builder.finish();
        execution_order(&graph, &[])?;

        Ok(Self {
            profiles,
            graph,
            targets,
        })
    }

    pub fn profiles(&self) -> &BTreeMap<String, ValidatedProfile> {
        &self.profiles
    }

    pub fn graph(&self) -> &OperationGraph {
        &self.graph
    }

    pub fn targets(&self) -> &[PlanTarget] {
        &self.targets
    }

    /// Every node in the order a sequential run of the whole graph would execute them.
    pub fn execution_order(&self) -> Result<Vec<NodeName>, ConfigError> {
        execution_order(&self.graph, &[])
    }

    pub fn summary(&self) -> Result<PlanSummary, ConfigError> {
        Ok(PlanSummary {
            nodes: self.graph.summaries(),
            order: self.execution_order()?,
            targets: self.targets.clone(),
        })
    }
}

/// Serializable plan for `--format json`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub nodes: Vec<NodeSummary>,
    pub order: Vec<NodeName>,
    pub targets: Vec<PlanTarget>,
}
