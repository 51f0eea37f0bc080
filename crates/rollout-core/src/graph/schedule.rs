//! Graph execution.
//!
//! The order is deterministic: among the nodes whose predecessors are done, the one
//! with the smallest name runs first.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use super::{NodeAction, NodeName, OperationGraph, OperationNode};
use crate::error::{ConfigError, ExecutionError, RunError};

/// Runs the behavior bound to a single node.
pub trait NodeExecutor {
    fn execute(&self, node: &OperationNode) -> Result<(), ExecutionError>;
}

/// Executes the nodes a set of targets needs, respecting dependency order.
pub trait Scheduler {
    fn run(
        &self,
        graph: &OperationGraph,
        targets: &[NodeName],
        executor: &dyn NodeExecutor,
    ) -> Result<RunReport, RunError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub executed: Vec<NodeName>,
}

/// Runs one node at a time and stops at the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialScheduler;

impl Scheduler for SequentialScheduler {
    fn run(
        &self,
        graph: &OperationGraph,
        targets: &[NodeName],
        executor: &dyn NodeExecutor,
    ) -> Result<RunReport, RunError> {
        let order = execution_order(graph, targets)?;
        let mut report = RunReport::default();

        for name in order {
            let node = graph
                .get(&name)
                .ok_or_else(|| ConfigError::UnknownNode(name.clone()))?;
            if !matches!(node.action(), NodeAction::Aggregate) {
                info!(node = %name, kind = %node.kind(), "executing node");
            }
            executor
                .execute(node)
                .map_err(|source| ExecutionError::Node {
                    node: name.clone(),
                    source: Box::new(source),
                })?;
            report.executed.push(name);
        }

        Ok(report)
    }
}

/// Topological order of `targets` and everything they depend on.
///
/// An empty target list selects the whole graph.
pub fn execution_order(
    graph: &OperationGraph,
    targets: &[NodeName],
) -> Result<Vec<NodeName>, ConfigError> {
    let selected = collect_ancestors(graph, targets)?;

    let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in &selected {
        let node = graph
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))?;
        remaining.insert(name, node.predecessors().len());
        for predecessor in node.predecessors() {
            dependents.entry(predecessor.as_str()).or_default().push(name);
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(selected.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != selected.len() {
        let done: BTreeSet<&str> = order.iter().map(String::as_str).collect();
        let stuck = selected
            .iter()
            .filter(|name| !done.contains(*name))
            .map(|name| name.to_string())
            .collect();
        return Err(ConfigError::Cycle(stuck));
    }

    Ok(order)
}

fn collect_ancestors<'a>(
    graph: &'a OperationGraph,
    targets: &[NodeName],
) -> Result<BTreeSet<&'a str>, ConfigError> {
    let mut selected = BTreeSet::new();
    let mut stack: Vec<&str> = if targets.is_empty() {
        graph.nodes().map(|node| node.name()).collect()
    } else {
        let mut roots = Vec::with_capacity(targets.len());
        for target in targets {
            let node = graph
                .get(target)
                .ok_or_else(|| ConfigError::UnknownNode(target.clone()))?;
            roots.push(node.name());
        }
        roots
    };

    while let Some(name) = stack.pop() {
        if !selected.insert(name) {
            continue;
        }
        let node = graph
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNode(name.to_string()))?;
        for predecessor in node.predecessors() {
            match graph.get(predecessor) {
                Some(found) => stack.push(found.name()),
                None => return Err(ConfigError::UnknownNode(predecessor.clone())),
            }
        }
    }

    Ok(selected)
}
