//! Error taxonomy.
//!
//! Configuration-time failures (`ConfigError`) abort a run before any node executes.
//! Execution-time failures (`ExecutionError`) are raised by individual nodes and handed
//! to the scheduler.

use std::fmt;

use thiserror::Error;

/// Failures discovered while resolving profiles or building the operation graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Profile '{0}' is declared more than once")]
    DuplicateProfile(String),

    #[error("Profile '{profile}' is missing required field '{field}'")]
    MissingRequiredField { profile: String, field: String },

    #[error("Profile '{profile}': {reason}")]
    MissingDependency { profile: String, reason: String },

    #[error("Node '{name}' is already registered as {existing}, cannot register it as {requested}")]
    NodeConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Dependency cycle detected involving: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Parse(String),
}

/// A spawned command exited unsuccessfully or could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Command `{command}` failed ({status}): {stderr}")]
pub struct ProcessExecutionError {
    pub command: String,
    pub status: ExitStatus,
    pub stderr: String,
}

/// Exit outcome of an external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    /// Terminated without an exit code (signal).
    Terminated,
    /// The program could not be spawned at all.
    NotStarted,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {code}"),
            ExitStatus::Terminated => write!(f, "terminated by signal"),
            ExitStatus::NotStarted => write!(f, "not started"),
        }
    }
}

/// Remote release state could not be queried. Always recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not query release '{release}' in namespace '{namespace}': {reason}")]
pub struct RemoteQueryError {
    pub release: String,
    pub namespace: String,
    pub reason: String,
}

/// Failures raised while executing a single node.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Process(#[from] ProcessExecutionError),

    #[error("Artifact '{key}' has not been produced yet")]
    MissingArtifact { key: String },

    #[error("Invalid login configuration: {0}")]
    InvalidLogin(String),

    #[error("Unknown external step: {0}")]
    UnknownStep(String),

    #[error("Node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: Box<ExecutionError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ExecutionError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Outcome of a scheduler run that did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
