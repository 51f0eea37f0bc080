//! Rollout Core Library
//!
//! Resolves deployment profiles from `rollout.toml`, turns them into a dependency graph of
//! login, build, scan, push, deploy and chart-push operations, and executes that graph.
//! Deploys skip the rollout when the freshly built image is layer-identical to the one
//! already released.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod image;
pub mod login;
pub mod plan;
pub mod process;
pub mod profile;
pub mod release;
pub mod state;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, RolloutConfig, ServiceEntry};
    pub use crate::context::AppContext;

    // Profiles
    pub use crate::profile::{
        BlockInheritance, LoginMethod, Profile, ProfileRegistry, Setting, Severity,
        ValidatedProfile,
    };

    // Graph
    pub use crate::graph::{
        GraphContext, NodeExecutor, NodeKind, OperationGraph, OperationNode, Scheduler,
        SequentialScheduler, TaskGraphBuilder,
    };
    pub use crate::plan::DeploymentPlan;

    // Execution
    pub use crate::error::{ConfigError, ExecutionError, RunError};
    pub use crate::executor::{ActionExecutor, ProjectLayout};
    pub use crate::process::{CommandSpec, ProcessRunner, SystemProcessRunner};
    pub use crate::state::{ArtifactRef, ArtifactStateStore, StateKey};
    pub use crate::version::VersionDecisionEngine;
}
