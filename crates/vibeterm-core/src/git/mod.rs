//! Git reconciliation: inspect, decide, act.
//!
//! [`StatusInspector`] classifies a working directory into a
//! [`RepositoryStatus`], [`Planner`] turns a status into a
//! [`RemediationPlan`] without touching the repository, and [`Executor`]
//! runs a plan's commands in order. All git invocations go through
//! [`GitCli`], which bounds every command with a timeout.

mod cli;
mod execute;
mod plan;
mod status;

pub use cli::{GitCli, GitFailure, GitOutput};
pub use execute::{CommandResult, Executor, RemediationResult};
pub use plan::{GitCommand, Planner, RemediationPlan, build_plan};
pub use status::{AheadBehind, LocalChanges, RepositoryStatus, StatusInspector, classify};
