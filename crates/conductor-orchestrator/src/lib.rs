//! Multi-agent orchestration: registry, plan validation, level-by-level
//! execution and an ordered activity timeline.
//!
//! A task is decomposed into proposed subtasks, validated into a dependency
//! DAG against a registry snapshot, optionally shown to an approver, and then
//! executed one topological level at a time with sibling subtasks running
//! concurrently.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Facade running decompose → validate → approve → execute.
//! - [`AgentRegistry`] — Thread-safe agent catalog with immutable snapshots.
//! - [`PlanGraph`] — Validated subtask DAG with its topological levels.
//! - [`Executor`] — Level-by-level scheduler with skip propagation and cancellation.
//! - [`ActivityTracker`] — Totally ordered log of every tool invocation.

/// Activity timeline and per-agent recording scopes.
pub mod activity;
/// Plan-approval gate and built-in approvers.
pub mod approval;
/// Run configuration.
pub mod config;
/// Task decomposition interface.
pub mod decomposer;
/// Orchestration facade.
pub mod engine;
/// Plan graph construction, validation and leveling.
pub mod plan;
/// Default agent roster.
pub mod profiles;
/// Agent registry.
pub mod registry;
/// Level-by-level plan executor.
pub mod scheduler;
/// Shared orchestration types (AgentDescriptor, Subtask, ExecutionResult, etc.).
pub mod types;
/// Worker interface.
pub mod worker;

pub use activity::{
    render_timeline, summarize, ActivityRecord, ActivityScope, ActivityTracker, AgentSummary,
    PendingCall, RecordHandle,
};
pub use approval::{AutoApprove, CallbackApprover, PlanApprover, RejectAll};
pub use config::OrchestratorConfig;
pub use decomposer::{Decomposer, StaticDecomposer};
pub use engine::Orchestrator;
pub use plan::PlanGraph;
pub use profiles::{default_agents, default_registry};
pub use registry::{AgentRegistry, RegistrySnapshot};
pub use scheduler::Executor;
pub use types::{
    AgentDescriptor, ExecutionResult, ExecutionStatus, ProposedSubtask, Subtask, SubtaskOutcome,
    SubtaskStatus,
};
pub use worker::{FnWorker, ToolCallEvent, Worker, WorkerOutput, WorkerRequest};
// Re-export the shared vocabulary from core.
pub use conductor_core::{
    ApprovalDecision, ConductorError, ConductorResult, PermissionMode, PlanError, WorkerError,
};
