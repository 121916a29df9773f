//! Core types and error definitions for the Conductor framework.
//!
//! This crate provides the foundational types shared across all Conductor
//! crates: the unified error enum, plan-validation and worker failure
//! taxonomies, and the permission/approval vocabulary used by the plan gate.
//!
//! # Main types
//!
//! - [`ConductorError`] — Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`] — Convenience alias for `Result<T, ConductorError>`.
//! - [`PlanError`] — Why a proposed plan was rejected.
//! - [`WorkerError`] — Why a single subtask invocation failed.
//! - [`PermissionMode`] — Autonomy level of a run; `plan` enables the approval gate.
//! - [`ApprovalDecision`] — A reviewer's verdict on a proposed plan.

/// Permission modes and approval decisions.
pub mod approval;
/// Error types.
pub mod error;

pub use approval::{ApprovalDecision, PermissionMode};
pub use error::{ConductorError, ConductorResult, PlanError, WorkerError};
