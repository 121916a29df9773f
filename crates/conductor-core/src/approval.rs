//! Permission modes and approval decisions for human-in-the-loop (HITL) plan review.
//!
//! These types live in `conductor-core` so that the orchestrator (which gates
//! execution on them) and front-ends such as the CLI (which collect the
//! decision from a human) can share them.

use crate::ConductorError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How much autonomy a run is granted.
///
/// Only [`PermissionMode::Plan`] changes scheduling: the computed plan is shown
/// to an approver before anything runs. The remaining modes are forwarded to
/// workers untouched and govern what they may do internally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Show the full plan and wait for approval before level 0.
    Plan,
    /// Workers may apply edits without asking.
    AcceptEdits,
    /// Workers follow their normal permission prompts.
    #[default]
    Default,
    /// Workers skip all permission checks.
    BypassPermissions,
}

impl PermissionMode {
    /// Whether the run must pass the plan-approval gate.
    pub fn requires_plan_approval(self) -> bool {
        matches!(self, PermissionMode::Plan)
    }

    /// The wire name of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::Default => "default",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(PermissionMode::Plan),
            "acceptEdits" | "accept-edits" => Ok(PermissionMode::AcceptEdits),
            "default" => Ok(PermissionMode::Default),
            "bypassPermissions" | "bypass-permissions" => Ok(PermissionMode::BypassPermissions),
            other => Err(ConductorError::Config(format!(
                "unknown permission mode '{other}'"
            ))),
        }
    }
}

/// The decision made by a reviewer on a proposed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Whether the plan may run.
    pub approved: bool,
    /// Why the plan was rejected, if given.
    pub reason: Option<String>,
    /// Who decided.
    pub reviewer: String,
}

impl ApprovalDecision {
    /// Approval by `reviewer`.
    pub fn approve(reviewer: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: None,
            reviewer: reviewer.into(),
        }
    }

    /// Rejection by `reviewer` with `reason`.
    pub fn reject(reviewer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            reviewer: reviewer.into(),
        }
    }
}
