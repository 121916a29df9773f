//! Plan-approval gate used in `plan` permission mode.

use crate::plan::PlanGraph;
use async_trait::async_trait;
use conductor_core::{ApprovalDecision, ConductorResult};
use std::future::Future;
use std::pin::Pin;
use tracing::info;

/// Reviews a validated plan before level 0 starts.
///
/// An `Err` means no decision could be obtained and aborts the run; a
/// rejection is an `Ok` decision with `approved == false`.
#[async_trait]
pub trait PlanApprover: Send + Sync {
    /// Approve or reject `plan` for `task`. An `Err` aborts the run before anything starts.
    async fn review_plan(&self, task: &str, plan: &PlanGraph) -> ConductorResult<ApprovalDecision>;
}

/// Approves every plan. For tests and non-interactive runs.
pub struct AutoApprove;

#[async_trait]
impl PlanApprover for AutoApprove {
    async fn review_plan(&self, _task: &str, plan: &PlanGraph) -> ConductorResult<ApprovalDecision> {
        info!(
            subtasks = plan.len(),
            "Auto-approving plan (no human reviewer configured)"
        );
        Ok(ApprovalDecision::approve("system"))
    }
}

/// Rejects every plan with a fixed reason.
pub struct RejectAll {
    reason: String,
}

impl RejectAll {
    /// Rejector giving `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for RejectAll {
    fn default() -> Self {
        Self::new("Plan rejected by policy")
    }
}

#[async_trait]
impl PlanApprover for RejectAll {
    async fn review_plan(&self, _task: &str, _plan: &PlanGraph) -> ConductorResult<ApprovalDecision> {
        Ok(ApprovalDecision::reject("system", self.reason.clone()))
    }
}

type ReviewFuture = Pin<Box<dyn Future<Output = ConductorResult<ApprovalDecision>> + Send>>;

/// Delegates the decision to a user-provided async function, which receives
/// the task and the rendered plan.
pub struct CallbackApprover<F>
where
    F: Fn(String, String) -> ReviewFuture + Send + Sync,
{
    callback: F,
}

impl<F> CallbackApprover<F>
where
    F: Fn(String, String) -> ReviewFuture + Send + Sync,
{
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> PlanApprover for CallbackApprover<F>
where
    F: Fn(String, String) -> ReviewFuture + Send + Sync,
{
    async fn review_plan(&self, task: &str, plan: &PlanGraph) -> ConductorResult<ApprovalDecision> {
        (self.callback)(task.to_string(), plan.render()).await
    }
}
