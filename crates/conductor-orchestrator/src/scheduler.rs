use crate::activity::{ActivityScope, ActivityTracker, RecordHandle};
use crate::approval::PlanApprover;
use crate::config::OrchestratorConfig;
use crate::plan::PlanGraph;
use crate::registry::RegistrySnapshot;
use crate::types::{ExecutionResult, ExecutionStatus, SubtaskOutcome, SubtaskStatus};
use crate::worker::{Worker, WorkerOutput, WorkerRequest};
use chrono::{DateTime, Utc};
use conductor_core::{ApprovalDecision, ConductorError, ConductorResult, PermissionMode, WorkerError};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const DISPATCH_TOOL: &str = "Task";
const APPROVAL_TOOL: &str = "PlanApproval";

/// Runs a validated [`PlanGraph`] level by level.
///
/// Subtasks of one level run concurrently as tokio tasks; only this
/// executor's coordinating loop touches subtask statuses, through its
/// exclusive borrow of the plan. A level starts once every subtask of the
/// previous level is terminal. A subtask whose dependency did not complete
/// is skipped without invoking the worker.
pub struct Executor {
    worker: Arc<dyn Worker>,
    approver: Option<Arc<dyn PlanApprover>>,
    tracker: Option<Arc<ActivityTracker>>,
    permission_mode: PermissionMode,
    enable_tracking: bool,
    max_concurrency: Option<usize>,
    subtask_timeout: Option<Duration>,
    run_deadline: Option<Duration>,
    lead_agent: String,
    cancel: CancellationToken,
}

type Joined = Result<Result<String, WorkerError>, JoinError>;

impl Executor {
    /// Executor with default settings.
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self::from_config(worker, &OrchestratorConfig::default())
    }

    /// Executor configured from `config`. Approver and tracker are set separately.
    pub fn from_config(worker: Arc<dyn Worker>, config: &OrchestratorConfig) -> Self {
        Self {
            worker,
            approver: None,
            tracker: None,
            permission_mode: config.permission_mode,
            enable_tracking: config.enable_tracking,
            max_concurrency: config.max_concurrency,
            subtask_timeout: config.subtask_timeout(),
            run_deadline: config.run_deadline(),
            lead_agent: config.lead_agent.clone(),
            cancel: CancellationToken::new(),
        }
    }

    /// Approver consulted in `plan` permission mode.
    pub fn with_approver(mut self, approver: Arc<dyn PlanApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Record into a caller-owned tracker instead of a fresh one per run.
    ///
    /// Calls still in flight when a run is cancelled keep recording into it
    /// after [`execute`](Self::execute) returns, so their late records stay
    /// reachable. The result's timeline holds the records appended from the
    /// start of the run, so runs sharing a tracker should not overlap.
    pub fn with_tracker(mut self, tracker: Arc<ActivityTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Mode passed to workers; `plan` enables the approval gate.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Turn activity recording on or off.
    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.enable_tracking = enabled;
        self
    }

    /// Cap on concurrently running subtasks. Zero is treated as one.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// Per-call worker timeout.
    pub fn with_subtask_timeout(mut self, timeout: Duration) -> Self {
        self.subtask_timeout = Some(timeout);
        self
    }

    /// Wall-clock budget for the whole run.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Agent that dispatch and approval records are attributed to.
    pub fn with_lead_agent(mut self, name: impl Into<String>) -> Self {
        self.lead_agent = name.into();
        self
    }

    /// Replace the token observed for external cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels runs of this executor when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute `plan` to completion, rejection or cancellation.
    ///
    /// Worker failures never surface as `Err`; they mark their subtask
    /// `Failed` and the run `Failed`. `Err` is reserved for an approval
    /// gate that could not produce a decision.
    pub async fn execute(
        &self,
        task: &str,
        plan: &mut PlanGraph,
        registry: &RegistrySnapshot,
    ) -> ConductorResult<ExecutionResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let tracker = self.enable_tracking.then(|| {
            self.tracker
                .clone()
                .unwrap_or_else(|| Arc::new(ActivityTracker::new()))
        });
        let first_record = tracker.as_ref().map_or(0, |t| t.total_calls());

        info!(
            %run_id,
            subtasks = plan.len(),
            levels = plan.level_count(),
            mode = %self.permission_mode,
            "Starting run"
        );

        if self.permission_mode.requires_plan_approval() && !plan.is_empty() {
            let decision = self.request_approval(task, plan, tracker.as_deref()).await?;
            if !decision.approved {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| format!("plan rejected by {}", decision.reviewer));
                warn!(
                    %run_id,
                    reviewer = %decision.reviewer,
                    reason = %reason,
                    "Plan rejected, run cancelled"
                );
                return Ok(self.finish(
                    run_id,
                    task,
                    plan,
                    tracker.as_deref(),
                    first_record,
                    ExecutionStatus::Cancelled,
                    Some(reason),
                    started_at,
                ));
            }
            info!(%run_id, reviewer = %decision.reviewer, "Plan approved");
        }

        let deadline = self.run_deadline.map(|d| Instant::now() + d);
        let mut interrupted = None;
        let levels = plan.levels().to_vec();
        for (level_no, ids) in levels.iter().enumerate() {
            if let Some(reason) = self.interruption(deadline) {
                interrupted = Some(reason);
                break;
            }
            let runnable = Self::resolve_level(ids, plan);
            info!(
                level = level_no,
                runnable = runnable.len(),
                skipped = ids.len() - runnable.len(),
                "Starting level"
            );
            if let Err(reason) = self
                .run_level(runnable, plan, registry, tracker.as_ref(), deadline)
                .await
            {
                interrupted = Some(reason);
                break;
            }
            info!(level = level_no, "Level finished");
        }

        let status = match &interrupted {
            Some(reason) => {
                Self::cancel_remaining(plan, reason);
                ExecutionStatus::Cancelled
            }
            None if plan
                .subtasks()
                .iter()
                .any(|s| s.status == SubtaskStatus::Failed) =>
            {
                ExecutionStatus::Failed
            }
            None => ExecutionStatus::Completed,
        };

        Ok(self.finish(
            run_id,
            task,
            plan,
            tracker.as_deref(),
            first_record,
            status,
            interrupted,
            started_at,
        ))
    }

    async fn request_approval(
        &self,
        task: &str,
        plan: &PlanGraph,
        tracker: Option<&ActivityTracker>,
    ) -> ConductorResult<ApprovalDecision> {
        let approver = self.approver.as_ref().ok_or_else(|| {
            ConductorError::Approval("plan mode requires a plan approver".into())
        })?;
        let handle = tracker.map(|t| {
            t.record_start(
                self.lead_agent.clone(),
                APPROVAL_TOOL,
                json!({ "subtasks": plan.len(), "levels": plan.level_count() }),
                None,
            )
        });
        let outcome = approver.review_plan(task, plan).await;
        if let (Some(tracker), Some(handle)) = (tracker, handle) {
            match &outcome {
                Ok(decision) => tracker.record_end(
                    handle,
                    Some(json!({
                        "approved": decision.approved,
                        "reviewer": decision.reviewer,
                        "reason": decision.reason,
                    })),
                    None,
                ),
                Err(e) => tracker.record_end(handle, None, Some(e.to_string())),
            };
        }
        outcome
    }

    fn interruption(&self, deadline: Option<Instant>) -> Option<String> {
        if self.cancel.is_cancelled() {
            return Some("cancelled by caller".into());
        }
        match deadline {
            Some(d) if Instant::now() >= d => Some("run deadline exceeded".into()),
            _ => None,
        }
    }

    /// Mark each subtask of a level `Ready` or `Skipped` and return the
    /// runnable ones in plan order.
    fn resolve_level(ids: &[String], plan: &mut PlanGraph) -> Vec<String> {
        let mut runnable = Vec::with_capacity(ids.len());
        for id in ids {
            let blocked: Vec<String> = plan
                .get(id)
                .map(|s| {
                    s.depends_on
                        .iter()
                        .filter(|dep| plan.status(dep) != Some(SubtaskStatus::Completed))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if blocked.is_empty() {
                plan.transition(id, SubtaskStatus::Ready);
                runnable.push(id.clone());
            } else {
                warn!(
                    subtask = %id,
                    blocked_by = ?blocked,
                    "Skipping subtask, dependency did not complete"
                );
                plan.skip(
                    id,
                    format!("dependency did not complete: {}", blocked.join(", ")),
                );
            }
        }
        runnable
    }

    /// Run one level's runnable subtasks. Returns the interruption reason if
    /// the run was cancelled or its deadline expired before the level
    /// drained.
    async fn run_level(
        &self,
        runnable: Vec<String>,
        plan: &mut PlanGraph,
        registry: &RegistrySnapshot,
        tracker: Option<&Arc<ActivityTracker>>,
        deadline: Option<Instant>,
    ) -> Result<(), String> {
        let cap = self.max_concurrency.unwrap_or(usize::MAX).max(1);
        let mut queue: VecDeque<String> = runnable.into();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < cap {
                let Some(id) = queue.pop_front() else { break };
                if let Some(handle) = self.dispatch(&id, plan, registry, tracker) {
                    in_flight.push(async move { (id, handle.await) });
                }
            }
            if in_flight.is_empty() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(in_flight = in_flight.len(), "Run cancelled by caller");
                    return Err("cancelled by caller".into());
                }
                _ = wait_until(deadline) => {
                    warn!(in_flight = in_flight.len(), "Run deadline exceeded");
                    return Err("run deadline exceeded".into());
                }
                Some((id, joined)) = in_flight.next() => {
                    Self::settle(&id, joined, plan);
                }
            }
        }
    }

    /// Move a `Ready` subtask to `Running` and spawn its worker call.
    fn dispatch(
        &self,
        id: &str,
        plan: &mut PlanGraph,
        registry: &RegistrySnapshot,
        tracker: Option<&Arc<ActivityTracker>>,
    ) -> Option<JoinHandle<Result<String, WorkerError>>> {
        let subtask = plan.get(id)?.clone();
        let prior_outputs = plan.prior_outputs(id);
        plan.transition(id, SubtaskStatus::Running);

        let agent = match registry.get(&subtask.assigned_agent) {
            Ok(agent) => agent,
            Err(e) => {
                error!(subtask = %id, error = %e, "Assigned agent vanished from registry");
                plan.fail(id, e.to_string());
                return None;
            }
        };

        info!(
            subtask = %id,
            agent = %subtask.assigned_agent,
            level = subtask.level,
            "Subtask running"
        );

        let activity = match tracker {
            Some(t) => ActivityScope::new(
                Arc::clone(t),
                subtask.assigned_agent.clone(),
                Some(self.lead_agent.clone()),
            ),
            None => ActivityScope::disabled(subtask.assigned_agent.clone()),
        };
        let dispatch = tracker.map(|t| {
            t.record_start(
                self.lead_agent.clone(),
                DISPATCH_TOOL,
                json!({
                    "subtask_id": subtask.id,
                    "subagent_type": subtask.assigned_agent,
                    "description": subtask.description,
                }),
                None,
            )
        });

        let request = WorkerRequest {
            agent,
            subtask_id: subtask.id,
            description: subtask.description,
            expected_outputs: subtask.expected_outputs,
            prior_outputs,
            permission_mode: self.permission_mode,
            activity,
        };
        let worker = Arc::clone(&self.worker);
        let timeout = self.subtask_timeout;
        let tracker = tracker.cloned();
        let assigned = subtask.assigned_agent;
        let lead = self.lead_agent.clone();

        Some(tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, worker.invoke(request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(WorkerError::Timeout {
                            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        })
                    }),
                None => worker.invoke(request).await,
            };
            if let (Some(tracker), Some(handle)) = (tracker, dispatch) {
                record_outcome(&tracker, handle, &assigned, &lead, &result);
            }
            result.map(|out| out.output)
        }))
    }

    fn settle(id: &str, joined: Joined, plan: &mut PlanGraph) {
        match joined {
            Ok(Ok(output)) => {
                info!(subtask = %id, "Subtask completed");
                plan.complete(id, output);
            }
            Ok(Err(e)) => {
                error!(subtask = %id, error = %e, timeout = e.is_timeout(), "Subtask failed");
                plan.fail(id, e.to_string());
            }
            Err(e) => {
                error!(subtask = %id, error = %e, "Worker task did not finish");
                plan.fail(id, format!("worker task did not finish: {e}"));
            }
        }
    }

    /// Running and queued subtasks become `Cancelled`; never-started ones
    /// become `Skipped`.
    fn cancel_remaining(plan: &mut PlanGraph, reason: &str) {
        let open: Vec<(String, SubtaskStatus)> = plan
            .subtasks()
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| (s.id.clone(), s.status))
            .collect();
        for (id, status) in open {
            match status {
                SubtaskStatus::Pending => plan.skip(&id, reason.to_string()),
                _ => plan.cancel(&id, reason.to_string()),
            };
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run_id: Uuid,
        task: &str,
        plan: &PlanGraph,
        tracker: Option<&ActivityTracker>,
        first_record: usize,
        status: ExecutionStatus,
        cancel_reason: Option<String>,
        started_at: DateTime<Utc>,
    ) -> ExecutionResult {
        let timeline = tracker
            .map(|t| t.timeline_since(first_record))
            .unwrap_or_default();
        let subtasks = plan
            .subtasks()
            .iter()
            .map(|s| SubtaskOutcome {
                id: s.id.clone(),
                agent: s.assigned_agent.clone(),
                status: s.status,
                output: s.output.clone(),
                error: s.error.clone(),
            })
            .collect();
        let outputs = plan
            .subtasks()
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .filter_map(|s| s.output.clone().map(|out| (s.id.clone(), out)))
            .collect();

        let result = ExecutionResult {
            run_id,
            task: task.to_string(),
            status,
            cancel_reason,
            levels: plan.levels().to_vec(),
            subtasks,
            outputs,
            total_tool_calls: timeline.len(),
            activity_timeline: timeline,
            started_at,
            finished_at: Utc::now(),
        };
        info!(%run_id, status = %result.status, "{}", result.summary());
        result
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Record the worker's reported tool calls, then close the dispatch record.
fn record_outcome(
    tracker: &ActivityTracker,
    dispatch: RecordHandle,
    assigned: &str,
    lead: &str,
    result: &Result<WorkerOutput, WorkerError>,
) {
    match result {
        Ok(out) => {
            for event in &out.tool_calls {
                let (agent, parent) = match &event.agent_name {
                    Some(sub) => (
                        sub.clone(),
                        event.parent_agent.clone().or_else(|| Some(assigned.to_string())),
                    ),
                    None => (
                        assigned.to_string(),
                        event.parent_agent.clone().or_else(|| Some(lead.to_string())),
                    ),
                };
                tracker.record_completed(
                    agent,
                    event.tool_name.clone(),
                    event.input.clone(),
                    event.output.clone(),
                    event.error.clone(),
                    parent,
                );
            }
            tracker.record_end(dispatch, Some(json!({ "output": out.output })), None);
        }
        Err(e) => {
            tracker.record_end(dispatch, None, Some(e.to_string()));
        }
    }
}
