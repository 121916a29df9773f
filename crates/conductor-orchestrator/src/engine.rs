use crate::activity::ActivityTracker;
use crate::approval::PlanApprover;
use crate::config::OrchestratorConfig;
use crate::decomposer::Decomposer;
use crate::plan::PlanGraph;
use crate::registry::{AgentRegistry, RegistrySnapshot};
use crate::scheduler::Executor;
use crate::types::ExecutionResult;
use crate::worker::Worker;
use conductor_core::ConductorResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Top-level entry point: decompose → validate → (approve) → execute.
///
/// Each run works against one registry snapshot taken at its start, so agents
/// registered or removed mid-run never affect it.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    decomposer: Arc<dyn Decomposer>,
    worker: Arc<dyn Worker>,
    approver: Option<Arc<dyn PlanApprover>>,
    tracker: Option<Arc<ActivityTracker>>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Orchestrator with default config and no approver.
    pub fn new(
        registry: Arc<AgentRegistry>,
        decomposer: Arc<dyn Decomposer>,
        worker: Arc<dyn Worker>,
    ) -> Self {
        Self {
            registry,
            decomposer,
            worker,
            approver: None,
            tracker: None,
            config: OrchestratorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the run configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared activity tracker for every run. Records from calls still in
    /// flight after a cancellation land here too.
    pub fn with_tracker(mut self, tracker: Arc<ActivityTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Approver consulted in `plan` permission mode.
    pub fn with_approver(mut self, approver: Arc<dyn PlanApprover>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Current run configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Registry agents are resolved from at the start of each run.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Triggering this token cancels the run in progress and any later run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Decompose `task` and validate the proposal without running anything.
    pub async fn plan(&self, task: &str) -> ConductorResult<PlanGraph> {
        let snapshot = self.registry.snapshot();
        self.plan_with(task, &snapshot).await
    }

    /// Full run. Plan validation and approval-channel failures are `Err`;
    /// worker failures, rejection and cancellation are reported in the
    /// returned result.
    pub async fn run(&self, task: &str) -> ConductorResult<ExecutionResult> {
        info!(task = %task, "Orchestrator run requested");
        let snapshot = self.registry.snapshot();
        let mut plan = self.plan_with(task, &snapshot).await?;
        self.executor().execute(task, &mut plan, &snapshot).await
    }

    /// Run an already-built plan against the current registry.
    pub async fn run_plan(&self, task: &str, mut plan: PlanGraph) -> ConductorResult<ExecutionResult> {
        let snapshot = self.registry.snapshot();
        self.executor().execute(task, &mut plan, &snapshot).await
    }

    async fn plan_with(&self, task: &str, snapshot: &RegistrySnapshot) -> ConductorResult<PlanGraph> {
        let proposed = self
            .decomposer
            .decompose(task, &snapshot.descriptors())
            .await?;
        info!(proposed = proposed.len(), "Task decomposed");
        Ok(PlanGraph::build(proposed, snapshot)?)
    }

    fn executor(&self) -> Executor {
        let mut executor = Executor::from_config(Arc::clone(&self.worker), &self.config)
            .with_cancellation(self.cancel.clone());
        if let Some(approver) = &self.approver {
            executor = executor.with_approver(Arc::clone(approver));
        }
        if let Some(tracker) = &self.tracker {
            executor = executor.with_tracker(Arc::clone(tracker));
        }
        executor
    }
}
