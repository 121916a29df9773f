use crate::activity::ActivityRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A registered worker agent.
///
/// The core never interprets `system_prompt` or `metadata`; they are carried
/// through to the worker untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique registry key.
    pub name: String,
    /// One-line summary shown to decomposers.
    pub description: String,
    /// Tool identifiers this agent is permitted to invoke.
    #[serde(default)]
    pub tools: BTreeSet<String>,
    /// Discovery tags used by [`AgentRegistry::find_by_capability`](crate::AgentRegistry::find_by_capability).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Instructions handed to the worker.
    #[serde(default)]
    pub system_prompt: String,
    /// Free-form extra data.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AgentDescriptor {
    /// Descriptor with no tools, capabilities or prompt.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            system_prompt: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Replace the tool set.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the capability tags.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Insert one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the agent carries `tag`.
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }
}

/// Lifecycle of a subtask inside a plan.
///
/// `Pending → Ready → Running → Completed | Failed`, or `Pending → Skipped`
/// when a dependency did not complete. `Cancelled` marks work cut short by a
/// mid-run cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// Waiting for dependencies.
    Pending,
    /// All dependencies completed; about to be dispatched.
    Ready,
    /// Worker invoked.
    Running,
    /// Worker returned output.
    Completed,
    /// Worker returned an error or timed out.
    Failed,
    /// Not run because a dependency did not complete.
    Skipped,
    /// Cut short by cancellation.
    Cancelled,
}

impl SubtaskStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubtaskStatus::Completed
                | SubtaskStatus::Failed
                | SubtaskStatus::Skipped
                | SubtaskStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SubtaskStatus) -> bool {
        use SubtaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Pending, Cancelled)
                | (Ready, Running)
                | (Ready, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::Ready => "ready",
            SubtaskStatus::Running => "running",
            SubtaskStatus::Completed => "completed",
            SubtaskStatus::Failed => "failed",
            SubtaskStatus::Skipped => "skipped",
            SubtaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A subtask as proposed by a decomposer, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedSubtask {
    /// Unique within the plan.
    pub id: String,
    /// What the agent should do.
    pub description: String,
    /// Registry name of the agent to run it.
    #[serde(alias = "agent_name")]
    pub agent: String,
    /// Ids of subtasks that must complete first.
    #[serde(default, alias = "dependencies")]
    pub depends_on: Vec<String>,
    /// Artifacts the subtask should produce.
    #[serde(default)]
    pub expected_outputs: Vec<String>,
}

impl ProposedSubtask {
    /// Subtask with no dependencies or expected outputs.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent: agent.into(),
            depends_on: Vec::new(),
            expected_outputs: Vec::new(),
        }
    }

    /// Replace the dependency list.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Append one expected output.
    pub fn expecting(mut self, output: impl Into<String>) -> Self {
        self.expected_outputs.push(output.into());
        self
    }
}

/// A validated node of a [`PlanGraph`](crate::PlanGraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique within the plan.
    pub id: String,
    /// What the agent should do.
    pub description: String,
    /// Registry name of the agent running it.
    pub assigned_agent: String,
    /// Dependency ids, de-duplicated, in first-mention order.
    pub depends_on: Vec<String>,
    /// Artifacts the subtask should produce.
    pub expected_outputs: Vec<String>,
    /// Current lifecycle state.
    pub status: SubtaskStatus,
    /// Index of the level this subtask was placed in.
    pub level: usize,
    /// Worker output, once completed.
    pub output: Option<String>,
    /// Failure, skip or cancellation reason.
    pub error: Option<String>,
    /// When the worker was invoked.
    pub started_at: Option<DateTime<Utc>>,
    /// When the subtask reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every subtask completed.
    Completed,
    /// At least one subtask failed.
    Failed,
    /// Rejected at the gate, cancelled or past the deadline.
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal state of one subtask, as reported in an [`ExecutionResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    /// Subtask id.
    pub id: String,
    /// Assigned agent.
    pub agent: String,
    /// Final status.
    pub status: SubtaskStatus,
    /// Worker output, if completed.
    pub output: Option<String>,
    /// Failure, skip or cancellation reason.
    pub error: Option<String>,
}

/// Result of a full run. Returned for failed and cancelled runs too, so that
/// partial progress stays inspectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unique per run.
    pub run_id: Uuid,
    /// Task description the run was started with.
    pub task: String,
    /// Overall outcome.
    pub status: ExecutionStatus,
    /// Present when the run was cancelled, explaining why.
    pub cancel_reason: Option<String>,
    /// Subtask ids grouped by level.
    pub levels: Vec<Vec<String>>,
    /// One entry per subtask, in plan order.
    pub subtasks: Vec<SubtaskOutcome>,
    /// Outputs of completed subtasks, keyed by subtask id.
    pub outputs: BTreeMap<String, String>,
    /// Ordered activity timeline; empty when tracking is disabled.
    pub activity_timeline: Vec<ActivityRecord>,
    /// Number of records in `activity_timeline`.
    pub total_tool_calls: usize,
    /// When execution began.
    pub started_at: DateTime<Utc>,
    /// When the result was assembled.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Status of subtask `id`, if it is in the plan.
    pub fn status_of(&self, id: &str) -> Option<SubtaskStatus> {
        self.subtasks.iter().find(|s| s.id == id).map(|s| s.status)
    }

    /// Number of subtasks in `status`.
    pub fn count(&self, status: SubtaskStatus) -> usize {
        self.subtasks.iter().filter(|s| s.status == status).count()
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Run {}: {}/{} subtasks completed, {} failed, {} skipped, {} cancelled, {} tool calls",
            self.status,
            self.count(SubtaskStatus::Completed),
            self.subtasks.len(),
            self.count(SubtaskStatus::Failed),
            self.count(SubtaskStatus::Skipped),
            self.count(SubtaskStatus::Cancelled),
            self.total_tool_calls
        )
    }

    /// Per-agent activity report of this run.
    pub fn activity_report(&self) -> String {
        crate::activity::render_timeline(&self.activity_timeline)
    }
}
