use crate::activity::ActivityScope;
use crate::types::AgentDescriptor;
use async_trait::async_trait;
use conductor_core::{PermissionMode, WorkerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Everything a worker needs to carry out one subtask.
#[derive(Clone)]
pub struct WorkerRequest {
    /// Agent the subtask is assigned to, from the run's registry snapshot.
    pub agent: Arc<AgentDescriptor>,
    /// Plan id of the subtask.
    pub subtask_id: String,
    /// What the agent should do.
    pub description: String,
    /// Artifacts the subtask is expected to produce.
    pub expected_outputs: Vec<String>,
    /// Outputs of the subtask's completed dependencies, keyed by subtask id.
    pub prior_outputs: BTreeMap<String, String>,
    /// Passed through untouched; only `plan` has meaning to the executor.
    pub permission_mode: PermissionMode,
    /// Live recorder bound to the invoked agent. Disabled when tracking is off.
    pub activity: ActivityScope,
}

/// A tool call reported by a worker after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    /// Calling agent. `None` means the agent the subtask was assigned to.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Tool name, e.g. `Read` or `Task`.
    pub tool_name: String,
    /// Arguments the tool was called with.
    #[serde(default)]
    pub input: serde_json::Value,
    /// Result of a successful call.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Error of a failed call.
    #[serde(default)]
    pub error: Option<String>,
    /// Spawning agent. Defaults to the assigned agent for sub-agent calls and
    /// to the lead agent otherwise.
    #[serde(default)]
    pub parent_agent: Option<String>,
}

impl ToolCallEvent {
    /// A call by the assigned agent with no result yet.
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            agent_name: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            error: None,
            parent_agent: None,
        }
    }

    /// Attribute the call to a sub-agent spawned by the assigned agent.
    pub fn by_subagent(mut self, agent: impl Into<String>) -> Self {
        self.agent_name = Some(agent.into());
        self
    }

    /// Mark the call successful.
    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Mark the call failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Successful worker result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Stored as the subtask's output and handed to dependents.
    pub output: String,
    /// Calls recorded after the dispatch record, in order.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallEvent>,
}

impl WorkerOutput {
    /// Output with no tool calls.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Append a reported call.
    pub fn with_tool_call(mut self, event: ToolCallEvent) -> Self {
        self.tool_calls.push(event);
        self
    }
}

/// Executes one subtask on behalf of an agent.
///
/// The invocation is the only suspension point of a run; everything else the
/// executor does is synchronous. Implementations must be safe to call
/// concurrently for sibling subtasks.
///
/// `WorkerOutput::tool_calls` is only read on success. A worker that can fail
/// after calling tools should record those calls live through
/// `WorkerRequest::activity`; the records stay in the timeline whatever
/// `invoke` returns.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the subtask. An `Err` fails the subtask and skips its dependents.
    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError>;
}

type WorkerFuture = Pin<Box<dyn Future<Output = Result<WorkerOutput, WorkerError>> + Send>>;

/// Worker backed by a closure returning a boxed future.
pub struct FnWorker<F>
where
    F: Fn(WorkerRequest) -> WorkerFuture + Send + Sync,
{
    callback: F,
}

impl<F> FnWorker<F>
where
    F: Fn(WorkerRequest) -> WorkerFuture + Send + Sync,
{
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: Fn(WorkerRequest) -> WorkerFuture + Send + Sync,
{
    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        (self.callback)(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::activity::ActivityTracker;
    use serde_json::json;

    fn request(tracker: Arc<ActivityTracker>) -> WorkerRequest {
        WorkerRequest {
            agent: Arc::new(AgentDescriptor::new("web-researcher", "Searches the web")),
            subtask_id: "1".into(),
            description: "Find sources".into(),
            expected_outputs: vec!["sources.md".into()],
            prior_outputs: BTreeMap::new(),
            permission_mode: PermissionMode::Default,
            activity: ActivityScope::new(tracker, "web-researcher", Some("lead".into())),
        }
    }

    #[tokio::test]
    async fn test_fn_worker_invokes_callback() {
        let worker = FnWorker::new(|req: WorkerRequest| -> WorkerFuture {
            Box::pin(async move { Ok(WorkerOutput::text(format!("done: {}", req.description))) })
        });
        let out = worker
            .invoke(request(Arc::new(ActivityTracker::new())))
            .await
            .unwrap();
        assert_eq!(out.output, "done: Find sources");
        assert!(out.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_worker_records_through_scope() {
        let tracker = Arc::new(ActivityTracker::new());
        let worker = FnWorker::new(|req: WorkerRequest| -> WorkerFuture {
            Box::pin(async move {
                let call = req.activity.start("WebSearch", json!({"query": "rust"}));
                req.activity.end(call, json!({"hits": 2}));
                Ok(WorkerOutput::text("ok"))
            })
        });
        worker.invoke(request(tracker.clone())).await.unwrap();

        let timeline = tracker.timeline();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].agent_name, "web-researcher");
        assert_eq!(timeline[0].parent_agent.as_deref(), Some("lead"));
        assert!(timeline[0].is_complete());
    }

    #[tokio::test]
    async fn test_fn_worker_propagates_error() {
        let worker = FnWorker::new(|_req: WorkerRequest| -> WorkerFuture {
            Box::pin(async { Err(WorkerError::failed("quota exceeded")) })
        });
        let err = worker
            .invoke(request(Arc::new(ActivityTracker::new())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_tool_call_event_deserializes_with_defaults() {
        let event: ToolCallEvent =
            serde_json::from_str(r#"{"tool_name":"Read","input":{"path":"a.md"}}"#).unwrap();
        assert!(event.agent_name.is_none());
        assert!(event.output.is_none());
        assert_eq!(event.input["path"], "a.md");
    }

    #[test]
    fn test_worker_output_builder() {
        let out = WorkerOutput::text("report").with_tool_call(
            ToolCallEvent::new("Write", json!({"path": "report.md"}))
                .by_subagent("proofreader")
                .with_output(json!("ok")),
        );
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].agent_name.as_deref(), Some("proofreader"));
    }
}
