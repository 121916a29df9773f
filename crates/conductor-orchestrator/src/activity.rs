use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One logged tool invocation.
///
/// Created by [`ActivityTracker::record_start`] with its input and patched
/// exactly once by [`ActivityTracker::record_end`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Position in the global total order. Strictly increasing.
    pub sequence: u64,
    /// Assigned under the ordering lock; never earlier than the previous record.
    pub timestamp: DateTime<Utc>,
    /// Agent that made the call.
    pub agent_name: String,
    /// Tool name, e.g. `Read` or `Task`.
    pub tool_name: String,
    /// Arguments the tool was called with.
    pub input_data: serde_json::Value,
    /// `None` until the call completes.
    pub output_data: Option<serde_json::Value>,
    /// Set when the call failed.
    pub error: Option<String>,
    /// The agent that spawned `agent_name`, if any.
    pub parent_agent: Option<String>,
    /// When the call finished.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    /// Whether `record_end` has been applied.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Opaque reference to a started record, used to complete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle(usize);

/// Tool calls made by one agent, in timeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent name.
    pub agent_name: String,
    /// Tool names in call order.
    pub tool_calls: Vec<String>,
}

#[derive(Default)]
struct TrackerState {
    records: Vec<ActivityRecord>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Append-only, thread-safe log of every tool invocation in a run.
///
/// A single mutex is the ordering point: sequence numbers and timestamps are
/// assigned inside it, so records from concurrently running agents form one
/// total order. The critical sections never await.
#[derive(Default)]
pub struct ActivityTracker {
    state: Mutex<TrackerState>,
}

impl ActivityTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a call that is about to run.
    pub fn record_start(
        &self,
        agent_name: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        parent_agent: Option<String>,
    ) -> RecordHandle {
        let agent_name = agent_name.into();
        let tool_name = tool_name.into();
        let mut state = self.state.lock();
        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        state.last_timestamp = Some(timestamp);
        let pos = state.records.len();
        debug!(
            sequence = pos,
            agent = %agent_name,
            tool = %tool_name,
            parent = ?parent_agent,
            "Activity started"
        );
        state.records.push(ActivityRecord {
            sequence: pos as u64,
            timestamp,
            agent_name,
            tool_name,
            input_data: input,
            output_data: None,
            error: None,
            parent_agent,
            completed_at: None,
        });
        RecordHandle(pos)
    }

    /// Patch a started record with its outcome. Returns `false` if the handle
    /// is unknown or the record was already completed.
    pub fn record_end(
        &self,
        handle: RecordHandle,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(record) = state.records.get_mut(handle.0) else {
            return false;
        };
        if record.completed_at.is_some() {
            return false;
        }
        record.output_data = Some(output.unwrap_or(serde_json::Value::Null));
        record.error = error;
        record.completed_at = Some(Utc::now());
        debug!(
            sequence = record.sequence,
            agent = %record.agent_name,
            tool = %record.tool_name,
            failed = record.error.is_some(),
            "Activity completed"
        );
        true
    }

    /// Record a call that already finished, as reported after the fact.
    pub fn record_completed(
        &self,
        agent_name: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        output: Option<serde_json::Value>,
        error: Option<String>,
        parent_agent: Option<String>,
    ) -> RecordHandle {
        let handle = self.record_start(agent_name, tool_name, input, parent_agent);
        self.record_end(handle, output, error);
        handle
    }

    /// Snapshot copy of every record in total order.
    pub fn timeline(&self) -> Vec<ActivityRecord> {
        self.state.lock().records.clone()
    }

    /// Records from position `first` onwards, in total order.
    pub fn timeline_since(&self, first: usize) -> Vec<ActivityRecord> {
        self.state
            .lock()
            .records
            .get(first..)
            .map(<[ActivityRecord]>::to_vec)
            .unwrap_or_default()
    }

    /// Records of one agent, preserving timeline order.
    pub fn by_agent(&self, agent_name: &str) -> Vec<ActivityRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.agent_name == agent_name)
            .cloned()
            .collect()
    }

    /// Tool-name sequence per agent, agents in order of first appearance.
    pub fn summary(&self) -> Vec<AgentSummary> {
        summarize(&self.timeline())
    }

    /// Number of records, complete or not.
    pub fn total_calls(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Human-readable activity report.
    pub fn render_summary(&self) -> String {
        render_timeline(&self.timeline())
    }
}

/// Render a timeline as a per-agent report with a detail line for queries
/// and file paths.
pub fn render_timeline(timeline: &[ActivityRecord]) -> String {
    let rule = "=".repeat(70);
    let mut out = format!("{rule}\nAGENT ACTIVITY SUMMARY\n{rule}\n");
    for group in summarize(timeline) {
        out.push_str(&format!(
            "\n[{}] - {} tool calls\n",
            group.agent_name,
            group.tool_calls.len()
        ));
        for record in timeline.iter().filter(|r| r.agent_name == group.agent_name) {
            out.push_str(&format!("  → {}\n", record.tool_name));
            if let Some(detail) = detail_line(record) {
                out.push_str(&format!("    {detail}\n"));
            }
        }
    }
    out.push_str(&format!("\n{rule}\n"));
    out
}

/// Tool-name sequence per agent, agents in order of first appearance.
pub fn summarize(timeline: &[ActivityRecord]) -> Vec<AgentSummary> {
    let mut groups: Vec<AgentSummary> = Vec::new();
    for record in timeline {
        match groups.iter_mut().find(|g| g.agent_name == record.agent_name) {
            Some(group) => group.tool_calls.push(record.tool_name.clone()),
            None => groups.push(AgentSummary {
                agent_name: record.agent_name.clone(),
                tool_calls: vec![record.tool_name.clone()],
            }),
        }
    }
    groups
}

fn detail_line(record: &ActivityRecord) -> Option<String> {
    let field = |key: &str| record.input_data.get(key).and_then(|v| v.as_str());
    if let Some(query) = field("query") {
        let short: String = query.chars().take(80).collect();
        return Some(format!("Query: {short}..."));
    }
    field("path")
        .or_else(|| field("file_path"))
        .map(|path| format!("File: {path}"))
}

/// A call started through an [`ActivityScope`]; pass it back to finish it.
#[derive(Debug)]
#[must_use = "a pending call should be finished with ActivityScope::end or ActivityScope::fail"]
pub struct PendingCall(Option<RecordHandle>);

/// Activity recorder bound to one agent, handed to workers.
///
/// Every record made through a scope carries the scope's agent name and its
/// parent agent, so sub-agent calls build an explicit call tree. A disabled
/// scope records nothing.
#[derive(Clone)]
pub struct ActivityScope {
    tracker: Option<Arc<ActivityTracker>>,
    agent: String,
    parent: Option<String>,
}

impl ActivityScope {
    /// Scope recording as `agent` under `parent`.
    pub fn new(
        tracker: Arc<ActivityTracker>,
        agent: impl Into<String>,
        parent: Option<String>,
    ) -> Self {
        Self {
            tracker: Some(tracker),
            agent: agent.into(),
            parent,
        }
    }

    /// A scope that drops every record.
    pub fn disabled(agent: impl Into<String>) -> Self {
        Self {
            tracker: None,
            agent: agent.into(),
            parent: None,
        }
    }

    /// Agent every record is attributed to.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Parent stamped on every record.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Whether records are kept.
    pub fn is_enabled(&self) -> bool {
        self.tracker.is_some()
    }

    /// Scope for a sub-agent spawned by this scope's agent.
    pub fn child(&self, agent: impl Into<String>) -> Self {
        Self {
            tracker: self.tracker.clone(),
            agent: agent.into(),
            parent: Some(self.agent.clone()),
        }
    }

    /// Start a call. Finish it with [`end`](Self::end) or [`fail`](Self::fail).
    pub fn start(&self, tool_name: impl Into<String>, input: serde_json::Value) -> PendingCall {
        PendingCall(self.tracker.as_ref().map(|t| {
            t.record_start(self.agent.clone(), tool_name, input, self.parent.clone())
        }))
    }

    /// Complete a call with its output.
    pub fn end(&self, call: PendingCall, output: serde_json::Value) {
        if let (Some(tracker), Some(handle)) = (&self.tracker, call.0) {
            tracker.record_end(handle, Some(output), None);
        }
    }

    /// Complete a call with an error.
    pub fn fail(&self, call: PendingCall, error: impl Into<String>) {
        if let (Some(tracker), Some(handle)) = (&self.tracker, call.0) {
            tracker.record_end(handle, None, Some(error.into()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_two_phase_record() {
        let tracker = ActivityTracker::new();
        let handle = tracker.record_start("researcher", "WebSearch", json!({"query": "rust"}), None);

        let pending = tracker.timeline();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].output_data.is_none());
        assert!(!pending[0].is_complete());

        assert!(tracker.record_end(handle, Some(json!({"hits": 3})), None));
        let done = tracker.timeline();
        assert_eq!(done[0].output_data, Some(json!({"hits": 3})));
        assert!(done[0].is_complete());

        // The snapshot taken earlier is unaffected by the patch.
        assert!(pending[0].output_data.is_none());
    }

    #[test]
    fn test_record_end_only_once() {
        let tracker = ActivityTracker::new();
        let handle = tracker.record_start("a", "Read", json!({}), None);
        assert!(tracker.record_end(handle, None, Some("denied".into())));
        assert!(!tracker.record_end(handle, Some(json!("late")), None));
        let record = &tracker.timeline()[0];
        assert_eq!(record.error.as_deref(), Some("denied"));
        assert_eq!(record.output_data, Some(serde_json::Value::Null));
        assert!(!tracker.record_end(RecordHandle(42), None, None));
    }

    #[test]
    fn test_by_agent_is_ordered_subsequence() {
        let tracker = ActivityTracker::new();
        tracker.record_completed("a", "Read", json!({}), None, None, None);
        tracker.record_completed("b", "Write", json!({}), None, None, None);
        tracker.record_completed("a", "Bash", json!({}), None, None, None);

        let a = tracker.by_agent("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].tool_name, "Read");
        assert_eq!(a[1].tool_name, "Bash");
        assert!(a[0].sequence < a[1].sequence);
        assert!(tracker.by_agent("nobody").is_empty());
    }

    #[test]
    fn test_summary_groups_by_first_appearance() {
        let tracker = ActivityTracker::new();
        tracker.record_completed("writer", "Read", json!({}), None, None, None);
        tracker.record_completed("analyst", "Bash", json!({}), None, None, None);
        tracker.record_completed("writer", "Write", json!({}), None, None, None);

        let summary = tracker.summary();
        assert_eq!(
            summary,
            vec![
                AgentSummary {
                    agent_name: "writer".into(),
                    tool_calls: vec!["Read".into(), "Write".into()],
                },
                AgentSummary {
                    agent_name: "analyst".into(),
                    tool_calls: vec!["Bash".into()],
                },
            ]
        );
        assert_eq!(tracker.total_calls(), 3);
    }

    #[test]
    fn test_concurrent_writers_form_total_order() {
        let tracker = Arc::new(ActivityTracker::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let h = tracker.record_start(format!("agent-{t}"), "Tool", json!({"i": i}), None);
                    tracker.record_end(h, Some(json!(i)), None);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let timeline = tracker.timeline();
        assert_eq!(timeline.len(), 800);
        for pair in timeline.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(timeline.iter().all(ActivityRecord::is_complete));

        let agent_3 = tracker.by_agent("agent-3");
        assert_eq!(agent_3.len(), 100);
        let inputs: Vec<i64> = agent_3
            .iter()
            .map(|r| r.input_data["i"].as_i64().unwrap())
            .collect();
        assert_eq!(inputs, (0..100).collect::<Vec<i64>>());
    }

    #[test]
    fn test_scope_parent_attribution() {
        let tracker = Arc::new(ActivityTracker::new());
        let lead = ActivityScope::new(Arc::clone(&tracker), "lead", None);
        let researcher = lead.child("researcher");

        let call = researcher.start("WebSearch", json!({"query": "agents"}));
        let sub = researcher.child("fact-checker");
        let inner = sub.start("WebFetch", json!({"url": "https://example.com"}));
        sub.end(inner, json!("ok"));
        researcher.fail(call, "rate limited");

        let timeline = tracker.timeline();
        assert_eq!(timeline[0].agent_name, "researcher");
        assert_eq!(timeline[0].parent_agent.as_deref(), Some("lead"));
        assert_eq!(timeline[0].error.as_deref(), Some("rate limited"));
        assert_eq!(timeline[1].agent_name, "fact-checker");
        assert_eq!(timeline[1].parent_agent.as_deref(), Some("researcher"));
    }

    #[test]
    fn test_disabled_scope_records_nothing() {
        let scope = ActivityScope::disabled("solo");
        assert!(!scope.is_enabled());
        let call = scope.start("Read", json!({}));
        scope.end(call, json!("ignored"));
        assert_eq!(scope.agent(), "solo");
        assert!(scope.child("sub").parent().is_some());
    }

    #[test]
    fn test_render_summary_details() {
        let tracker = ActivityTracker::new();
        tracker.record_completed("researcher", "WebSearch", json!({"query": "rust async"}), None, None, None);
        tracker.record_completed("writer", "Write", json!({"path": "report.md"}), None, None, None);

        let text = tracker.render_summary();
        assert!(text.contains("AGENT ACTIVITY SUMMARY"));
        assert!(text.contains("[researcher] - 1 tool calls"));
        assert!(text.contains("Query: rust async..."));
        assert!(text.contains("File: report.md"));
    }
}
