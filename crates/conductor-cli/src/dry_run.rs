use async_trait::async_trait;
use conductor_core::WorkerError;
use conductor_orchestrator::{ToolCallEvent, Worker, WorkerOutput, WorkerRequest};
use serde_json::json;

/// Worker that performs no real work: it echoes the subtask and reports one
/// `Write` per expected output.
pub struct DryRunWorker;

#[async_trait]
impl Worker for DryRunWorker {
    async fn invoke(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let mut output = WorkerOutput::text(format!(
            "[dry-run] {} ({}): {}",
            request.agent.name, request.permission_mode, request.description
        ));
        if !request.prior_outputs.is_empty() {
            let inputs: Vec<&str> = request.prior_outputs.keys().map(String::as_str).collect();
            output.output.push_str(&format!(" [inputs: {}]", inputs.join(", ")));
        }
        for path in &request.expected_outputs {
            output = output.with_tool_call(
                ToolCallEvent::new("Write", json!({ "path": path }))
                    .with_output(json!({ "dry_run": true })),
            );
        }
        Ok(output)
    }
}
