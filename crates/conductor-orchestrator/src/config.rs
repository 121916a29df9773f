use conductor_core::{ConductorError, ConductorResult, PermissionMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Run-level settings for an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Mode handed to workers. `plan` requires approval before execution.
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// Record an activity timeline. When off, results carry no timeline.
    #[serde(default = "default_enable_tracking")]
    pub enable_tracking: bool,
    /// Upper bound on concurrently running subtasks. `None` runs a whole
    /// level at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Per worker call. Expiry fails the subtask with a timeout.
    #[serde(default)]
    pub subtask_timeout_secs: Option<u64>,
    /// Whole-run deadline. Expiry cancels the run.
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
    /// Name recorded as the dispatching agent of every subtask.
    #[serde(default = "default_lead_agent")]
    pub lead_agent: String,
}

fn default_enable_tracking() -> bool {
    true
}

fn default_lead_agent() -> String {
    "lead-orchestrator".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::default(),
            enable_tracking: default_enable_tracking(),
            max_concurrency: None,
            subtask_timeout_secs: None,
            run_deadline_secs: None,
            lead_agent: default_lead_agent(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> ConductorResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConductorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject a zero concurrency cap and an empty lead agent.
    pub fn validate(&self) -> ConductorResult<()> {
        if self.max_concurrency == Some(0) {
            return Err(ConductorError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.lead_agent.trim().is_empty() {
            return Err(ConductorError::Config("lead_agent must not be empty".into()));
        }
        Ok(())
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Turn activity recording on or off.
    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.enable_tracking = enabled;
        self
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// `subtask_timeout_secs` as a `Duration`.
    pub fn subtask_timeout(&self) -> Option<Duration> {
        self.subtask_timeout_secs.map(Duration::from_secs)
    }

    /// `run_deadline_secs` as a `Duration`.
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}
