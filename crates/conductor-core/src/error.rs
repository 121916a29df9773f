use thiserror::Error;

/// Top-level error type for the Conductor workspace.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// An agent lookup or registration problem.
    #[error("Registry error: {0}")]
    Registry(String),

    /// The proposed plan failed validation. Nothing was scheduled.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// A single worker invocation failed.
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// The approval channel could not produce a decision.
    #[error("Approval error: {0}")]
    Approval(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestration facade (decomposer failures, etc.).
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Plan validation failures. All of them are fatal to the run and are raised
/// before any subtask is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Two proposed subtasks share the same id.
    #[error("duplicate subtask id '{id}'")]
    DuplicateSubtaskId {
        /// The repeated id.
        id: String,
    },

    /// A subtask is assigned to an agent the registry does not know.
    #[error("subtask '{subtask}' is assigned to unknown agent '{agent}'")]
    UnknownAgent {
        /// The offending subtask.
        subtask: String,
        /// The unresolved agent name.
        agent: String,
    },

    /// A subtask depends on an id that is not part of the plan.
    #[error("subtask '{subtask}' depends on unknown subtask '{dependency}'")]
    DanglingDependency {
        /// The offending subtask.
        subtask: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// The dependency graph contains at least one cycle.
    #[error("dependency cycle among subtasks [{}]", ids.join(", "))]
    CyclicDependency {
        /// Sorted ids of every subtask that lies on a cycle.
        ids: Vec<String>,
    },
}

/// Failure of a single worker invocation. Local to its subtask: siblings keep
/// running and only dependents are skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker reported an error.
    #[error("{0}")]
    Failed(String),

    /// The caller-supplied deadline for this call expired.
    #[error("timed out after {after_ms}ms")]
    Timeout {
        /// The deadline that expired, in milliseconds.
        after_ms: u64,
    },
}

impl WorkerError {
    /// Convenience constructor for [`WorkerError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        WorkerError::Failed(reason.into())
    }

    /// Whether this failure is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Timeout { .. })
    }
}
