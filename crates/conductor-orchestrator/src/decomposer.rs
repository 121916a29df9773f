use crate::types::{AgentDescriptor, ProposedSubtask};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Turns a task into a list of proposed subtasks.
///
/// The proposal is untrusted: it is validated into a
/// [`PlanGraph`](crate::PlanGraph) before anything runs.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Propose subtasks for `task`, assigning each to one of `agents`.
    async fn decompose(
        &self,
        task: &str,
        agents: &[AgentDescriptor],
    ) -> ConductorResult<Vec<ProposedSubtask>>;
}

/// Decomposer that always proposes the same, pre-computed subtasks.
#[derive(Debug, Clone, Default)]
pub struct StaticDecomposer {
    subtasks: Vec<ProposedSubtask>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Wrapped { subtasks: Vec<ProposedSubtask> },
    Bare(Vec<ProposedSubtask>),
}

impl StaticDecomposer {
    /// Decomposer returning `subtasks` for every task.
    pub fn new(subtasks: Vec<ProposedSubtask>) -> Self {
        Self { subtasks }
    }

    /// Parse either a bare array of subtasks or an object with a `subtasks`
    /// array.
    pub fn from_json(json: &str) -> ConductorResult<Self> {
        let subtasks = match serde_json::from_str::<PlanFile>(json)? {
            PlanFile::Wrapped { subtasks } | PlanFile::Bare(subtasks) => subtasks,
        };
        Ok(Self::new(subtasks))
    }

    /// Load a plan file in either accepted JSON shape.
    pub fn load_file(path: impl AsRef<Path>) -> ConductorResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::Config(format!("cannot read plan file {}: {e}", path.display()))
        })?;
        let decomposer = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            subtasks = decomposer.subtasks.len(),
            "Loaded static plan"
        );
        Ok(decomposer)
    }

    /// The subtasks proposed for every task.
    pub fn subtasks(&self) -> &[ProposedSubtask] {
        &self.subtasks
    }
}

#[async_trait]
impl Decomposer for StaticDecomposer {
    async fn decompose(
        &self,
        _task: &str,
        _agents: &[AgentDescriptor],
    ) -> ConductorResult<Vec<ProposedSubtask>> {
        Ok(self.subtasks.clone())
    }
}
