use crate::types::AgentDescriptor;
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Central registry for all available agents.
///
/// Writers are serialized behind a lock and apply copy-on-write to an
/// immutable [`RegistrySnapshot`]; readers clone the current `Arc` and never
/// observe a half-applied registration.
pub struct AgentRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl AgentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    /// Insert an agent, replacing any previous descriptor with the same name.
    /// A replaced agent keeps its original registration position.
    pub fn register(&self, descriptor: AgentDescriptor) {
        let name = descriptor.name.clone();
        let replaced = {
            let mut guard = self.current.write();
            Arc::make_mut(&mut *guard).insert(descriptor)
        };
        info!(agent = %name, replaced, "Registered agent");
    }

    /// Remove an agent. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = {
            let mut guard = self.current.write();
            if !guard.contains(name) {
                return false;
            }
            Arc::make_mut(&mut *guard).remove(name)
        };
        if removed {
            info!(agent = %name, "Unregistered agent");
        }
        removed
    }

    /// A consistent, immutable view of the registry at this instant.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&*self.current.read())
    }

    /// Look up an agent in the current snapshot.
    pub fn get(&self, name: &str) -> ConductorResult<Arc<AgentDescriptor>> {
        self.snapshot().get(name)
    }

    /// Agents carrying `tag`, in registration order.
    pub fn find_by_capability(&self, tag: &str) -> Vec<Arc<AgentDescriptor>> {
        self.snapshot().find_by_capability(tag)
    }

    /// Agent names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.snapshot().list()
    }

    /// Number of registered agents.
    pub fn agent_count(&self) -> usize {
        self.snapshot().len()
    }

    /// See [`RegistrySnapshot::to_prompt_context`].
    pub fn to_prompt_context(&self) -> String {
        self.snapshot().to_prompt_context()
    }

    /// Register agents from JSON: either a single descriptor object or an array.
    /// Returns the number of descriptors registered.
    pub fn register_from_json(&self, json: &str) -> ConductorResult<usize> {
        let defs: AgentDefinitions = serde_json::from_str(json)?;
        Ok(self.register_all(defs.into_vec()))
    }

    /// Register agents from a `.json` file (object or array) or a `.toml` file
    /// with an `[[agents]]` table array.
    pub fn load_file(&self, path: impl AsRef<Path>) -> ConductorResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let loaded = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => self.register_from_json(&content)?,
            Some("toml") => {
                let file: TomlAgentFile = toml::from_str(&content)?;
                self.register_all(file.agents)
            }
            other => {
                return Err(ConductorError::Config(format!(
                    "unsupported agent definition format '{}' for {}",
                    other.unwrap_or(""),
                    path.display()
                )))
            }
        };
        info!(path = %path.display(), count = loaded, "Loaded agent definitions");
        Ok(loaded)
    }

    fn register_all(&self, descriptors: Vec<AgentDescriptor>) -> usize {
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(descriptor);
        }
        count
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgentDefinitions {
    Many(Vec<AgentDescriptor>),
    One(Box<AgentDescriptor>),
}

impl AgentDefinitions {
    fn into_vec(self) -> Vec<AgentDescriptor> {
        match self {
            AgentDefinitions::Many(v) => v,
            AgentDefinitions::One(d) => vec![*d],
        }
    }
}

#[derive(Deserialize)]
struct TomlAgentFile {
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
}

/// Immutable view of the registry used for plan validation and execution.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    agents: Vec<Arc<AgentDescriptor>>,
    index: HashMap<String, usize>,
}

impl RegistrySnapshot {
    fn insert(&mut self, descriptor: AgentDescriptor) -> bool {
        let descriptor = Arc::new(descriptor);
        match self.index.get(&descriptor.name) {
            Some(&pos) => {
                self.agents[pos] = descriptor;
                true
            }
            None => {
                self.index.insert(descriptor.name.clone(), self.agents.len());
                self.agents.push(descriptor);
                false
            }
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        let Some(pos) = self.index.remove(name) else {
            return false;
        };
        self.agents.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        true
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> ConductorResult<Arc<AgentDescriptor>> {
        self.index
            .get(name)
            .map(|&pos| Arc::clone(&self.agents[pos]))
            .ok_or_else(|| ConductorError::Registry(format!("agent '{name}' not found")))
    }

    /// Agents carrying `tag`, in registration order.
    pub fn find_by_capability(&self, tag: &str) -> Vec<Arc<AgentDescriptor>> {
        self.agents
            .iter()
            .filter(|a| a.has_capability(tag))
            .cloned()
            .collect()
    }

    /// Agent names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    /// Owned copies of every descriptor, in registration order.
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(|a| AgentDescriptor::clone(a)).collect()
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Describe every agent for inclusion in a decomposition prompt.
    pub fn to_prompt_context(&self) -> String {
        if self.agents.is_empty() {
            return "No agents registered.".to_string();
        }
        let mut out = String::from("AVAILABLE AGENTS:\n\n");
        for agent in &self.agents {
            let caps: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
            let tools: Vec<&str> = agent.tools.iter().map(String::as_str).collect();
            out.push_str(&format!("• {}\n", agent.name));
            out.push_str(&format!("  Description: {}\n", agent.description));
            out.push_str(&format!("  Capabilities: {}\n", caps.join(", ")));
            out.push_str(&format!("  Tools: {}\n\n", tools.join(", ")));
        }
        out
    }
}
