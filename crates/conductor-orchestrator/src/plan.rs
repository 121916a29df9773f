use crate::registry::RegistrySnapshot;
use crate::types::{ProposedSubtask, Subtask, SubtaskStatus};
use chrono::Utc;
use conductor_core::PlanError;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

/// A validated dependency DAG of subtasks with its topological leveling.
///
/// Level 0 holds subtasks without dependencies; every subtask on level `k`
/// depends only on subtasks from levels `< k`, so members of one level are
/// mutually independent. After construction only per-subtask status fields
/// change.
#[derive(Debug, Clone)]
pub struct PlanGraph {
    subtasks: Vec<Subtask>,
    index: HashMap<String, usize>,
    dependents: HashMap<String, Vec<String>>,
    levels: Vec<Vec<String>>,
}

impl PlanGraph {
    /// Validate a proposed plan against a registry snapshot.
    ///
    /// Checks run in order and the first failure is returned: duplicate ids,
    /// unknown agents, dangling dependencies, then cycles.
    pub fn build(
        proposed: Vec<ProposedSubtask>,
        registry: &RegistrySnapshot,
    ) -> Result<Self, PlanError> {
        match Self::validate(proposed, registry) {
            Ok(plan) => {
                info!(
                    subtasks = plan.len(),
                    levels = plan.level_count(),
                    "Plan validated"
                );
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "Plan rejected");
                Err(e)
            }
        }
    }

    /// A plan with no subtasks and no levels.
    pub fn empty() -> Self {
        Self {
            subtasks: Vec::new(),
            index: HashMap::new(),
            dependents: HashMap::new(),
            levels: Vec::new(),
        }
    }

    fn validate(
        proposed: Vec<ProposedSubtask>,
        registry: &RegistrySnapshot,
    ) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(proposed.len());
        for (pos, p) in proposed.iter().enumerate() {
            if index.insert(p.id.clone(), pos).is_some() {
                return Err(PlanError::DuplicateSubtaskId { id: p.id.clone() });
            }
        }

        for p in &proposed {
            if !registry.contains(&p.agent) {
                return Err(PlanError::UnknownAgent {
                    subtask: p.id.clone(),
                    agent: p.agent.clone(),
                });
            }
        }

        let mut subtasks: Vec<Subtask> = proposed.into_iter().map(into_subtask).collect();

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for s in &subtasks {
            for dep in &s.depends_on {
                if !index.contains_key(dep) {
                    return Err(PlanError::DanglingDependency {
                        subtask: s.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                dependents.entry(dep.clone()).or_default().push(s.id.clone());
            }
        }

        let levels = compute_levels(&subtasks, &index)?;
        for (level_no, level) in levels.iter().enumerate() {
            for id in level {
                subtasks[index[id]].level = level_no;
            }
        }

        Ok(Self {
            subtasks,
            index,
            dependents,
            levels,
        })
    }

    /// All subtasks in plan order.
    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// Subtask `id`, if present.
    pub fn get(&self, id: &str) -> Option<&Subtask> {
        self.index.get(id).map(|&pos| &self.subtasks[pos])
    }

    /// Current status of subtask `id`.
    pub fn status(&self, id: &str) -> Option<SubtaskStatus> {
        self.get(id).map(|s| s.status)
    }

    /// Subtask ids grouped by level, ascending.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Number of levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of subtasks.
    pub fn len(&self) -> usize {
        self.subtasks.len()
    }

    /// Whether the plan has no subtasks.
    pub fn is_empty(&self) -> bool {
        self.subtasks.is_empty()
    }

    /// Direct dependents of `id`.
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every subtask that directly or indirectly depends on `id`, in plan order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            for dep in self.dependents(current) {
                if seen.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
        self.subtasks
            .iter()
            .filter(|s| seen.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Outputs of the completed dependencies of `id`, keyed by dependency id.
    pub fn prior_outputs(&self, id: &str) -> BTreeMap<String, String> {
        let Some(subtask) = self.get(id) else {
            return BTreeMap::new();
        };
        subtask
            .depends_on
            .iter()
            .filter_map(|dep| self.get(dep))
            .filter(|dep| dep.status == SubtaskStatus::Completed)
            .filter_map(|dep| dep.output.clone().map(|out| (dep.id.clone(), out)))
            .collect()
    }

    /// Apply a status transition. Illegal transitions are refused and logged.
    pub(crate) fn transition(&mut self, id: &str, next: SubtaskStatus) -> bool {
        let Some(&pos) = self.index.get(id) else {
            return false;
        };
        let subtask = &mut self.subtasks[pos];
        if !subtask.status.can_transition_to(next) {
            warn!(
                subtask = %id,
                from = %subtask.status,
                to = %next,
                "Refusing illegal status transition"
            );
            return false;
        }
        subtask.status = next;
        match next {
            SubtaskStatus::Running => subtask.started_at = Some(Utc::now()),
            s if s.is_terminal() => subtask.completed_at = Some(Utc::now()),
            _ => {}
        }
        true
    }

    pub(crate) fn complete(&mut self, id: &str, output: String) -> bool {
        if !self.transition(id, SubtaskStatus::Completed) {
            return false;
        }
        if let Some(&pos) = self.index.get(id) {
            self.subtasks[pos].output = Some(output);
        }
        true
    }

    pub(crate) fn fail(&mut self, id: &str, error: String) -> bool {
        self.close(id, SubtaskStatus::Failed, error)
    }

    pub(crate) fn skip(&mut self, id: &str, reason: String) -> bool {
        self.close(id, SubtaskStatus::Skipped, reason)
    }

    pub(crate) fn cancel(&mut self, id: &str, reason: String) -> bool {
        self.close(id, SubtaskStatus::Cancelled, reason)
    }

    fn close(&mut self, id: &str, status: SubtaskStatus, reason: String) -> bool {
        if !self.transition(id, status) {
            return false;
        }
        if let Some(&pos) = self.index.get(id) {
            self.subtasks[pos].error = Some(reason);
        }
        true
    }

    /// Human-readable plan, as shown to an approver.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Plan: {} subtasks in {} levels\n",
            self.len(),
            self.level_count()
        );
        for (level_no, level) in self.levels.iter().enumerate() {
            out.push_str(&format!("\nLevel {level_no}:\n"));
            for id in level {
                let Some(s) = self.get(id) else { continue };
                out.push_str(&format!("  [{}] {} - {}\n", s.id, s.assigned_agent, s.description));
                if !s.depends_on.is_empty() {
                    out.push_str(&format!("      depends on: {}\n", s.depends_on.join(", ")));
                }
                if !s.expected_outputs.is_empty() {
                    out.push_str(&format!("      expects: {}\n", s.expected_outputs.join(", ")));
                }
            }
        }
        out
    }
}

fn into_subtask(p: ProposedSubtask) -> Subtask {
    let mut depends_on: Vec<String> = Vec::with_capacity(p.depends_on.len());
    for dep in p.depends_on {
        if !depends_on.contains(&dep) {
            depends_on.push(dep);
        }
    }
    Subtask {
        id: p.id,
        description: p.description,
        assigned_agent: p.agent,
        depends_on,
        expected_outputs: p.expected_outputs,
        status: SubtaskStatus::Pending,
        level: 0,
        output: None,
        error: None,
        started_at: None,
        completed_at: None,
    }
}

/// Kahn's algorithm, one level per round of zero in-degree removals.
///
/// Each round's frontier is built only from children whose in-degree just
/// dropped to zero, so the whole pass is `O(V + E)` (plus sorting each level
/// back into plan order).
fn compute_levels(
    subtasks: &[Subtask],
    index: &HashMap<String, usize>,
) -> Result<Vec<Vec<String>>, PlanError> {
    let n = subtasks.len();
    let mut in_degree: Vec<usize> = subtasks.iter().map(|s| s.depends_on.len()).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (pos, s) in subtasks.iter().enumerate() {
        for dep in &s.depends_on {
            children[index[dep]].push(pos);
        }
    }

    let mut frontier: Vec<usize> = (0..n).filter(|&pos| in_degree[pos] == 0).collect();
    let mut placed = 0;
    let mut levels = Vec::new();

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &pos in &frontier {
            for &child in &children[pos] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    next.push(child);
                }
            }
        }
        placed += frontier.len();
        levels.push(frontier.iter().map(|&pos| subtasks[pos].id.clone()).collect());
        next.sort_unstable();
        frontier = next;
    }

    if placed < n {
        let leftover: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        return Err(PlanError::CyclicDependency {
            ids: cyclic_ids(subtasks, index, &leftover),
        });
    }
    Ok(levels)
}

/// Ids lying on a cycle among the subtasks Kahn could not place.
///
/// Leftover nodes also include subtasks that merely depend on a cycle, so the
/// strongly connected components of the leftover subgraph are computed and only
/// components with more than one node (or a self-loop) are reported.
fn cyclic_ids(subtasks: &[Subtask], index: &HashMap<String, usize>, leftover: &[bool]) -> Vec<String> {
    let n = subtasks.len();
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (pos, s) in subtasks.iter().enumerate() {
        if !leftover[pos] {
            continue;
        }
        for dep in &s.depends_on {
            let target = index[dep];
            if leftover[target] {
                edges[pos].push(target);
            }
        }
    }

    let mut tarjan = Tarjan::new(&edges);
    for pos in 0..n {
        if leftover[pos] && tarjan.index[pos].is_none() {
            tarjan.run_from(pos);
        }
    }

    let mut ids: Vec<String> = tarjan
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || edges[c[0]].contains(&c[0]))
        .flatten()
        .map(|pos| subtasks[pos].id.clone())
        .collect();
    ids.sort();
    ids
}

/// Tarjan's SCC search driven by an explicit frame stack, so depth is bounded
/// by the heap rather than the thread stack.
struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        }
    }

    fn enter(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.lowlink[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    fn run_from(&mut self, root: usize) {
        let edges = self.edges;
        // (node, next edge to explore)
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
        self.enter(root);

        while let Some(frame) = frames.last_mut() {
            let (v, edge) = *frame;
            if let Some(&w) = edges[v].get(edge) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.enter(w);
                        frames.push((w, 0));
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
            if let Some(&(parent, _)) = frames.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::AgentRegistry;
    use crate::types::AgentDescriptor;
    use std::sync::Arc;

    fn registry() -> Arc<RegistrySnapshot> {
        let registry = AgentRegistry::new();
        registry.register(AgentDescriptor::new("researcher", "Researches"));
        registry.register(AgentDescriptor::new("writer", "Writes"));
        registry.snapshot()
    }

    fn task(id: &str, deps: &[&str]) -> ProposedSubtask {
        ProposedSubtask::new(id, format!("do {id}"), "researcher").depends_on(deps.iter().copied())
    }

    #[test]
    fn test_diamond_levels() {
        let plan = PlanGraph::build(
            vec![
                task("A", &[]),
                task("B", &["A"]),
                task("C", &["A"]),
                task("D", &["B", "C"]),
            ],
            &registry(),
        )
        .unwrap();

        assert_eq!(
            plan.levels(),
            &[
                vec!["A".to_string()],
                vec!["B".to_string(), "C".to_string()],
                vec!["D".to_string()],
            ]
        );
        assert_eq!(plan.get("D").unwrap().level, 2);
        assert_eq!(plan.dependents("A"), &["B".to_string(), "C".to_string()]);
        assert_eq!(plan.transitive_dependents("A"), vec!["B", "C", "D"]);
        assert!(plan.transitive_dependents("D").is_empty());
    }

    #[test]
    fn test_levels_exceed_dependency_levels() {
        let plan = PlanGraph::build(
            vec![
                task("e", &["d", "a"]),
                task("a", &[]),
                task("b", &["a"]),
                task("c", &[]),
                task("d", &["b", "c"]),
                task("f", &["a"]),
            ],
            &registry(),
        )
        .unwrap();

        for s in plan.subtasks() {
            for dep in &s.depends_on {
                assert!(s.level > plan.get(dep).unwrap().level, "{} vs {dep}", s.id);
            }
        }
        let flat: usize = plan.levels().iter().map(Vec::len).sum();
        assert_eq!(flat, plan.len());
    }

    #[test]
    fn test_empty_plan() {
        let plan = PlanGraph::build(Vec::new(), &registry()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.level_count(), 0);
    }

    #[test]
    fn test_duplicate_id() {
        let err = PlanGraph::build(vec![task("A", &[]), task("A", &[])], &registry()).unwrap_err();
        assert_eq!(err, PlanError::DuplicateSubtaskId { id: "A".into() });
    }

    #[test]
    fn test_unknown_agent() {
        let proposed = vec![ProposedSubtask::new("A", "paint", "painter")];
        let err = PlanGraph::build(proposed, &registry()).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownAgent {
                subtask: "A".into(),
                agent: "painter".into()
            }
        );
    }

    #[test]
    fn test_dangling_dependency() {
        let err = PlanGraph::build(vec![task("A", &["ghost"])], &registry()).unwrap_err();
        assert_eq!(
            err,
            PlanError::DanglingDependency {
                subtask: "A".into(),
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn test_cycle_names_only_cycle_members() {
        // root -> (x <-> y) -> tail; tail only depends on the cycle.
        let err = PlanGraph::build(
            vec![
                task("root", &[]),
                task("x", &["root", "y"]),
                task("y", &["x"]),
                task("tail", &["y"]),
            ],
            &registry(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::CyclicDependency {
                ids: vec!["x".into(), "y".into()]
            }
        );
    }

    #[test]
    fn test_self_loop_and_two_cycles() {
        let err = PlanGraph::build(
            vec![
                task("s", &["s"]),
                task("a", &["c"]),
                task("b", &["a"]),
                task("c", &["b"]),
                task("bridge", &["a"]),
            ],
            &registry(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::CyclicDependency {
                ids: vec!["a".into(), "b".into(), "c".into(), "s".into()]
            }
        );
    }

    #[test]
    fn test_node_between_two_cycles_is_not_reported() {
        // (a <-> b) -> mid -> (c <-> d)
        let err = PlanGraph::build(
            vec![
                task("a", &["b"]),
                task("b", &["a"]),
                task("mid", &["a"]),
                task("c", &["mid", "d"]),
                task("d", &["c"]),
            ],
            &registry(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::CyclicDependency {
                ids: vec!["a".into(), "b".into(), "c".into(), "d".into()]
            }
        );
    }

    #[test]
    fn test_very_long_cycle_is_an_error() {
        let n = 150_000;
        let proposed: Vec<ProposedSubtask> = (0..n)
            .map(|i| {
                let dep = format!("t{}", (i + 1) % n);
                ProposedSubtask::new(format!("t{i}"), "step", "researcher").depends_on([dep])
            })
            .collect();
        match PlanGraph::build(proposed, &registry()).unwrap_err() {
            PlanError::CyclicDependency { ids } => assert_eq!(ids.len(), n),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_long_chain_levels() {
        let n = 30_000;
        let proposed: Vec<ProposedSubtask> = (0..n)
            .map(|i| {
                let p = ProposedSubtask::new(format!("t{i}"), "step", "researcher");
                if i == 0 {
                    p
                } else {
                    p.depends_on([format!("t{}", i - 1)])
                }
            })
            .collect();
        let started = std::time::Instant::now();
        let plan = PlanGraph::build(proposed, &registry()).unwrap();
        assert_eq!(plan.level_count(), n);
        assert_eq!(plan.get("t29999").unwrap().level, n - 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_duplicate_dependencies_are_collapsed() {
        let plan =
            PlanGraph::build(vec![task("A", &[]), task("B", &["A", "A"])], &registry()).unwrap();
        assert_eq!(plan.get("B").unwrap().depends_on, vec!["A".to_string()]);
        assert_eq!(plan.level_count(), 2);
    }

    #[test]
    fn test_transitions_and_prior_outputs() {
        let mut plan =
            PlanGraph::build(vec![task("A", &[]), task("B", &["A"])], &registry()).unwrap();

        assert!(!plan.transition("A", SubtaskStatus::Running));
        assert!(plan.transition("A", SubtaskStatus::Ready));
        assert!(plan.transition("A", SubtaskStatus::Running));
        assert!(plan.get("A").unwrap().started_at.is_some());
        assert!(plan.complete("A", "notes.md".into()));
        assert!(!plan.fail("A", "late".into()));

        let prior = plan.prior_outputs("B");
        assert_eq!(prior.get("A").map(String::as_str), Some("notes.md"));
    }

    #[test]
    fn test_render_lists_levels() {
        let plan = PlanGraph::build(
            vec![
                task("A", &[]),
                ProposedSubtask::new("B", "write report", "writer")
                    .depends_on(["A"])
                    .expecting("report.md"),
            ],
            &registry(),
        )
        .unwrap();
        let text = plan.render();
        assert!(text.starts_with("Plan: 2 subtasks in 2 levels"));
        assert!(text.contains("Level 1:"));
        assert!(text.contains("[B] writer - write report"));
        assert!(text.contains("depends on: A"));
        assert!(text.contains("expects: report.md"));
    }
}
