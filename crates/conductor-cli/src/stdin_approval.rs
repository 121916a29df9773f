use async_trait::async_trait;
use conductor_core::{ApprovalDecision, ConductorResult};
use conductor_orchestrator::{PlanApprover, PlanGraph};
use std::time::Duration;

/// Interactive plan approver: prints the plan to stderr and reads the
/// decision from stdin. Stdout stays free for the JSON result.
pub struct StdinApprover {
    timeout: Duration,
}

impl StdinApprover {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for StdinApprover {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// Full prompt shown before level 0, with ANSI emphasis on the frame.
pub fn format_plan_prompt(task: &str, rendered_plan: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("\n\x1b[1;37m╔══ PLAN APPROVAL REQUIRED ══╗\x1b[0m\n");
    prompt.push_str(&format!("  Task:  {task}\n\n"));
    for line in rendered_plan.lines() {
        prompt.push_str(&format!("  {line}\n"));
    }
    prompt.push_str("\x1b[1;37m╚════════════════════════════╝\x1b[0m\n");
    prompt.push_str("  Approve? [y/N/reason]: ");
    prompt
}

/// `y`/`yes` approves; anything else rejects, free text becoming the reason.
pub fn parse_approval_input(input: &str) -> (bool, Option<String>) {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "y" | "yes" => (true, None),
        "n" | "no" | "" => (false, None),
        _ => (false, Some(trimmed.to_string())),
    }
}

#[async_trait]
impl PlanApprover for StdinApprover {
    async fn review_plan(&self, task: &str, plan: &PlanGraph) -> ConductorResult<ApprovalDecision> {
        eprint!("{}", format_plan_prompt(task, &plan.render()));

        let result = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(|| {
                let mut input = String::new();
                std::io::stdin().read_line(&mut input).map(|_| input)
            }),
        )
        .await;

        let reviewer = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "cli-user".to_string());

        let decision = match result {
            Ok(Ok(Ok(input))) => {
                let (approved, reason) = parse_approval_input(&input);
                ApprovalDecision {
                    approved,
                    reason,
                    reviewer,
                }
            }
            Ok(_) => ApprovalDecision::reject(reviewer, "stdin read error"),
            Err(_) => ApprovalDecision::reject(
                reviewer,
                format!("no answer within {}s", self.timeout.as_secs()),
            ),
        };
        let label = if decision.approved { "APPROVED" } else { "DENIED" };
        eprintln!("  → {label}\n");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approval_input() {
        assert_eq!(parse_approval_input("y\n"), (true, None));
        assert_eq!(parse_approval_input("  YES "), (true, None));
        assert_eq!(parse_approval_input("\n"), (false, None));
        assert_eq!(parse_approval_input("no"), (false, None));
        assert_eq!(
            parse_approval_input("Drop step 3 first\n"),
            (false, Some("Drop step 3 first".to_string()))
        );
    }

    #[test]
    fn test_prompt_contains_plan() {
        let prompt = format_plan_prompt("ship", "Plan: 1 subtasks in 1 levels\nLevel 0:");
        assert!(prompt.contains("Task:  ship"));
        assert!(prompt.contains("  Level 0:"));
        assert!(prompt.ends_with("[y/N/reason]: "));
    }
}
