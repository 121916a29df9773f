//! `conductor` command-line front-end.

mod dry_run;
mod stdin_approval;

use clap::{Parser, Subcommand};
use conductor_core::PermissionMode;
use conductor_orchestrator::{
    default_registry, AgentRegistry, ExecutionStatus, Orchestrator, OrchestratorConfig,
    StaticDecomposer,
};
use dry_run::DryRunWorker;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stdin_approval::StdinApprover;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "conductor.toml";

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor — dependency-aware multi-agent orchestration")]
struct Cli {
    /// Path to config file (default: conductor.toml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra agent definitions (JSON or TOML), loaded after the built-in roster
    #[arg(long)]
    agents: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the agent registry
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Validate a plan file and print its levels
    Plan {
        /// Plan file: an array of subtasks or an object with a `subtasks` array
        file: PathBuf,
    },
    /// Execute a plan file with the dry-run worker and print the result as JSON
    Run {
        /// Plan file: an array of subtasks or an object with a `subtasks` array
        file: PathBuf,
        /// Task description recorded in the result
        #[arg(short, long)]
        task: String,
        /// Permission mode (plan, acceptEdits, default, bypassPermissions); overrides config
        #[arg(short, long)]
        mode: Option<PermissionMode>,
        /// Print the per-agent activity report to stderr
        #[arg(long)]
        report: bool,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List registered agents
    List,
    /// List agents carrying a capability tag
    Find {
        capability: String,
    },
    /// Print the agent listing handed to decomposers
    Context,
}

#[derive(Deserialize, Default)]
struct ConductorConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    /// Agent definitions file, relative to the config file.
    #[serde(default)]
    agents_file: Option<PathBuf>,
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<(ConductorConfig, PathBuf)> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    let config_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    if explicit.is_none() && !path.exists() {
        return Ok((ConductorConfig::default(), config_dir));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
    })?;
    let config: ConductorConfig = toml::from_str(&raw)?;
    config.orchestrator.validate()?;
    Ok((config, config_dir))
}

fn build_registry(
    config: &ConductorConfig,
    config_dir: &Path,
    extra: Option<&Path>,
) -> anyhow::Result<AgentRegistry> {
    let registry = default_registry();
    if let Some(file) = &config.agents_file {
        let count = registry.load_file(config_dir.join(file))?;
        info!(count, "Agents loaded from config");
    }
    if let Some(file) = extra {
        let count = registry.load_file(file)?;
        info!(count, "Agents loaded from --agents");
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let (config, config_dir) = load_config(cli.config.as_deref())?;
    let registry = Arc::new(build_registry(&config, &config_dir, cli.agents.as_deref())?);

    match cli.command {
        Commands::Agents { action } => {
            match action {
                AgentsAction::List => {
                    let snapshot = registry.snapshot();
                    for name in snapshot.list() {
                        if let Ok(agent) = snapshot.get(&name) {
                            println!("{:<20} {}", agent.name, agent.description);
                        }
                    }
                }
                AgentsAction::Find { capability } => {
                    let found = registry.find_by_capability(&capability);
                    if found.is_empty() {
                        println!("No agents with capability '{capability}'.");
                    }
                    for agent in found {
                        println!("{:<20} {}", agent.name, agent.description);
                    }
                }
                AgentsAction::Context => println!("{}", registry.to_prompt_context()),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan { file } => {
            let decomposer = StaticDecomposer::load_file(&file)?;
            let orchestrator =
                Orchestrator::new(registry, Arc::new(decomposer), Arc::new(DryRunWorker))
                    .with_config(config.orchestrator);
            let plan = orchestrator.plan("").await?;
            print!("{}", plan.render());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            file,
            task,
            mode,
            report,
        } => {
            let mut orchestrator_config = config.orchestrator;
            if let Some(mode) = mode {
                orchestrator_config.permission_mode = mode;
            }
            info!(
                task = %task,
                mode = %orchestrator_config.permission_mode,
                "Starting dry run"
            );

            let decomposer = StaticDecomposer::load_file(&file)?;
            let orchestrator =
                Orchestrator::new(registry, Arc::new(decomposer), Arc::new(DryRunWorker))
                    .with_config(orchestrator_config)
                    .with_approver(Arc::new(StdinApprover::default()));

            let cancel = orchestrator.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let result = orchestrator.run(&task).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if report {
                eprint!("{}", result.activity_report());
            }
            info!("{}", result.summary());

            Ok(match result.status {
                ExecutionStatus::Completed => ExitCode::SUCCESS,
                ExecutionStatus::Failed | ExecutionStatus::Cancelled => ExitCode::FAILURE,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "conductor", "run", "plan.json", "--task", "report", "--mode", "plan",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { task, mode, .. } => {
                assert_eq!(task, "report");
                assert_eq!(mode, Some(PermissionMode::Plan));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from([
            "conductor", "run", "plan.json", "--task", "x", "--mode", "yolo",
        ])
        .is_err());
    }

    #[test]
    fn test_missing_default_config_is_fine() {
        let (config, _) = load_config(None).unwrap();
        assert!(config.agents_file.is_none());
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/conductor.toml"))).is_err());
    }

    #[test]
    fn test_config_with_agents_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agents.json"),
            r#"[{"name":"critic","description":"Reviews drafts","capabilities":["review"]}]"#,
        )
        .unwrap();
        let config_path = dir.path().join("conductor.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "agents_file = \"agents.json\"\n\n[orchestrator]\npermission_mode = \"acceptEdits\"\nmax_concurrency = 2"
        )
        .unwrap();

        let (config, config_dir) = load_config(Some(&config_path)).unwrap();
        assert_eq!(
            config.orchestrator.permission_mode,
            PermissionMode::AcceptEdits
        );
        assert_eq!(config.orchestrator.max_concurrency, Some(2));

        let registry = build_registry(&config, &config_dir, None).unwrap();
        assert_eq!(registry.agent_count(), 5);
        assert_eq!(registry.find_by_capability("review").len(), 1);
    }

    #[test]
    fn test_invalid_orchestrator_config_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nmax_concurrency = 0").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
