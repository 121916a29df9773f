use crate::registry::AgentRegistry;
use crate::types::AgentDescriptor;

/// The built-in agent roster: researcher, analyst, writer and coder.
pub fn default_agents() -> Vec<AgentDescriptor> {
    vec![
        web_researcher(),
        data_analyst(),
        technical_writer(),
        code_generator(),
    ]
}

/// A registry pre-populated with [`default_agents`].
pub fn default_registry() -> AgentRegistry {
    let registry = AgentRegistry::new();
    for agent in default_agents() {
        registry.register(agent);
    }
    registry
}

fn web_researcher() -> AgentDescriptor {
    AgentDescriptor::new(
        "web-researcher",
        "Searches the web and gathers information from online sources",
    )
    .with_tools(["WebSearch", "WebFetch", "Write", "Read"])
    .with_capabilities(["web-search", "information-gathering", "research"])
    .with_system_prompt(WEB_RESEARCHER_PROMPT)
}

fn data_analyst() -> AgentDescriptor {
    AgentDescriptor::new(
        "data-analyst",
        "Analyzes data, creates visualizations, and generates insights",
    )
    .with_tools(["Read", "Write", "Bash"])
    .with_capabilities(["data-analysis", "visualization", "statistics"])
    .with_system_prompt(DATA_ANALYST_PROMPT)
}

fn technical_writer() -> AgentDescriptor {
    AgentDescriptor::new(
        "technical-writer",
        "Creates documentation, reports, and technical content",
    )
    .with_tools(["Read", "Write"])
    .with_capabilities(["documentation", "writing", "content-creation"])
    .with_system_prompt(TECHNICAL_WRITER_PROMPT)
}

fn code_generator() -> AgentDescriptor {
    AgentDescriptor::new(
        "code-generator",
        "Writes code in various programming languages",
    )
    .with_tools(["Write", "Read", "Bash"])
    .with_capabilities(["coding", "programming", "software-development"])
    .with_system_prompt(CODE_GENERATOR_PROMPT)
}

const WEB_RESEARCHER_PROMPT: &str = "\
You are a web research specialist. \
Your job is to search the web, find relevant information, and compile findings.

Rules:
1. Prefer primary sources and cite every source you use.
2. Save your research to markdown files for downstream agents.
3. Summarize findings before returning.
";

const DATA_ANALYST_PROMPT: &str = "\
You are a data analysis specialist. \
Your job is to analyze data, create visualizations, and generate actionable insights.

Rules:
1. Read every input file named in your instructions before analyzing.
2. Use scripts for anything beyond simple arithmetic.
3. Save results in a machine-readable format (JSON or CSV).
";

const TECHNICAL_WRITER_PROMPT: &str = "\
You are a technical writing specialist. \
Your job is to create clear, well-structured documentation and reports.

Rules:
1. Organize content logically with proper markdown headings.
2. Write for clarity and accessibility.
3. Save the final document to the file named in your instructions.
";

const CODE_GENERATOR_PROMPT: &str = "\
You are a software development specialist. \
Your job is to write clean, well-documented, production-ready code.

Rules:
1. Follow the conventions of the surrounding project.
2. Handle errors explicitly.
3. Keep code simple and avoid premature abstractions.
";
