mod bridge;

use bridge::StdinUserInputBridge;
use clap::{Parser, Subcommand};
use common::config::EngineConfig;
use common::types::{ExecutionState, JsonValue, WorkflowDefinition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workflow_engine::{InMemoryDefinitionLoader, PromptProvider, SystemClock, WorkflowEngine, WorkflowValidator};

#[derive(Parser)]
#[command(name = "workflow", version, about = "Workflow execution engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a workflow definition to completion.
    Run {
        workflow: PathBuf,
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, JsonValue)>,
        #[arg(long = "project-folder")]
        project_folder: Option<PathBuf>,
    },
    /// Validate a workflow definition without executing it.
    Validate { workflow: PathBuf },
}

fn parse_var(s: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = s.split_once('=').ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "workflow=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_definition(path: &PathBuf) -> anyhow::Result<WorkflowDefinition> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn prompt_provider() -> Arc<dyn PromptProvider> {
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let anthropic_key = std::env::var("ANTHROPIC_API_KEY").ok();

    if openai_key.is_none() && anthropic_key.is_none() {
        tracing::warn!("no OPENAI_API_KEY/ANTHROPIC_API_KEY configured; agent nodes will use a mock provider");
        return Arc::new(ai_service::MockPromptProvider::default());
    }

    let mut client = ai_service::HttpPromptProvider::new();
    if let Some(key) = openai_key {
        client = client.with_api_key("openai", key);
    }
    if let Some(key) = anthropic_key {
        client = client.with_api_key("anthropic", key);
    }
    Arc::new(client)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { workflow, vars, project_folder } => run_command(workflow, vars, project_folder).await,
        Command::Validate { workflow } => validate_command(workflow),
    }
}

async fn run_command(workflow: PathBuf, vars: Vec<(String, JsonValue)>, project_folder: Option<PathBuf>) -> ExitCode {
    let definition = match load_definition(&workflow) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("failed to load workflow definition: {e}");
            return ExitCode::from(64);
        }
    };

    if let Err(e) = WorkflowValidator::new().validate(&definition) {
        eprintln!("workflow definition is invalid: {e}");
        return ExitCode::from(64);
    }

    let engine = WorkflowEngine::new(
        prompt_provider(),
        Arc::new(InMemoryDefinitionLoader::new()),
        Arc::new(StdinUserInputBridge),
        Arc::new(SystemClock),
        Arc::new(EngineConfig::default()),
    );

    let initial_variables: HashMap<String, JsonValue> = vars.into_iter().collect();
    let project_folder = project_folder.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let result = engine.run_definition(definition, initial_variables, project_folder).await;

    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());

    match result.state {
        ExecutionState::Succeeded => ExitCode::SUCCESS,
        ExecutionState::Cancelled => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

fn validate_command(workflow: PathBuf) -> ExitCode {
    let definition = match load_definition(&workflow) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("failed to load workflow definition: {e}");
            return ExitCode::from(64);
        }
    };

    match WorkflowValidator::new().validate(&definition) {
        Ok(result) => {
            for warning in &result.warnings {
                println!("warning: {warning}");
            }
            if result.valid {
                println!("workflow is valid");
                ExitCode::SUCCESS
            } else {
                for error in &result.errors {
                    eprintln!("error: {error}");
                }
                ExitCode::from(64)
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(64)
        }
    }
}
