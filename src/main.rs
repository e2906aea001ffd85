use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;

use aic_flow::flow::config::FlowConfig;
use aic_flow::flow::nodes::{invoke, CodeNode};
use aic_flow::flow::script::Sandbox;
use aic_flow::flow::state::State;
use aic_flow::flow::workflow::runner::failed_nodes;
use aic_flow::flow::workflow::{NodeFactory, WorkflowLoader, WorkflowRunner};

use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file and print the final state
    Run {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Invoke all nodes against the initial state at once
        #[arg(long)]
        concurrent: bool,
    },
    /// Run a single code fragment
    Eval {
        /// Fragment source
        #[arg(long)]
        code: String,

        /// Initial state as JSON
        #[arg(short, long, default_value = "{}")]
        state: String,
    },
}

fn load_config(path: Option<&str>) -> Result<FlowConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match path {
        Some(path) => FlowConfig::load(path)?,
        None => FlowConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Run { file, concurrent } => {
            let def = WorkflowLoader::new().load_workflow(&file)?;
            let factory = NodeFactory::new(&config.sandbox);
            let mut workflow = factory.build_workflow(&def)?;
            let runner = WorkflowRunner::new(config.runner.on_error);

            log::info!("Starting workflow: {}", workflow.name);
            let state = if concurrent {
                runner.run_concurrent(&mut workflow.nodes, workflow.state).await?
            } else {
                runner.run(&mut workflow.nodes, workflow.state).await?
            };

            let failed = failed_nodes(&state);
            if !failed.is_empty() {
                log::warn!("Nodes failed: {:?}", failed);
            }
            println!("{}", serde_json::to_string_pretty(&state.to_json())?);
        }
        Commands::Eval { code, state } => {
            let initial: Value = serde_json::from_str(&state)?;
            let state = State::from_value(initial)?;
            let sandbox = Arc::new(Sandbox::new(config.sandbox));
            let mut node = CodeNode::new("eval", code, sandbox);

            let wrapped = invoke(&mut node, &state).await?;
            println!("{}", serde_json::to_string_pretty(&wrapped)?);
        }
    }

    Ok(())
}
