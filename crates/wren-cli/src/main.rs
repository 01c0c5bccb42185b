//! wren - terminal chat client that plans, runs tools and answers

mod commands;
mod config;
mod tools;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;
use wren_agent::{Agent, AgentEvent, AgentHandle, ThinkingStep, ToolExecutor, ToolRegistry};
use wren_ai::{ClientConfig, OpenAiClient};

/// wren - terminal chat client that plans, runs tools and answers
#[derive(Parser, Debug)]
#[command(name = "wren")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Maximum execute/reflect rounds per request (default: 5)
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Working directory
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("wren=debug,wren_agent=debug,wren_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.init_config {
        let path = config::Config::init().context("creating config file")?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();

    if let Some(ref dir) = args.working_dir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("changing to working directory {}", dir))?;
    }

    // CLI takes precedence over the config file
    let model = args.model.clone().unwrap_or_else(|| cfg.model().to_string());
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| cfg.base_url().to_string());

    let mut client_config = ClientConfig::new(base_url, model.clone());
    match cfg.api_key() {
        Some(key) => client_config = client_config.with_api_key(key),
        None => tracing::warn!(
            "No API key found in the config file, WREN_API_KEY or OPENAI_API_KEY; sending unauthenticated requests"
        ),
    }
    let client = Arc::new(OpenAiClient::new(client_config));

    let registry = tools::registry();
    let system_prompt = match cfg.system_prompt_file {
        Some(ref file) => {
            let path = utils::expand_path(file);
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading system prompt file {}", path.display()))?
        }
        None => build_system_prompt(&registry),
    };

    let agent_config = cfg.agent_config(system_prompt, &model, args.max_iterations);
    let mut agent = Agent::new(agent_config, client, Arc::new(registry));
    tokio::spawn(watch_interrupts(agent.handle()));

    if let Some(command) = args.command {
        return run_command(&mut agent, &command).await;
    }

    run_interactive(&mut agent, &model).await
}

/// Build the default system prompt from the registered tools
fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(
        "You are wren, a terminal assistant. You can inspect and change the local machine \
         through tools that run on the user's behalf.\n\n",
    );

    let specs = registry.specs();
    if !specs.is_empty() {
        prompt.push_str("Tools:\n");
        for spec in &specs {
            prompt.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        }
        prompt.push('\n');
    }

    prompt.push_str("Guidelines:\n");
    prompt.push_str("- Be concise and helpful\n");
    prompt.push_str("- Base answers on tool results when they are available\n");
    prompt.push_str("- Say plainly when something failed\n");

    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string());
    prompt.push_str(&format!("\nWorking directory: {}", cwd));
    prompt
}

/// What a Ctrl-C does right now
#[derive(Debug, PartialEq)]
enum Interrupt {
    /// A turn was running and has been aborted
    Aborted,
    /// Nothing was running; leave the program
    Exit,
}

fn interrupt(handle: &AgentHandle) -> Interrupt {
    if handle.is_running() {
        handle.abort();
        Interrupt::Aborted
    } else {
        Interrupt::Exit
    }
}

/// Own SIGINT for the whole session. Once tokio installs its handler the
/// default one is gone, so idle Ctrl-C has to exit explicitly.
async fn watch_interrupts(handle: AgentHandle) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if interrupt(&handle) == Interrupt::Exit {
            eprintln!();
            std::process::exit(130);
        }
    }
}

/// Run one prompt with the event printer attached.
async fn run_turn(agent: &mut Agent, input: &str) -> wren_agent::Result<()> {
    let printer = tokio::spawn(print_events(agent.subscribe()));

    let result = agent.prompt(input).await;

    // The printer stops after the terminal event
    let _ = printer.await;
    result.map(|_| ())
}

async fn run_command(agent: &mut Agent, command: &str) -> anyhow::Result<()> {
    if run_turn(agent, command).await.is_err() {
        // Already reported by the event printer
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(agent: &mut Agent, model: &str) -> anyhow::Result<()> {
    if io::stderr().is_terminal() {
        eprintln!("wren ({}) - /help for commands", model);
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, agent) {
            match result {
                commands::CommandResult::Clear => {
                    agent.clear_messages();
                    println!("Cleared conversation.");
                }
                commands::CommandResult::Compact => {
                    let usage = agent.compact().await;
                    println!("{}", commands::usage_message(&usage));
                }
                commands::CommandResult::Message(msg) => println!("{}", msg),
                commands::CommandResult::Exit => break,
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        println!();
        // Errors are printed by the event printer
        let _ = run_turn(agent, input).await;
        println!();
    }

    Ok(())
}

/// Print events for one turn: answer text to stdout, everything else to stderr.
async fn print_events(mut rx: UnboundedReceiver<AgentEvent>) {
    let dim = io::stderr().is_terminal();
    let mut streamed = false;

    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        match event {
            AgentEvent::TurnStart { .. } => {}
            AgentEvent::TextChunk { text } => {
                print!("{}", text);
                io::stdout().flush().ok();
                streamed = true;
            }
            AgentEvent::ToolUse { name, input, .. } => {
                let args = utils::truncate_chars(&input.to_string(), 80);
                eprintln!("[tool {} {}]", name, args);
            }
            AgentEvent::ToolResult {
                name,
                result,
                is_error,
                ..
            } => {
                let first_line = result.lines().next().unwrap_or("");
                let preview = utils::truncate_chars(first_line, 80);
                if is_error {
                    eprintln!("[tool {} failed: {}]", name, preview);
                } else {
                    eprintln!("[tool {} ok: {}]", name, preview);
                }
            }
            AgentEvent::Thinking { step } => print_thinking(&step, dim),
            AgentEvent::Error { message } => {
                if streamed {
                    println!();
                }
                eprintln!("Error: {}", message);
            }
            AgentEvent::TurnEnd {
                iterations, tasks, ..
            } => {
                println!();
                if tasks > 0 {
                    eprintln!("[{} task(s) in {} round(s)]", tasks, iterations);
                }
            }
        }
        if terminal {
            break;
        }
    }
}

fn print_thinking(step: &ThinkingStep, dim: bool) {
    let line = format!("thinking ({}): {}", step.kind.as_str(), step.content);
    if dim {
        eprintln!("\x1b[2m{}\x1b[0m", line);
    } else {
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;
    use wren_agent::{AgentConfig, Tool, ToolResult};
    use wren_ai::{ChatClient, CompletionOptions, Message, TextStream};

    /// Plans a single `interrupt` task, then answers "done".
    #[derive(Default)]
    struct PlanningClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatClient for PlanningClient {
        async fn complete(&self, _: &[Message], _: &CompletionOptions) -> wren_ai::Result<String> {
            let reply = match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => r#"{"shouldPlan": true, "reasoning": "needs a tool"}"#,
                1 => r#"{"thinking": "", "tasks": [{"id": "t1", "description": "press ctrl-c", "toolName": "interrupt"}]}"#,
                _ => r#"{"isComplete": true}"#,
            };
            Ok(reply.to_string())
        }
        async fn stream(&self, _: &[Message], _: &CompletionOptions) -> wren_ai::Result<TextStream> {
            Ok(wren_ai::stream::from_chunks(["done"]))
        }
    }

    /// Simulates Ctrl-C arriving while the tool runs.
    #[derive(Default)]
    struct InterruptTool {
        handle: Mutex<Option<AgentHandle>>,
        seen: Mutex<Option<Interrupt>>,
    }

    #[async_trait]
    impl Tool for InterruptTool {
        fn name(&self) -> &str {
            "interrupt"
        }
        fn description(&self) -> &str {
            "Presses Ctrl-C"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: Value, _cancel: CancellationToken) -> ToolResult {
            let handle = self.handle.lock().unwrap().clone();
            if let Some(handle) = handle {
                *self.seen.lock().unwrap() = Some(interrupt(&handle));
            }
            ToolResult::text("pressed")
        }
    }

    #[tokio::test]
    async fn test_interrupt_aborts_running_turn_and_exits_when_idle() {
        let tool = Arc::new(InterruptTool::default());
        let registry = ToolRegistry::new().with_tool(tool.clone());
        let mut agent = Agent::new(
            AgentConfig::new("sys", 3),
            Arc::new(PlanningClient::default()),
            Arc::new(registry),
        );
        let handle = agent.handle();
        *tool.handle.lock().unwrap() = Some(handle.clone());

        assert_eq!(interrupt(&handle), Interrupt::Exit);

        let err = agent.prompt("press it").await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*tool.seen.lock().unwrap(), Some(Interrupt::Aborted));

        // Back at the prompt, Ctrl-C leaves instead of being swallowed
        assert_eq!(interrupt(&handle), Interrupt::Exit);
    }
}
