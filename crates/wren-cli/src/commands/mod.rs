//! Slash commands for interactive mode

use wren_agent::{Agent, TokenUsage};
use wren_ai::ToolSpec;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Clear the conversation
    Clear,
    /// Summarize older history now
    Compact,
    /// Show a message to the user (not sent to agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, agent: &Agent) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),
        "clear" | "c" => CommandResult::Clear,
        "usage" | "u" => CommandResult::Message(usage_message(&agent.usage())),
        "compact" => CommandResult::Compact,
        "tools" => CommandResult::Message(tools_message(&agent.tool_specs())),
        "quit" | "exit" | "q" => CommandResult::Exit,
        _ => CommandResult::Unknown(command),
    })
}

pub fn usage_message(usage: &TokenUsage) -> String {
    let mut msg = format!(
        "Context: ~{} / {} tokens ({:.1}%)",
        usage.current_tokens, usage.max_tokens, usage.percentage_used
    );
    if usage.should_summarize {
        msg.push_str("\nOlder messages will be summarized before the next request.");
    }
    msg
}

fn tools_message(specs: &[ToolSpec]) -> String {
    if specs.is_empty() {
        return "No tools available.".to_string();
    }
    let mut msg = String::from("Available tools:");
    for spec in specs {
        msg.push_str(&format!("\n  {:<16} {}", spec.name, spec.description));
    }
    msg
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /usage, /u           Show how much of the context window is used
  /compact             Summarize older messages now
  /tools               List available tools
  /clear, /c           Clear conversation history
  /quit, /exit, /q     Exit wren

Press Ctrl-C while a request is running to abort it."#
        .to_string()
}
