//! Prompt text for orchestrator decisions and the final answer

use wren_ai::ToolSpec;

use crate::task::Task;

pub(crate) const DECISION_SYSTEM_PROMPT: &str = "\
You are the planning component of a terminal assistant that can run tools. \
You never talk to the user directly. You answer every request with a single JSON object \
in exactly the shape asked for, with no other text.";

const SHOULD_PLAN_PROMPT: &str = "\
Decide whether the user's request needs a multi-step plan that runs tools, or whether it \
can be answered directly from the conversation.

Plan when the request needs information from the filesystem or the system, needs files to \
be created or changed, or needs several dependent steps. Answer directly for greetings, \
general questions and anything the conversation already covers.

Available tools:
{tools}

Recent conversation:
{history}

User request:
{request}

Respond with JSON: {\"shouldPlan\": true|false, \"reasoning\": \"one or two sentences\"}";

const CREATE_PLAN_PROMPT: &str = "\
Break the user's request into an ordered list of tasks. Each task either runs exactly one \
of the available tools or is a reasoning step with no tool. Use only the tools listed. \
Give tool inputs that match each tool's parameter schema.

Available tools:
{tools}

Recent conversation:
{history}

User request:
{request}

Respond with JSON:
{\"thinking\": \"how you approached the plan\",
 \"tasks\": [{\"id\": \"task-1\", \"description\": \"what this step does\", \
\"toolName\": \"tool name or null\", \"toolInput\": {}}]}";

const REFLECT_PROMPT: &str = "\
Review the tasks run so far for the user's request and decide whether the results are \
enough to answer it. If they are not, propose the additional tasks still needed. Do not \
repeat tasks that already succeeded.

Available tools:
{tools}

User request:
{request}

Tasks so far:
{tasks}

Respond with JSON:
{\"isComplete\": true|false, \"reasoning\": \"why\", \"issues\": [\"problems seen\"],
 \"nextActions\": [{\"id\": \"task-N\", \"description\": \"...\", \"toolName\": \"tool name or null\", \
\"toolInput\": {}}]}";

const FINAL_ANSWER_PROMPT: &str = "\
You have finished working on my last request. Here is what was done:

{tasks}

Using these results, write the final answer to my request: {request}
Answer me directly. Mention anything that failed or was not done.";

pub(crate) fn should_plan(request: &str, tools: &[ToolSpec], history: &[String]) -> String {
    SHOULD_PLAN_PROMPT
        .replace("{tools}", &render_tools(tools))
        .replace("{history}", &render_history(history))
        .replace("{request}", request)
}

pub(crate) fn create_plan(request: &str, tools: &[ToolSpec], history: &[String]) -> String {
    CREATE_PLAN_PROMPT
        .replace("{tools}", &render_tools(tools))
        .replace("{history}", &render_history(history))
        .replace("{request}", request)
}

pub(crate) fn reflect(
    request: &str,
    tasks: &[Task],
    tools: &[ToolSpec],
    preview_chars: usize,
) -> String {
    REFLECT_PROMPT
        .replace("{tools}", &render_tools(tools))
        .replace("{tasks}", &render_tasks(tasks, preview_chars))
        .replace("{request}", request)
}

pub(crate) fn final_answer(request: &str, tasks: &[Task], preview_chars: usize) -> String {
    FINAL_ANSWER_PROMPT
        .replace("{tasks}", &render_tasks(tasks, preview_chars))
        .replace("{request}", request)
}

fn render_tools(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return "(none)".to_string();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}\n  parameters: {}", t.name, t.description, t.parameters))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_history(history: &[String]) -> String {
    if history.is_empty() {
        "(empty)".to_string()
    } else {
        history.join("\n")
    }
}

/// One block per task: status, tool call, and a capped result preview.
pub(crate) fn render_tasks(tasks: &[Task], preview_chars: usize) -> String {
    if tasks.is_empty() {
        return "(no tasks)".to_string();
    }
    let mut out = String::new();
    for task in tasks {
        let status = match (task.is_completed(), task.successful()) {
            (false, _) => "not executed",
            (true, Some(false)) => "failed",
            (true, _) => "succeeded",
        };
        out.push_str(&format!("[{}] {} ({})\n", task.id(), task.description(), status));
        if let Some(name) = task.tool_name() {
            let input = task
                .tool_input()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "{}".to_string());
            out.push_str(&format!("  tool: {} {}\n", name, input));
        }
        if let Some(result) = task.result_preview(preview_chars) {
            out.push_str("  result: ");
            out.push_str(&result);
            out.push('\n');
        }
    }
    out
}
