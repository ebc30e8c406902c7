use crate::agent::session::ChatSession;
use crate::errors::{ScoutError, ScoutResult};
use crate::llm::types::{ToolCall, ToolDef};

/// Loads built-in tool definitions from the prompts/tools/builtin.json file.
/// The JSON is embedded at compile time via include_str!.
pub fn load_builtin_tools() -> ScoutResult<Vec<ToolDef>> {
    let json = include_str!("../../prompts/tools/builtin.json");
    serde_json::from_str(json)
        .map_err(|e| ScoutError::Config(format!("Failed to parse builtin tools: {e}")))
}

/// Tools that modify session state need a human in the loop; read-only tools
/// run immediately.
pub fn requires_confirmation(tool_name: &str) -> bool {
    matches!(tool_name, "clear_history")
}

/// Execute a tool call against the session, returning the text fed back to
/// the model as the tool result.
pub fn execute_tool(session: &mut ChatSession, tc: &ToolCall) -> ScoutResult<String> {
    match tc.function.name.as_str() {
        "get_local_time" => Ok(chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()),
        "clear_history" => {
            // Keep the system prompt and the assistant message announcing
            // this very call so the call/result pair stays coherent.
            session.messages.retain(|m| {
                m.role == "system"
                    || m.tool_calls
                        .as_ref()
                        .is_some_and(|calls| calls.iter().any(|c| c.id == tc.id))
            });
            Ok("Conversation history cleared.".into())
        }
        other => Err(ScoutError::Agent(format!("unknown tool: {other}"))),
    }
}
