use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::cleanup::scrub_incomplete_tool_calls;
use crate::agent::session::ChatSession;
use crate::agent::tools::{execute_tool, load_builtin_tools, requires_confirmation};
use crate::errors::{ScoutError, ScoutResult};
use crate::llm::budget::StepBudget;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, StreamChunk, StreamChunkKind};

/// Step budget for one chat turn (model calls + tool rounds).
pub const CHAT_STEP_BUDGET: u32 = 10;

const CHAT_SYSTEM_PROMPT: &str = "\
You are ScreenScout's assistant. You can call tools to help the user.

Rules:
- Use `get_local_time` when asked about the current date or time.
- `clear_history` erases the conversation; it only runs after the user \
confirms it. Never call it unless the user asked for a reset.
- Keep replies short and concrete.";

/// Run one user turn: scrub the transcript, append the user message, then
/// loop model calls and auto-approved tool executions under the step budget.
/// A confirmation-required tool call parks on the session and ends the turn
/// after a `confirmation_required` chunk is streamed.
pub async fn run_chat_turn(
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
    session: &mut ChatSession,
    user_text: String,
    sink: mpsc::Sender<StreamChunk>,
) -> ScoutResult<()> {
    let tools = load_builtin_tools()?;

    if session.messages.is_empty() {
        session.messages.push(ChatMessage::system(CHAT_SYSTEM_PROMPT));
    }
    // A new user message abandons any confirmation still pending.
    session.pending = None;
    scrub_incomplete_tool_calls(&mut session.messages);
    session.messages.push(ChatMessage::user(user_text));

    let mut budget = StepBudget::new(cfg.max_steps);
    while budget.consume() {
        let response = provider
            .chat(session.messages.clone(), tools.clone(), &cfg, Some(sink.clone()))
            .await?;

        let tool_calls = response.tool_calls;
        session.messages.push(ChatMessage::assistant(
            response.content.clone(),
            if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls.clone())
            },
        ));

        if tool_calls.is_empty() {
            return Ok(());
        }

        let mut calls = tool_calls.into_iter();
        while let Some(tc) = calls.next() {
            if requires_confirmation(&tc.function.name) {
                tracing::info!(tool = %tc.function.name, id = %tc.id, "tool call parked for confirmation");
                let payload = serde_json::json!({
                    "tool_call_id": tc.id.clone(),
                    "name": tc.function.name.clone(),
                    "arguments": tc.function.arguments.clone(),
                });
                let _ = sink
                    .send(StreamChunk {
                        kind: StreamChunkKind::ConfirmationRequired,
                        content: payload.to_string(),
                    })
                    .await;
                // Any calls after the parked one get a synthetic result so
                // the transcript stays coherent for the resumed call.
                for skipped in calls.by_ref() {
                    session.messages.push(ChatMessage::tool_result(
                        skipped.id,
                        "Skipped: awaiting confirmation of another tool call.",
                    ));
                }
                session.pending = Some(tc);
                return Ok(());
            }

            tracing::info!(tool = %tc.function.name, id = %tc.id, "executing auto-approved tool");
            let result = execute_tool(session, &tc)?;
            session
                .messages
                .push(ChatMessage::tool_result(tc.id, result));
        }
    }

    tracing::warn!(steps = budget.used(), "chat turn hit step budget before completing");
    Ok(())
}

/// Resolve a parked tool call: execute it on approval, or record a rejection
/// result, then ask the model for one non-streamed follow-up reply.
pub async fn resolve_confirmation(
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
    session: &mut ChatSession,
    tool_call_id: &str,
    approved: bool,
) -> ScoutResult<String> {
    let tc = match session.pending.take() {
        Some(tc) if tc.id == tool_call_id => tc,
        other => {
            session.pending = other;
            return Err(ScoutError::Agent(format!(
                "no pending tool call with id '{tool_call_id}'"
            )));
        }
    };

    let result = if approved {
        execute_tool(session, &tc)?
    } else {
        tracing::info!(tool = %tc.function.name, id = %tc.id, "tool call rejected by user");
        "Tool call rejected by the user.".to_string()
    };
    session
        .messages
        .push(ChatMessage::tool_result(tc.id, result));

    let mut follow_cfg = cfg;
    follow_cfg.stream = false;
    let response = provider
        .chat(
            session.messages.clone(),
            load_builtin_tools()?,
            &follow_cfg,
            None,
        )
        .await?;

    session
        .messages
        .push(ChatMessage::assistant(response.content.clone(), None));
    Ok(response.content)
}
