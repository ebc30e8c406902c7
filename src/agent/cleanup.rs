use std::collections::HashSet;

use crate::llm::types::ChatMessage;

/// Scrub incomplete tool traffic from a transcript before it is sent to the
/// model again.
///
/// Two kinds of debris accumulate when a turn is abandoned mid-flight (e.g.
/// the user sends a new message instead of answering a confirmation):
/// assistant messages announcing tool calls that never got a result, and
/// tool results whose announcing assistant message is gone. Chat APIs reject
/// transcripts containing either, so both are dropped.
pub fn scrub_incomplete_tool_calls(messages: &mut Vec<ChatMessage>) {
    let resolved: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == "tool")
        .filter_map(|m| m.tool_call_id.clone())
        .collect();

    // Pass 1: drop assistant messages with any unresolved tool call.
    messages.retain(|m| {
        if m.role != "assistant" {
            return true;
        }
        match &m.tool_calls {
            Some(calls) => calls.iter().all(|tc| resolved.contains(&tc.id)),
            None => true,
        }
    });

    // Pass 2: drop tool results no surviving assistant message announced.
    let announced: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .flat_map(|m| m.tool_calls.iter().flatten().map(|tc| tc.id.clone()))
        .collect();

    messages.retain(|m| {
        if m.role != "tool" {
            return true;
        }
        m.tool_call_id
            .as_ref()
            .is_some_and(|id| announced.contains(id))
    });
}
