//! Rebuild a Gemini chat history from a flat, role-tagged message list.
//!
//! A chat session takes its seed history separately from the message being
//! sent, so the list is split at its tail: every turn but the last becomes
//! history, and the first part of the last turn is what gets sent.

use std::collections::HashMap;

use serde_json::json;

use super::openai_types::{ChatMessage, ChatToolCall, Role};
use crate::error::{ProxyError, Result};
use crate::gateway::types::{Content, FunctionCall, FunctionResponse, Part};

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub system_instruction: Option<String>,
    pub history: Vec<Content>,
    pub message: Part,
}

/// Split `messages` into system instruction, prior turns and the part to send.
///
/// # Errors
/// Returns `ProxyError::InvalidRequest` when no turn remains once system
/// messages are removed, or when a tool message or tool call is malformed.
pub fn reconstruct(messages: &[ChatMessage]) -> Result<Conversation> {
    let mut system_instruction = None;
    let mut turns: Vec<Content> = Vec::with_capacity(messages.len());
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for msg in messages {
        match msg.role {
            // Last one wins.
            Role::System => system_instruction = Some(msg.text()),
            Role::Tool => turns.push(tool_result_turn(msg, &call_names)?),
            Role::User | Role::Assistant => match msg.tool_calls.as_deref() {
                Some(calls) if !calls.is_empty() => {
                    for call in calls {
                        call_names.insert(&call.id, &call.function.name);
                    }
                    turns.push(tool_call_turn(calls)?);
                }
                _ => turns.push(Content::new(
                    provider_role(msg.role),
                    vec![Part::text(msg.text())],
                )),
            },
        }
    }

    let last = turns
        .pop()
        .ok_or_else(|| ProxyError::invalid_request("No messages given"))?;
    let message = last
        .parts
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::invalid_request("Last message has no content"))?;

    Ok(Conversation {
        system_instruction,
        history: turns,
        message,
    })
}

fn provider_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::System | Role::User | Role::Tool => "user",
    }
}

fn tool_result_turn(msg: &ChatMessage, call_names: &HashMap<&str, &str>) -> Result<Content> {
    let id = msg
        .tool_call_id
        .clone()
        .ok_or_else(|| ProxyError::invalid_request("tool message is missing tool_call_id"))?;

    let name = msg
        .name
        .clone()
        .or_else(|| call_names.get(id.as_str()).map(|n| (*n).to_string()))
        .ok_or_else(|| {
            ProxyError::invalid_request(format!(
                "tool message `{id}` has no name and matches no earlier tool call"
            ))
        })?;

    Ok(Content::new(
        provider_role(Role::Tool),
        vec![Part::FunctionResponse {
            function_response: FunctionResponse {
                id: Some(id),
                name,
                response: json!({ "output": msg.text() }),
            },
        }],
    ))
}

fn tool_call_turn(calls: &[ChatToolCall]) -> Result<Content> {
    let parts = calls
        .iter()
        .map(|call| {
            Ok(Part::FunctionCall {
                function_call: FunctionCall {
                    id: Some(call.id.clone()),
                    name: call.function.name.clone(),
                    args: parse_arguments(call)?,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Content::new(provider_role(Role::Assistant), parts))
}

/// Empty argument objects are treated as no arguments at all.
fn parse_arguments(call: &ChatToolCall) -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let args: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| {
            ProxyError::invalid_request(format!(
                "tool call `{}` has malformed arguments: {e}",
                call.id
            ))
        })?;

    Ok(Some(args).filter(|a| !a.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(value: serde_json::Value) -> Vec<ChatMessage> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_last_message_is_held_out() {
        let msgs = messages(json!([
            {"role": "system", "content": "Be terse"},
            {"role": "user", "content": "a"},
            {"role": "assistant", "content": "b"},
            {"role": "user", "content": "c"}
        ]));

        let conv = reconstruct(&msgs).unwrap();

        assert_eq!(conv.system_instruction.as_deref(), Some("Be terse"));
        assert_eq!(conv.message, Part::text("c"));
        assert_eq!(
            conv.history,
            vec![
                Content::new("user", vec![Part::text("a")]),
                Content::new("model", vec![Part::text("b")]),
            ]
        );
    }

    #[test]
    fn test_trailing_system_message_is_not_the_current_turn() {
        let msgs = messages(json!([
            {"role": "user", "content": "hi"},
            {"role": "system", "content": "late instruction"}
        ]));

        let conv = reconstruct(&msgs).unwrap();
        assert_eq!(conv.message, Part::text("hi"));
        assert!(conv.history.is_empty());
        assert_eq!(conv.system_instruction.as_deref(), Some("late instruction"));
    }

    #[test]
    fn test_duplicate_system_messages_keep_last() {
        let msgs = messages(json!([
            {"role": "system", "content": "first"},
            {"role": "system", "content": "second"},
            {"role": "user", "content": "go"}
        ]));
        let conv = reconstruct(&msgs).unwrap();
        assert_eq!(conv.system_instruction.as_deref(), Some("second"));
    }

    #[test]
    fn test_tool_message_becomes_function_response() {
        let msgs = messages(json!([
            {"role": "tool", "tool_call_id": "t1", "name": "f", "content": "42"}
        ]));

        let conv = reconstruct(&msgs).unwrap();
        assert_eq!(
            conv.message,
            Part::FunctionResponse {
                function_response: FunctionResponse {
                    id: Some("t1".to_string()),
                    name: "f".to_string(),
                    response: json!({"output": "42"}),
                },
            }
        );
    }

    #[test]
    fn test_empty_arguments_are_absent() {
        let msgs = messages(json!([
            {"role": "assistant", "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{}"}}
            ]}
        ]));

        let conv = reconstruct(&msgs).unwrap();
        match conv.message {
            Part::FunctionCall { function_call } => {
                assert_eq!(function_call.id.as_deref(), Some("c1"));
                assert_eq!(function_call.name, "f");
                assert!(function_call.args.is_none());
            }
            other => panic!("Expected function call part, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_round_trip_history() {
        let msgs = messages(json!([
            {"role": "user", "content": "Weather in Paris?"},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}},
                {"id": "c2", "type": "function", "function": {"name": "get_time", "arguments": ""}}
            ]},
            {"role": "tool", "tool_call_id": "c1", "content": "sunny"}
        ]));

        let conv = reconstruct(&msgs).unwrap();
        assert_eq!(conv.history.len(), 2);

        let call_turn = &conv.history[1];
        assert_eq!(call_turn.role.as_deref(), Some("model"));
        assert_eq!(call_turn.parts.len(), 2);
        match &call_turn.parts[0] {
            Part::FunctionCall { function_call } => {
                assert_eq!(function_call.args.as_ref().unwrap()["city"], "Paris");
            }
            other => panic!("Expected function call part, got {other:?}"),
        }

        // Name recovered from the matching tool call.
        match conv.message {
            Part::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "get_weather");
                assert_eq!(function_response.id.as_deref(), Some("c1"));
            }
            other => panic!("Expected function response part, got {other:?}"),
        }
    }

    #[test]
    fn test_no_usable_turn_is_invalid() {
        assert!(matches!(
            reconstruct(&[]),
            Err(ProxyError::InvalidRequest { .. })
        ));

        let only_system = messages(json!([{"role": "system", "content": "x"}]));
        assert!(matches!(
            reconstruct(&only_system),
            Err(ProxyError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_malformed_tool_messages_are_invalid() {
        let unnamed = messages(json!([{"role": "tool", "tool_call_id": "zz", "content": "1"}]));
        assert!(matches!(
            reconstruct(&unnamed),
            Err(ProxyError::InvalidRequest { .. })
        ));

        let bad_args = messages(json!([
            {"role": "assistant", "tool_calls": [
                {"id": "c1", "function": {"name": "f", "arguments": "[1, 2]"}}
            ]}
        ]));
        assert!(matches!(
            reconstruct(&bad_args),
            Err(ProxyError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_empty_tool_calls_list_is_plain_text() {
        let msgs = messages(json!([
            {"role": "assistant", "content": "done", "tool_calls": []}
        ]));
        let conv = reconstruct(&msgs).unwrap();
        assert_eq!(conv.message, Part::text("done"));
    }
}
