//! Core types for Switchboard.
//!
//! Two families live here: the OpenAI chat-completions wire format used by the
//! providers, and the network's own data model (threads, resource kinds,
//! suspended-run handles and run outcomes).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────
// Messages (OpenAI chat completions format)
// ─────────────────────────────────────────────

/// A chat message in the OpenAI format.
///
/// Each variant maps to a `role` field value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Assistant turn carrying tool calls (content is optional).
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content,
            tool_calls: Some(tool_calls),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool calls and definitions
// ─────────────────────────────────────────────

/// A tool call from the assistant, requesting execution of a function.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    /// Always "function" in the current API.
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// The function name and JSON-encoded arguments within a tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Definition of a tool, sent to the LLM so it knows what it may call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// LLM response
// ─────────────────────────────────────────────

/// `finish_reason` value used to flag provider failures.
pub const FINISH_REASON_ERROR: &str = "error";

/// Response from an LLM provider after a chat completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content (None if only tool calls).
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Why the model stopped generating; `"error"` for provider failures.
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    /// Create an error response (message as content, finish reason `"error"`).
    pub fn error(msg: impl Into<String>) -> Self {
        LlmResponse {
            content: Some(msg.into()),
            finish_reason: Some(FINISH_REASON_ERROR.to_string()),
            ..Default::default()
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        LlmResponse {
            content: Some(content.into()),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether the provider reported a failure instead of a completion.
    pub fn is_error(&self) -> bool {
        self.finish_reason.as_deref() == Some(FINISH_REASON_ERROR)
    }
}

/// Token usage statistics from the LLM.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────
// Wire types for OpenAI-compatible APIs
// ─────────────────────────────────────────────

/// Raw chat completion response. Used internally for deserialization.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(resp: ChatCompletionResponse) -> Self {
        match resp.choices.into_iter().next() {
            Some(c) => LlmResponse {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                finish_reason: c.finish_reason,
                usage: resp.usage,
            },
            None => LlmResponse::error("No choices in response"),
        }
    }
}

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// `response_format` request field (`{"type": "json_object"}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        ResponseFormat {
            format_type: "json_object".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Network data model
// ─────────────────────────────────────────────

/// Kind tag of a network resource. `None` means nothing is selected.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Agent,
    Workflow,
    Tool,
    #[default]
    None,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Agent => "agent",
            ResourceType::Workflow => "workflow",
            ResourceType::Tool => "tool",
            ResourceType::None => "none",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a thread message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of a conversation thread.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ThreadMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Resource that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ThreadMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ThreadMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            resource: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Tag the message with the resource that produced it.
    pub fn from_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Convert to the provider wire format.
    pub fn to_message(&self) -> Message {
        match self.role {
            Role::User => Message::user(&self.content),
            Role::Assistant => Message::assistant(&self.content),
            Role::System => Message::system(&self.content),
        }
    }
}

/// What a suspended run accepts as its confirmation.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// Only `yes` or `no`.
    #[default]
    YesNo,
    /// Any JSON value.
    Structured,
}

/// Correlates a thread with the one resource invocation suspended on it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRunHandle {
    /// Run id issued by the suspended resource.
    pub run_id: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
    /// Payload the resource suspended with (shown to the user).
    pub payload: Value,
    #[serde(default)]
    pub expects: ConfirmationKind,
    /// Loop context needed to continue after resumption.
    pub task: String,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub one_off: bool,
    pub created_at: DateTime<Utc>,
}

/// How a loop run ended.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The completion oracle accepted the result (or a one-off run finished).
    Completed,
    /// The iteration budget ran out before completion.
    BudgetExhausted,
    /// A resource suspended and waits for a confirmation.
    Waiting { run_id: String, payload: Value },
}

/// Result of `run`, `generate` or `resume`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub task: String,
    pub result: String,
    /// Last executed resource ("" if none ran).
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<String>,
    pub thread_id: String,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_waiting(&self) -> bool {
        matches!(self.status, RunStatus::Waiting { .. })
    }
}

/// Record of a completed resume, replayed for identical repeats.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRun {
    pub run_id: String,
    pub confirmation: Value,
    pub outcome: RunOutcome,
    pub resolved_at: DateTime<Utc>,
}

/// A conversation thread with its message history and resume metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    /// Owner identity (defaults to the network name).
    pub resource_id: String,
    #[serde(default)]
    pub title: String,
    pub messages: Vec<ThreadMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub pending_run: Option<PendingRunHandle>,
    #[serde(default)]
    pub resolved_run: Option<ResolvedRun>,
}

impl Thread {
    pub fn new(id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Thread {
            id: id.into(),
            resource_id: resource_id.into(),
            title: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            pending_run: None,
            resolved_run: None,
        }
    }

    /// Last `max` messages, oldest first.
    pub fn tail(&self, max: usize) -> &[ThreadMessage] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_message_serialization() {
        let msg = Message::user("Hello, world!");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "Hello, world!");
    }

    #[test]
    fn test_assistant_message_omits_empty_fields() {
        let json = serde_json::to_value(Message::assistant("42")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_assistant_tool_calls_deserialization() {
        let json = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "get-order-details", "arguments": "{\"orderNumber\":\"A1\"}"}
            }]
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        match msg {
            Message::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls.unwrap()[0].function.name, "get-order-details");
            }
            _ => panic!("Expected Assistant message"),
        }
    }

    #[test]
    fn test_chat_completion_response_parsing() {
        let api_json = json!({
            "id": "chatcmpl-abc123",
            "choices": [{
                "message": {"content": "Hello!", "tool_calls": null},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 8, "total_tokens": 18}
        });
        let resp: ChatCompletionResponse = serde_json::from_value(api_json).unwrap();
        let llm_resp: LlmResponse = resp.into();
        assert_eq!(llm_resp.content.as_deref(), Some("Hello!"));
        assert!(!llm_resp.is_error());
        assert_eq!(llm_resp.usage.unwrap().total_tokens, 18);
    }

    #[test]
    fn test_empty_choices_is_error() {
        let resp: ChatCompletionResponse =
            serde_json::from_value(json!({"id": null, "choices": [], "usage": null})).unwrap();
        let llm_resp: LlmResponse = resp.into();
        assert!(llm_resp.is_error());
    }

    #[test]
    fn test_request_json_mode() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("route this")],
            tools: None,
            tool_choice: None,
            max_tokens: Some(1024),
            temperature: None,
            response_format: Some(ResponseFormat::json_object()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_resource_type_wire_names() {
        assert_eq!(serde_json::to_value(ResourceType::Workflow).unwrap(), "workflow");
        let parsed: ResourceType = serde_json::from_value(json!("none")).unwrap();
        assert_eq!(parsed, ResourceType::None);
        assert!(serde_json::from_value::<ResourceType>(json!("robot")).is_err());
        assert_eq!(ResourceType::default(), ResourceType::None);
    }

    #[test]
    fn test_thread_message_conversion() {
        let msg = ThreadMessage::assistant("status: completed").from_resource("orderAgentSingle");
        assert_eq!(msg.resource.as_deref(), Some("orderAgentSingle"));
        assert_eq!(msg.to_message(), Message::assistant("status: completed"));
    }

    #[test]
    fn test_thread_tail() {
        let mut thread = Thread::new("t1", "network");
        for i in 0..5 {
            thread.messages.push(ThreadMessage::user(format!("m{i}")));
        }
        let tail = thread.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].content, "m3");
        assert_eq!(thread.tail(50).len(), 5);
    }

    #[test]
    fn test_run_outcome_waiting_serialization() {
        let outcome = RunOutcome {
            task: "invite bob@example.com".into(),
            result: String::new(),
            resource_id: "meeting-invite-workflow".into(),
            resource_type: ResourceType::Workflow,
            iterations: 1,
            completion_reason: None,
            thread_id: "t1".into(),
            status: RunStatus::Waiting {
                run_id: "r1".into(),
                payload: json!({"message": "confirm? yes/no"}),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["resourceType"], "workflow");
        assert_eq!(json["payload"]["message"], "confirm? yes/no");
        assert!(outcome.is_waiting());

        let back: RunOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
