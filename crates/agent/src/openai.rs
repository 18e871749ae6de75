//! OpenAI-compatible chat-completions client
//!
//! Works against api.openai.com and any endpoint speaking the same protocol
//! (a local ollama server, gateways).

use std::time::Duration;

use async_trait::async_trait;
use meetbook_core::config::PolicyClientConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{
    DecisionPolicy, OperationCall, PolicyError, PolicyMessage, PolicyRequest, PolicyTurn,
};

pub struct OpenAiPolicyClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiPolicyClient {
    pub fn from_config(config: &PolicyClientConfig) -> Result<Self, PolicyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                PolicyError::invalid_request(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.resolved_base_url().trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn translate_request(&self, request: PolicyRequest<'_>) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.instructions.is_empty() {
            messages.push(ChatMessage::text("system", request.instructions));
        }
        messages.extend(request.messages.iter().map(translate_message));

        let tools = (!request.operations.is_empty()).then(|| {
            request
                .operations
                .iter()
                .map(|operation| ChatTool {
                    r#type: "function".to_owned(),
                    function: ChatFunction {
                        name: operation.name.clone(),
                        description: operation.description.clone(),
                        parameters: operation.parameters.clone(),
                    },
                })
                .collect()
        });

        ChatRequest { model: self.model.clone(), messages, tools, stream: false }
    }
}

fn translate_message(message: &PolicyMessage) -> ChatMessage {
    match message {
        PolicyMessage::User { text } => ChatMessage::text("user", text),
        PolicyMessage::Assistant { text, calls } => ChatMessage {
            role: "assistant".to_owned(),
            content: (!text.is_empty()).then(|| text.clone()),
            tool_calls: (!calls.is_empty()).then(|| {
                calls
                    .iter()
                    .map(|call| ChatToolCall {
                        id: call.id.clone(),
                        r#type: "function".to_owned(),
                        function: ChatFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: None,
        },
        PolicyMessage::OperationResult { call_id, content, is_error, .. } => ChatMessage {
            role: "tool".to_owned(),
            content: Some(if *is_error { format!("Error: {content}") } else { content.clone() }),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn normalize_response(response: ChatResponse) -> Result<PolicyTurn, PolicyError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| PolicyError::decode("response carried no choices"))?;

    let fragments =
        choice.message.content.filter(|text| !text.is_empty()).into_iter().collect::<Vec<_>>();

    let mut calls = Vec::new();
    for tool_call in choice.message.tool_calls.unwrap_or_default() {
        if tool_call.function.name.is_empty() {
            continue;
        }
        // Unparseable arguments reach the catalog as a string so it can
        // report them back to the policy.
        let arguments = serde_json::from_str(&tool_call.function.arguments)
            .unwrap_or(Value::String(tool_call.function.arguments));
        calls.push(OperationCall::new(tool_call.id, tool_call.function.name, arguments));
    }

    Ok(PolicyTurn { fragments, calls })
}

fn classify_status(status: u16, message: String) -> PolicyError {
    match status {
        401 | 403 => PolicyError::auth(format!("authentication failed: {message}")),
        429 => PolicyError::rate_limit(format!("rate limit exceeded: {message}")),
        500..=599 => PolicyError::server(format!("server error: {message}")),
        _ => PolicyError::invalid_request(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl DecisionPolicy for OpenAiPolicyClient {
    async fn decide(&self, request: PolicyRequest<'_>) -> Result<PolicyTurn, PolicyError> {
        let body = self.translate_request(request);

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                PolicyError::network(format!("request timeout: {error}"))
            } else if error.is_connect() {
                PolicyError::network(format!("connection failed: {error}"))
            } else {
                PolicyError::network(format!("request failed: {error}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| PolicyError::network(format!("failed to read response: {error}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ChatErrorResponse>(&text)
                .map(|parsed| parsed.error.message)
                .unwrap_or(text);
            return Err(classify_status(status.as_u16(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|error| PolicyError::decode(format!("failed to parse response: {error}")))?;
        normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_owned(),
            content: Some(text.to_owned()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    r#type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatError,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}
