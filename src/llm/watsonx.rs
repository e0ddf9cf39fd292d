use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    ModelUsage,
};

const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";
const DEFAULT_API_VERSION: &str = "2024-05-31";
const IAM_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const EMPTY_USER_CONTENT_FALLBACK: &str = " ";

#[derive(Debug, Clone)]
/// Runtime configuration for [`WatsonxModel`].
pub struct WatsonxModelConfig {
    /// IBM Cloud API key, exchanged for a bearer token.
    pub api_key: String,
    /// watsonx.ai project the requests are billed to.
    pub project_id: String,
    /// Regional service URL, e.g. `https://us-south.ml.cloud.ibm.com`.
    pub url: String,
    /// Foundation model id, e.g. `ibm/granite-3-8b-instruct`.
    pub model_id: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// IAM token endpoint override.
    pub iam_url: String,
    /// Value of the `version` query parameter.
    pub api_version: String,
}

impl WatsonxModelConfig {
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        url: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            url: url.into(),
            model_id: model_id.into(),
            temperature: None,
            top_p: None,
            max_tokens: Some(1024),
            iam_url: DEFAULT_IAM_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

#[derive(Debug)]
struct BearerToken {
    value: String,
    refresh_at: Instant,
}

/// watsonx.ai chat adapter implementing [`ChatModel`].
#[derive(Debug, Clone)]
pub struct WatsonxModel {
    client: Client,
    config: WatsonxModelConfig,
    endpoint: Url,
    token: Arc<Mutex<Option<BearerToken>>>,
}

impl WatsonxModel {
    pub fn new(config: WatsonxModelConfig) -> Result<Self, ProviderError> {
        let endpoint = chat_endpoint(&config.url, &config.api_version)?;
        Url::parse(&config.iam_url)
            .map_err(|err| ProviderError::Config(format!("invalid IAM url: {err}")))?;

        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Config(err.to_string()))?;

        Ok(Self {
            client,
            config,
            endpoint,
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn bearer_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        debug!("requesting IAM bearer token");
        let response = self
            .client
            .post(&self.config.iam_url)
            .header("accept", "application/json")
            .form(&[
                ("grant_type", IAM_GRANT_TYPE),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ProviderError::Auth(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "IAM token request failed ({status}): {body}"
            )));
        }

        let payload = response
            .json::<IamTokenResponse>()
            .await
            .map_err(|err| ProviderError::Auth(err.to_string()))?;

        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(3600));
        let token = BearerToken {
            value: payload.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        };
        *guard = Some(token);

        Ok(payload.access_token)
    }
}

#[async_trait]
impl ChatModel for WatsonxModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        let request = build_request(messages, tools, tool_choice, &self.config);
        let token = self.bearer_token().await?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(render_api_error(status, &body)));
        }

        let payload = response
            .json::<WatsonxChatResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }
}

fn chat_endpoint(base: &str, api_version: &str) -> Result<Url, ProviderError> {
    let base = base.trim_end_matches('/');
    let mut endpoint = Url::parse(&format!("{base}/ml/v1/text/chat"))
        .map_err(|err| ProviderError::Config(format!("invalid watsonx url '{base}': {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ProviderError::Config(format!(
            "watsonx url must be http(s): {base}"
        )));
    }
    endpoint
        .query_pairs_mut()
        .append_pair("version", api_version);
    Ok(endpoint)
}

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct WatsonxChatRequest {
    model_id: String,
    project_id: String,
    messages: Vec<WatsonxRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WatsonxToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice_option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<WatsonxToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum WatsonxRequestMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<WatsonxToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct WatsonxToolDefinition {
    #[serde(rename = "type")]
    type_: &'static str,
    function: WatsonxFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct WatsonxFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct WatsonxToolChoice {
    #[serde(rename = "type")]
    type_: &'static str,
    function: WatsonxToolChoiceFunction,
}

#[derive(Debug, Serialize)]
struct WatsonxToolChoiceFunction {
    name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WatsonxToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    type_: String,
    function: WatsonxToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WatsonxToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WatsonxChatResponse {
    #[serde(default)]
    choices: Vec<WatsonxChoice>,
    usage: Option<WatsonxUsage>,
}

#[derive(Debug, Deserialize)]
struct WatsonxChoice {
    message: Option<WatsonxAssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct WatsonxAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WatsonxToolCall>,
}

#[derive(Debug, Deserialize)]
struct WatsonxUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WatsonxErrorEnvelope {
    #[serde(default)]
    errors: Vec<WatsonxApiError>,
    status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WatsonxApiError {
    code: Option<String>,
    message: Option<String>,
}

fn build_request(
    messages: &[ModelMessage],
    tools: &[ModelToolDefinition],
    tool_choice: ModelToolChoice,
    config: &WatsonxModelConfig,
) -> WatsonxChatRequest {
    let request_messages = to_watsonx_messages(messages);

    let (tools_payload, tool_choice_option, specific_choice) = if tools.is_empty() {
        (None, None, None)
    } else {
        let definitions = tools
            .iter()
            .map(|tool| WatsonxToolDefinition {
                type_: "function",
                function: WatsonxFunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect::<Vec<_>>();

        match tool_choice {
            ModelToolChoice::Auto => (Some(definitions), Some("auto".to_string()), None),
            ModelToolChoice::Required => (Some(definitions), Some("required".to_string()), None),
            ModelToolChoice::None => (Some(definitions), Some("none".to_string()), None),
            ModelToolChoice::Tool(name) => (
                Some(definitions),
                None,
                Some(WatsonxToolChoice {
                    type_: "function",
                    function: WatsonxToolChoiceFunction { name },
                }),
            ),
        }
    };

    WatsonxChatRequest {
        model_id: config.model_id.clone(),
        project_id: config.project_id.clone(),
        messages: request_messages,
        tools: tools_payload,
        tool_choice_option,
        tool_choice: specific_choice,
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_tokens,
    }
}

fn to_watsonx_messages(messages: &[ModelMessage]) -> Vec<WatsonxRequestMessage> {
    let mut request_messages = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(content) if !content.is_empty() => {
                request_messages.push(WatsonxRequestMessage::System {
                    content: content.clone(),
                });
            }
            ModelMessage::User(content) if !content.is_empty() => {
                request_messages.push(WatsonxRequestMessage::User {
                    content: content.clone(),
                });
            }
            ModelMessage::System(_) | ModelMessage::User(_) => {}
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let serialized = tool_calls
                    .iter()
                    .map(|call| WatsonxToolCall {
                        id: call.id.clone(),
                        type_: function_type(),
                        function: WatsonxToolCallFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>();

                let content = content.as_ref().filter(|text| !text.is_empty()).cloned();
                if content.is_none() && serialized.is_empty() {
                    continue;
                }

                request_messages.push(WatsonxRequestMessage::Assistant {
                    content,
                    tool_calls: (!serialized.is_empty()).then_some(serialized),
                });
            }
            ModelMessage::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => {
                let content = if *is_error {
                    format!("Error: {content}")
                } else {
                    content.clone()
                };
                request_messages.push(WatsonxRequestMessage::Tool {
                    tool_call_id: tool_call_id.clone(),
                    content,
                });
            }
        }
    }

    if request_messages.is_empty() {
        request_messages.push(WatsonxRequestMessage::User {
            content: EMPTY_USER_CONTENT_FALLBACK.to_string(),
        });
    }

    request_messages
}

fn normalize_response(response: WatsonxChatResponse) -> Result<ModelCompletion, ProviderError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("watsonx response missing choices".to_string()))?
        .message
        .ok_or_else(|| {
            ProviderError::Response("watsonx response missing choice message".to_string())
        })?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(&call.function.arguments).map_err(|err| {
                    ProviderError::Response(format!(
                        "watsonx tool call arguments for '{}' are not valid JSON: {err}",
                        call.function.name
                    ))
                })?
            };
            Ok(ModelToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let usage = response.usage.map(|usage| ModelUsage {
        input_tokens: usage.prompt_tokens.unwrap_or(0),
        output_tokens: usage.completion_tokens.unwrap_or(0),
    });

    Ok(ModelCompletion {
        text: message.content.filter(|text| !text.is_empty()),
        tool_calls,
        usage,
    })
}

fn render_api_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<WatsonxErrorEnvelope>(body) {
        if let Some(error) = envelope.errors.into_iter().next() {
            let code = error
                .code
                .or_else(|| envelope.status_code.map(|code| code.to_string()))
                .unwrap_or_else(|| status.as_u16().to_string());
            let message = error
                .message
                .unwrap_or_else(|| "unknown watsonx api error".to_string());
            return format!("watsonx api error {code}: {message}");
        }
    }

    if body.is_empty() {
        format!("watsonx api request failed ({status})")
    } else {
        format!("watsonx api request failed ({status}): {body}")
    }
}
