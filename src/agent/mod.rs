//! Tool-calling agent loop.
//!
//! The model is called repeatedly with the conversation and the registered
//! tool definitions. Tool calls are executed and their results fed back until
//! the model answers with plain text, a tool returns [`ToolOutcome::Done`], or
//! the iteration budget runs out.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::{ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice};
use crate::tools::{ToolOutcome, ToolSpec};

pub use memory::TokenMemory;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub require_done_tool: bool,
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
    /// Approximate token budget for the retained history.
    pub memory_budget: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            require_done_tool: false,
            max_iterations: 24,
            system_prompt: None,
            memory_budget: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Text {
        content: String,
    },
    ToolCall {
        tool: String,
        args_json: serde_json::Value,
        tool_call_id: String,
    },
    ToolResult {
        tool: String,
        result_text: String,
        tool_call_id: String,
        is_error: bool,
    },
    FinalResponse {
        content: String,
    },
}

#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<ToolSpec>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn model<M>(self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.shared_model(Arc::new(model))
    }

    pub fn shared_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn require_done_tool(mut self, require_done_tool: bool) -> Self {
        self.config.require_done_tool = require_done_tool;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn memory_budget(mut self, max_tokens: usize) -> Self {
        self.config.memory_budget = Some(max_tokens);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(model) = self.model else {
            return Err(AgentError::Config(
                "agent model must be configured via AgentBuilder::model(...)".to_string(),
            ));
        };

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(AgentError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        let memory = match self.config.memory_budget {
            Some(budget) => TokenMemory::with_budget(budget),
            None => TokenMemory::unbounded(),
        };

        Ok(Agent {
            model,
            tools: self.tools,
            tool_map,
            config: self.config,
            memory,
        })
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSpec>,
    tool_map: HashMap<String, ToolSpec>,
    config: AgentConfig,
    memory: TokenMemory,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(ToolSpec::name).collect()
    }

    pub fn clear_history(&mut self) {
        self.memory.clear();
    }

    pub fn messages_len(&self) -> usize {
        self.memory.len()
    }

    pub async fn query(&mut self, user_message: impl Into<String>) -> Result<String, AgentError> {
        let events = self.run(user_message).await?;
        events
            .into_iter()
            .rev()
            .find_map(|event| match event {
                AgentEvent::FinalResponse { content } => Some(content),
                _ => None,
            })
            .ok_or(AgentError::MissingFinalResponse)
    }

    /// Drives the loop to completion and returns every event it produced.
    pub async fn run(
        &mut self,
        user_message: impl Into<String>,
    ) -> Result<Vec<AgentEvent>, AgentError> {
        let stream = self.query_stream(user_message);
        futures_util::pin_mut!(stream);

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }
        Ok(events)
    }

    pub fn query_stream(
        &mut self,
        user_message: impl Into<String>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
        let user_message = user_message.into();

        try_stream! {
            if self.memory.is_empty() {
                if let Some(system_prompt) = &self.config.system_prompt {
                    self.memory.push(ModelMessage::System(system_prompt.clone()));
                }
            }
            self.memory.push(ModelMessage::User(user_message));

            let tool_definitions = self
                .tools
                .iter()
                .map(ToolSpec::definition)
                .collect::<Vec<_>>();
            let tool_choice = if tool_definitions.is_empty() {
                ModelToolChoice::None
            } else {
                ModelToolChoice::Auto
            };

            for iteration in 1..=self.config.max_iterations {
                debug!(agent = %self.config.name, iteration, "invoking model");
                let completion = self
                    .model
                    .invoke(self.memory.messages(), &tool_definitions, tool_choice.clone())
                    .await?;

                self.remember_assistant(&completion);

                if let Some(text) = completion.text.as_ref().filter(|text| !text.is_empty()) {
                    yield AgentEvent::Text { content: text.clone() };
                }

                if completion.tool_calls.is_empty() {
                    if self.config.require_done_tool {
                        continue;
                    }
                    info!(agent = %self.config.name, iteration, "final response");
                    yield AgentEvent::FinalResponse {
                        content: completion.text.unwrap_or_default(),
                    };
                    return;
                }

                for tool_call in completion.tool_calls {
                    yield AgentEvent::ToolCall {
                        tool: tool_call.name.clone(),
                        args_json: tool_call.arguments.clone(),
                        tool_call_id: tool_call.id.clone(),
                    };

                    let execution = self.execute_tool_call(&tool_call).await;
                    self.memory.push(ModelMessage::ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        content: execution.result_text.clone(),
                        is_error: execution.is_error,
                    });

                    yield AgentEvent::ToolResult {
                        tool: tool_call.name,
                        result_text: execution.result_text,
                        tool_call_id: tool_call.id,
                        is_error: execution.is_error,
                    };

                    if let Some(done_message) = execution.done_message {
                        yield AgentEvent::FinalResponse { content: done_message };
                        return;
                    }
                }
            }

            warn!(agent = %self.config.name, "iteration budget exhausted");
            Err::<(), AgentError>(AgentError::MaxIterationsReached {
                max_iterations: self.config.max_iterations,
            })?;
        }
    }

    fn remember_assistant(&mut self, completion: &ModelCompletion) {
        self.memory.push(ModelMessage::Assistant {
            content: completion.text.clone(),
            tool_calls: completion.tool_calls.clone(),
        });
    }

    async fn execute_tool_call(&self, tool_call: &ModelToolCall) -> ToolExecution {
        let Some(tool) = self.tool_map.get(&tool_call.name) else {
            warn!(agent = %self.config.name, tool = %tool_call.name, "unknown tool requested");
            return ToolExecution {
                result_text: format!("Unknown tool '{}'.", tool_call.name),
                is_error: true,
                done_message: None,
            };
        };

        match tool.execute(tool_call.arguments.clone()).await {
            Ok(ToolOutcome::Text(text)) => ToolExecution {
                result_text: text,
                is_error: false,
                done_message: None,
            },
            Ok(ToolOutcome::Done(message)) => ToolExecution {
                result_text: format!("Task completed: {message}"),
                is_error: false,
                done_message: Some(message),
            },
            Err(err) => {
                warn!(agent = %self.config.name, tool = %tool_call.name, "tool failed: {err}");
                ToolExecution {
                    result_text: err.to_string(),
                    is_error: true,
                    done_message: None,
                }
            }
        }
    }
}

struct ToolExecution {
    result_text: String,
    is_error: bool,
    done_message: Option<String>,
}
