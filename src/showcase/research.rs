//! Research assistant: a tool-calling agent with Wikipedia search and
//! token-budgeted memory, with a tool-less fallback.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use super::{Framework, Report, connect, print_banner, print_report};
use crate::agent::{Agent, AgentEvent};
use crate::config::Config;
use crate::error::{AgentError, ShowcaseError};
use crate::llm::ChatModel;
use crate::tools::wikipedia::WikipediaTool;

const MEMORY_BUDGET_TOKENS: usize = 8_192;
const MAX_ITERATIONS: u32 = 10;
const UNRECOGNIZED_ANSWER: &str = "Unable to extract meaningful response from agent result";

const SYSTEM_PROMPT: &str = "You are a helpful research assistant. Think step by step. \
When a question needs facts you are unsure about, call the wikipedia tool and base your answer on what it returns. \
Reply with a direct, concise final answer.";

const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful research assistant. Think step by step \
and reply with a direct, concise final answer.";

pub const SAMPLE_QUERIES: [&str; 3] = [
    "What is the capital of France?",
    "Explain the concept of quantum entanglement in simple terms.",
    "If an item costs $150 and has a 20% discount, what is the final price?",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchAnswer {
    pub query: String,
    pub answer: String,
    pub status: &'static str,
}

/// What a run's events yielded as an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentResponse {
    FinalAnswer(String),
    /// No usable final response, but the model said something.
    LastMessage(String),
    /// No final response and no text at all.
    Unrecognized,
}

impl AgentResponse {
    pub fn from_events(events: &[AgentEvent]) -> Self {
        let final_response = events.iter().rev().find_map(|event| match event {
            AgentEvent::FinalResponse { content } => Some(content),
            _ => None,
        });
        if let Some(answer) = final_response.filter(|content| !content.trim().is_empty()) {
            return AgentResponse::FinalAnswer(answer.clone());
        }

        let last_text = events.iter().rev().find_map(|event| match event {
            AgentEvent::Text { content } if !content.trim().is_empty() => Some(content.clone()),
            _ => None,
        });
        match (last_text, final_response) {
            (Some(text), _) => AgentResponse::LastMessage(text),
            // The agent finished but said nothing.
            (None, Some(_)) => AgentResponse::FinalAnswer(String::new()),
            (None, None) => {
                debug!(events = events.len(), "no answer in agent events");
                AgentResponse::Unrecognized
            }
        }
    }

    pub fn into_text(self) -> String {
        match self {
            AgentResponse::FinalAnswer(text) | AgentResponse::LastMessage(text) => text,
            AgentResponse::Unrecognized => UNRECOGNIZED_ANSWER.to_string(),
        }
    }
}

pub struct ResearchAssistant {
    agent: Option<Agent>,
    framework: Framework,
}

impl ResearchAssistant {
    /// Agent with the Wikipedia tool.
    pub fn new(config: &Config) -> Self {
        match connect(config, None) {
            Ok(model) => Self::with_model(model),
            Err(err) => {
                error!("Error setting up research agent: {err}");
                Self::disabled(Framework::ReactAgent)
            }
        }
    }

    /// Agent without tools, used when the primary setup fails.
    pub fn fallback(config: &Config) -> Self {
        match connect(config, None) {
            Ok(model) => Self::fallback_with_model(model),
            Err(err) => {
                error!("Error setting up research agent: {err}");
                Self::disabled(Framework::ReactAgentFallback)
            }
        }
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        let built = WikipediaTool::new()
            .map_err(AgentError::from)
            .and_then(|wikipedia| {
                Agent::builder()
                    .shared_model(model)
                    .name("research_assistant")
                    .system_prompt(SYSTEM_PROMPT)
                    .tool(wikipedia.into_spec())
                    .memory_budget(MEMORY_BUDGET_TOKENS)
                    .max_iterations(MAX_ITERATIONS)
                    .build()
            });
        Self::from_build(built, Framework::ReactAgent)
    }

    pub fn fallback_with_model(model: Arc<dyn ChatModel>) -> Self {
        let built = Agent::builder()
            .shared_model(model)
            .name("research_assistant_fallback")
            .system_prompt(FALLBACK_SYSTEM_PROMPT)
            .memory_budget(MEMORY_BUDGET_TOKENS)
            .max_iterations(MAX_ITERATIONS)
            .build();
        Self::from_build(built, Framework::ReactAgentFallback)
    }

    fn from_build(built: Result<Agent, AgentError>, framework: Framework) -> Self {
        match built {
            Ok(agent) => {
                info!(%framework, tools = ?agent.tool_names(), "research assistant initialized");
                Self {
                    agent: Some(agent),
                    framework,
                }
            }
            Err(err) => {
                error!("Error setting up research agent: {err}");
                Self::disabled(framework)
            }
        }
    }

    fn disabled(framework: Framework) -> Self {
        Self {
            agent: None,
            framework,
        }
    }

    pub fn is_available(&self) -> bool {
        self.agent.is_some()
    }

    pub fn framework(&self) -> Framework {
        self.framework
    }

    pub async fn get_research_answer(&mut self, query: &str) -> Report<ResearchAnswer> {
        let framework = self.framework;
        let Some(agent) = self.agent.as_mut() else {
            return Report::failed(framework, "Research agent not available");
        };

        info!(%framework, query, "answering research query");
        match agent.run(query).await {
            Ok(events) => {
                let answer = AgentResponse::from_events(&events).into_text();
                let status = if answer.trim().is_empty() {
                    "failed_to_answer"
                } else {
                    "completed"
                };
                Report::completed(
                    framework,
                    ResearchAnswer {
                        query: query.to_string(),
                        answer,
                        status,
                    },
                )
            }
            Err(err) => {
                error!("Research query failed: {err}");
                Report::failed(framework, err)
            }
        }
    }
}

pub async fn showcase(config: &Config) -> Result<(), ShowcaseError> {
    print_banner("REACT AGENT: RESEARCH ASSISTANT");
    if !config.validate() {
        println!("{}", super::INVALID_CONFIG_MESSAGE);
        return Ok(());
    }

    let mut assistant = ResearchAssistant::new(config);
    if !assistant.is_available() {
        println!("Primary assistant failed, trying fallback mode...");
        assistant = ResearchAssistant::fallback(config);
    }

    for query in SAMPLE_QUERIES {
        println!("\nQuerying: '{query}'");
        let report = assistant.get_research_answer(query).await;
        print_report(&report)?;
    }
    Ok(())
}
