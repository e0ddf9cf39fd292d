//! Agent construct showcase over IBM watsonx.ai.
//!
//! Five small engines share one `ChatModel` seam:
//! - `team`: round-robin group chat with termination conditions
//! - `crew`: role-playing agents running tasks sequentially
//! - `chain`: prompt templates, JSON output parsing, parallel branches
//! - `graph`: state graph with conditional edges
//! - `agent`: tool-calling loop with token-budgeted memory
//!
//! `showcase` wires each engine to a demo scenario; `extract` recovers JSON
//! objects from free-form model output.

pub mod agent;
pub mod chain;
pub mod config;
pub mod crew;
pub mod error;
pub mod extract;
pub mod graph;
pub mod llm;
pub mod showcase;
pub mod team;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentEvent, TokenMemory};
pub use config::Config;
pub use error::{
    AgentError, ChainError, CrewError, GraphError, ProviderError, SchemaError, ShowcaseError,
    TeamError, ToolError,
};
pub use extract::extract_json_from_text;
pub use llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    WatsonxModel, WatsonxModelConfig,
};
pub use showcase::{Framework, Report, Summary, run_all};
pub use tools::{ToolOutcome, ToolSpec};
