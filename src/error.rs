use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider configuration invalid: {0}")]
    Config(String),
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("max iterations reached ({max_iterations})")]
    MaxIterationsReached { max_iterations: u32 },
    #[error("agent stream ended without final response")]
    MissingFinalResponse,
    #[error("agent configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("team configuration error: {0}")]
    Config(String),
    #[error("agent '{agent}' failed: {source}")]
    Agent {
        agent: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, Error)]
pub enum CrewError {
    #[error("crew configuration error: {0}")]
    Config(String),
    #[error("task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("missing prompt variable: {0}")]
    MissingVariable(String),
    #[error("invalid prompt template: {0}")]
    Template(String),
    #[error("failed to parse model output: {message}")]
    OutputParse { message: String, text: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph has no entry edge from START")]
    MissingEntry,
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node id '{0}' is reserved")]
    ReservedNodeId(String),
    #[error("node '{0}' already has an outgoing route")]
    DuplicateRoute(String),
    #[error("node '{0}' has no outgoing route")]
    DeadEnd(String),
    #[error("router for '{node}' returned unknown route '{route}'")]
    UnknownRoute { node: String, route: String },
    #[error("recursion limit of {0} steps reached without hitting END")]
    RecursionLimit(u32),
    #[error("node '{node}' failed: {message}")]
    Node { node: String, message: String },
}

#[derive(Debug, Error)]
pub enum ShowcaseError {
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}
