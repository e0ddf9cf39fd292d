//! Prompt templates, JSON output parsing, and model-backed chains.
//!
//! Chains are plain async values; concurrent branches are composed with
//! `futures_util::future::try_join` at the call site.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::ChainError;
use crate::llm::ChatModel;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?(.*?)```").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// Template with `{name}` placeholders; `{{` and `}}` render literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self, ChainError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(ChainError::Template(format!(
                                    "unclosed placeholder '{{{name}'"
                                )));
                            }
                        }
                    }
                    let name = name.trim().to_string();
                    if name.is_empty() || name.contains('{') {
                        return Err(ChainError::Template(format!(
                            "invalid placeholder '{{{name}}}'"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => {
                    return Err(ChainError::Template(
                        "single '}' must be escaped as '}}'".to_string(),
                    ));
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in sorted order.
    pub fn input_variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Variable(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn format(&self, vars: &[(&str, &str)]) -> Result<String, ChainError> {
        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let value = vars
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| ChainError::MissingVariable(name.clone()))?;
                    rendered.push_str(value);
                }
            }
        }
        Ok(rendered)
    }
}

/// Parses model output as JSON, unwrapping a Markdown code fence if present.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutputParser;

impl JsonOutputParser {
    pub fn parse(&self, text: &str) -> Result<Value, ChainError> {
        let candidate = FENCED_BLOCK
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map_or(text, |body| body.as_str())
            .trim();

        serde_json::from_str(candidate).map_err(|err| ChainError::OutputParse {
            message: format!("invalid json output: {err}"),
            text: text.to_string(),
        })
    }
}

/// A prompt template bound to a model.
#[derive(Clone)]
pub struct LlmChain {
    name: String,
    prompt: PromptTemplate,
    model: Arc<dyn ChatModel>,
}

impl LlmChain {
    pub fn new(name: impl Into<String>, prompt: PromptTemplate, model: Arc<dyn ChatModel>) -> Self {
        Self {
            name: name.into(),
            prompt,
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn invoke(&self, vars: &[(&str, &str)]) -> Result<String, ChainError> {
        let prompt = self.prompt.format(vars)?;
        debug!(chain = %self.name, prompt_len = prompt.len(), "invoking chain");
        Ok(self.model.complete(&prompt).await?)
    }

    /// Runs the chain and parses its output as JSON.
    pub async fn invoke_json(
        &self,
        vars: &[(&str, &str)],
        parser: &JsonOutputParser,
    ) -> Result<Value, ChainError> {
        let text = self.invoke(vars).await?;
        parser.parse(&text)
    }
}
