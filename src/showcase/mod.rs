//! Demo adapters and the driver that runs them against sample inputs.
//!
//! Each adapter binds one engine to the shared [`Config`] and exposes a single
//! "run with input, get a report" operation. Reports serialize as a flat JSON
//! object carrying the `framework` label plus either the payload or `error`.

pub mod content;
pub mod ecommerce;
pub mod financial;
pub mod legal;
pub mod research;

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{ProviderError, ShowcaseError};
use crate::llm::{ChatModel, WatsonxModel};

pub(crate) const INVALID_CONFIG_MESSAGE: &str = "Watsonx configuration is invalid. Please set WATSONX_PROJECT_ID, WATSONX_API_KEY, WATSONX_URL and WATSONX_MODEL_ID.";

/// Which agent construct produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    RoundRobinTeam,
    SequentialCrew,
    ParallelChain,
    StateGraph,
    ReactAgent,
    ReactAgentFallback,
}

impl Framework {
    pub fn label(self) -> &'static str {
        match self {
            Framework::RoundRobinTeam => "round_robin_team",
            Framework::SequentialCrew => "sequential_crew",
            Framework::ParallelChain => "parallel_chain",
            Framework::StateGraph => "state_graph",
            Framework::ReactAgent => "react_agent",
            Framework::ReactAgentFallback => "react_agent_fallback",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Completed(T),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report<T> {
    pub framework: Framework,
    #[serde(flatten)]
    pub outcome: Outcome<T>,
}

impl<T> Report<T> {
    pub fn completed(framework: Framework, payload: T) -> Self {
        Self {
            framework,
            outcome: Outcome::Completed(payload),
        }
    }

    pub fn failed(framework: Framework, error: impl fmt::Display) -> Self {
        Self {
            framework,
            outcome: Outcome::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn payload(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Completed(payload) => Some(payload),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Completed(_) => None,
            Outcome::Failed { error } => Some(error),
        }
    }
}

impl<T: Serialize> Report<T> {
    pub fn to_pretty_json(&self) -> Result<String, ShowcaseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds the hosted chat model for an adapter.
pub(crate) fn connect(
    config: &Config,
    temperature: Option<f32>,
) -> Result<Arc<dyn ChatModel>, ProviderError> {
    let model = WatsonxModel::new(config.model_config(temperature)?)?;
    Ok(Arc::new(model))
}

pub(crate) fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}", "=".repeat(60));
}

pub(crate) fn print_report<T: Serialize>(report: &Report<T>) -> Result<(), ShowcaseError> {
    println!("{}", report.to_pretty_json()?);
    Ok(())
}

/// Per-showcase result in the driver summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowcaseStatus {
    Success,
    Failed(String),
}

impl Serialize for ShowcaseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ShowcaseStatus::Success => serializer.serialize_str("Success"),
            ShowcaseStatus::Failed(reason) => serializer.serialize_str(&format!("Failed: {reason}")),
        }
    }
}

/// Showcase outcomes in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    entries: Vec<(Framework, ShowcaseStatus)>,
}

impl Summary {
    pub fn record(&mut self, framework: Framework, result: Result<(), ShowcaseError>) {
        let status = match result {
            Ok(()) => ShowcaseStatus::Success,
            Err(err) => {
                error!("{framework} showcase failed: {err}");
                ShowcaseStatus::Failed(err.to_string())
            }
        };
        self.entries.push((framework, status));
    }

    pub fn entries(&self) -> &[(Framework, ShowcaseStatus)] {
        &self.entries
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.entries
                .iter()
                .map(|(framework, status)| (framework.label(), status)),
        )
    }
}

/// Runs every showcase in order and returns the per-showcase outcome.
pub async fn run_all(config: &Config) -> Summary {
    println!("\n{}", "#".repeat(80));
    println!("AGENT CONSTRUCT SHOWCASE");
    println!("{}\n", "#".repeat(80));

    let mut summary = Summary::default();

    info!("--- Starting round-robin financial analysis showcase ---");
    summary.record(Framework::RoundRobinTeam, financial::showcase(config).await);

    info!("--- Starting state-graph e-commerce workflow showcase ---");
    summary.record(Framework::StateGraph, ecommerce::showcase(config).await);

    info!("--- Starting ReAct research assistant showcase ---");
    summary.record(Framework::ReactAgent, research::showcase(config).await);

    info!("--- Starting sequential crew content creation showcase ---");
    summary.record(Framework::SequentialCrew, content::showcase(config).await);

    info!("--- Starting parallel chain legal analysis showcase ---");
    summary.record(Framework::ParallelChain, legal::showcase(config).await);

    println!("\n{}", "=".repeat(80));
    println!("ALL SHOWCASES COMPLETED");
    println!("{}", "=".repeat(80));

    summary
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Payload {
        answer: &'static str,
    }

    #[test]
    fn reports_serialize_flat() {
        let completed = Report::completed(Framework::ReactAgent, Payload { answer: "Paris" });
        assert_eq!(
            serde_json::to_value(&completed).expect("serializes"),
            json!({"framework": "react_agent", "answer": "Paris"})
        );

        let failed = Report::<Payload>::failed(Framework::StateGraph, "boom");
        assert_eq!(
            serde_json::to_value(&failed).expect("serializes"),
            json!({"framework": "state_graph", "error": "boom"})
        );
        assert_eq!(failed.error(), Some("boom"));
        assert!(failed.payload().is_none());
    }

    #[test]
    fn framework_labels_match_serde_names() {
        for framework in [
            Framework::RoundRobinTeam,
            Framework::SequentialCrew,
            Framework::ParallelChain,
            Framework::StateGraph,
            Framework::ReactAgent,
            Framework::ReactAgentFallback,
        ] {
            assert_eq!(
                serde_json::to_value(framework).expect("serializes"),
                json!(framework.label())
            );
        }
    }

    #[test]
    fn summary_keeps_run_order() {
        let mut summary = Summary::default();
        summary.record(Framework::StateGraph, Ok(()));
        let serialize_error = serde_json::from_str::<serde_json::Value>("{")
            .expect_err("truncated input");
        let reason = serialize_error.to_string();
        summary.record(Framework::ParallelChain, Err(serialize_error.into()));

        assert_eq!(
            serde_json::to_value(&summary).expect("serializes"),
            json!({"state_graph": "Success", "parallel_chain": format!("Failed: {reason}")})
        );
        let order = summary
            .entries()
            .iter()
            .map(|(framework, _)| framework.label())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["state_graph", "parallel_chain"]);
    }

    #[tokio::test]
    async fn invalid_config_skips_every_showcase() {
        let summary = run_all(&Config::default()).await;
        assert_eq!(summary.entries().len(), 5);
        assert!(
            summary
                .entries()
                .iter()
                .all(|(_, status)| *status == ShowcaseStatus::Success)
        );
    }
}
