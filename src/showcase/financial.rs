//! Stock analysis by an analyst/strategist pair in a round-robin team.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::{Framework, Report, connect, print_banner, print_report};
use crate::config::Config;
use crate::error::{ShowcaseError, TeamError};
use crate::extract::extract_json_from_text;
use crate::llm::ChatModel;
use crate::team::{AssistantAgent, RoundRobinGroupChat, TASK_SOURCE, TaskResult, Termination};

const FRAMEWORK: Framework = Framework::RoundRobinTeam;
const COMPLETION_MARKER: &str = "ANALYSIS_COMPLETE";
const MAX_MESSAGES: usize = 10;
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyProfile {
    pub name: String,
    pub financials: BTreeMap<String, String>,
    pub news_sentiment: String,
}

impl CompanyProfile {
    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "a company"
        } else {
            &self.name
        }
    }

    fn sentiment(&self) -> &str {
        if self.news_sentiment.is_empty() {
            "neutral"
        } else {
            &self.news_sentiment
        }
    }
}

/// What the transcript yielded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FinancialOutcome {
    /// JSON recommendation found in an agent message.
    Recommendation(Map<String, Value>),
    /// Agents answered but none of their messages carried JSON.
    Unstructured {
        analysis: String,
        investment_strategy: String,
        note: String,
    },
    NoResponses { error: String, debug_info: String },
}

impl FinancialOutcome {
    /// Scans agent messages newest first and keeps the first one that holds
    /// a JSON object.
    pub fn from_transcript(result: &TaskResult) -> Self {
        let agent_messages = || {
            result
                .messages
                .iter()
                .filter(|message| message.source != TASK_SOURCE)
        };

        for message in agent_messages().rev() {
            info!(
                source = %message.source,
                "checking message: {}",
                preview(&message.content, 100)
            );
            let mut extracted = extract_json_from_text(&message.content);
            if !extracted.is_empty() {
                extracted.remove("framework");
                info!("extracted JSON recommendation from transcript");
                return FinancialOutcome::Recommendation(extracted);
            }
        }

        warn!("No valid JSON found in any agent message.");
        let responses = agent_messages()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();

        if responses.is_empty() {
            FinancialOutcome::NoResponses {
                error: "No agent responses found".to_string(),
                debug_info: format!(
                    "Total messages: {}, Stop reason: {}",
                    result.messages.len(),
                    result.stop_reason.as_deref().unwrap_or("None")
                ),
            }
        } else {
            FinancialOutcome::Unstructured {
                analysis: responses.join(" "),
                investment_strategy: "Manual review required".to_string(),
                note: "Agents responded but JSON extraction failed".to_string(),
            }
        }
    }
}

pub struct FinancialAnalyzer {
    model: Option<Arc<dyn ChatModel>>,
}

impl FinancialAnalyzer {
    pub fn new(config: &Config) -> Self {
        match connect(config, None) {
            Ok(model) => {
                info!("watsonx client initialized for financial analysis");
                Self { model: Some(model) }
            }
            Err(err) => {
                error!("Error setting up financial analysis client: {err}");
                Self { model: None }
            }
        }
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        Self { model: Some(model) }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub async fn analyze_stock_performance(
        &self,
        company: &CompanyProfile,
    ) -> Report<FinancialOutcome> {
        let Some(model) = &self.model else {
            return Report::failed(FRAMEWORK, "Financial analysis client not available");
        };

        match self.run_team(model, company).await {
            Ok(result) => {
                print_transcript(&result);
                info!(company = %company.display_name(), "financial analysis finished");
                Report::completed(FRAMEWORK, FinancialOutcome::from_transcript(&result))
            }
            Err(err) => {
                error!("Financial analysis failed: {err}");
                Report::failed(FRAMEWORK, err)
            }
        }
    }

    async fn run_team(
        &self,
        model: &Arc<dyn ChatModel>,
        company: &CompanyProfile,
    ) -> Result<TaskResult, TeamError> {
        let name = company.display_name();
        let team = RoundRobinGroupChat::new(
            vec![
                AssistantAgent::new("FinancialAnalyst", analyst_prompt(name), model.clone()),
                AssistantAgent::new("InvestmentStrategist", strategist_prompt(name), model.clone()),
            ],
            Termination::any([
                Termination::TextMention(COMPLETION_MARKER.to_string()),
                Termination::MaxMessages(MAX_MESSAGES),
            ]),
        )?;

        info!(company = %name, "starting financial analysis");
        team.run(task_prompt(company)).await
    }
}

fn analyst_prompt(company: &str) -> String {
    format!(
        "You are a skilled financial analyst. Analyze the provided financial data for {company} and provide:
1. Revenue and profitability assessment
2. Financial health indicators
3. Key strengths and weaknesses
4. Market positioning insights

Keep your analysis concise but comprehensive. End your response by saying 'Analysis complete - passing to strategist.'"
    )
}

fn strategist_prompt(company: &str) -> String {
    format!(
        r#"You are an expert investment strategist. Based on the financial analyst's report, provide your investment recommendation.

You MUST format your final response as a valid JSON object with this exact structure:
{{
    "company": "{company}",
    "financial_summary": "brief summary of key financial metrics",
    "investment_strategy": "Buy/Hold/Sell",
    "justification": "clear reasoning for your recommendation",
    "potential_returns": "High/Medium/Low",
    "risks": ["list", "of", "key", "risks"]
}}

After providing the JSON, write '{COMPLETION_MARKER}' to signal completion."#
    )
}

fn task_prompt(company: &CompanyProfile) -> String {
    let financials = serde_json::to_string_pretty(&company.financials)
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "Please analyze the following financial data for {name}:

Financial Metrics:
{financials}

Recent News Sentiment: {sentiment}

FinancialAnalyst: Please provide your analysis first.
InvestmentStrategist: Then provide your investment strategy recommendation in the specified JSON format.",
        name = company.display_name(),
        sentiment = company.sentiment(),
    )
}

fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

fn print_transcript(result: &TaskResult) {
    println!("##############");
    println!("Task completed. Message count: {}", result.messages.len());
    println!(
        "Stop reason: {}",
        result.stop_reason.as_deref().unwrap_or("None")
    );
    for (index, message) in result.messages.iter().enumerate() {
        println!(
            "Message {index} from {}: {}...",
            message.source,
            preview(&message.content, PREVIEW_CHARS)
        );
    }
    println!("##############");
}

pub fn sample_companies() -> Vec<CompanyProfile> {
    let profile = |name: &str, metrics: [(&str, &str); 4], sentiment: &str| CompanyProfile {
        name: name.to_string(),
        financials: metrics
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        news_sentiment: sentiment.to_string(),
    };

    vec![
        profile(
            "Tech Innovators Inc.",
            [
                ("revenue_growth_qtr", "15%"),
                ("profit_margin", "20%"),
                ("debt_to_equity", "0.3"),
                ("cash_flow", "positive"),
            ],
            "highly positive",
        ),
        profile(
            "Retail Giants Corp.",
            [
                ("revenue_growth_qtr", "2%"),
                ("profit_margin", "8%"),
                ("debt_to_equity", "0.8"),
                ("cash_flow", "stable"),
            ],
            "mixed",
        ),
    ]
}

pub async fn showcase(config: &Config) -> Result<(), ShowcaseError> {
    print_banner("ROUND-ROBIN TEAM: FINANCIAL ANALYSIS");
    if !config.validate() {
        println!("{}", super::INVALID_CONFIG_MESSAGE);
        return Ok(());
    }

    let analyzer = FinancialAnalyzer::new(config);
    for company in sample_companies() {
        println!("\nAnalyzing: {}", company.name);
        let report = analyzer.analyze_stock_performance(&company).await;
        print_report(&report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::error::ProviderError;
    use crate::llm::ModelMessage;
    use crate::llm::testing::ScriptedModel;
    use crate::team::TeamMessage;

    fn transcript(messages: &[(&str, &str)]) -> TaskResult {
        TaskResult {
            messages: messages
                .iter()
                .map(|(source, content)| TeamMessage {
                    source: source.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            stop_reason: Some("Text 'ANALYSIS_COMPLETE' mentioned".to_string()),
        }
    }

    #[tokio::test]
    async fn strategist_json_becomes_the_report() {
        let model = Arc::new(ScriptedModel::with_texts([
            "Revenue is growing fast. Analysis complete - passing to strategist.",
            "{\"company\": \"Tech Innovators Inc.\", \"investment_strategy\": \"Buy\", \"framework\": \"x\"}\nANALYSIS_COMPLETE",
        ]));
        let analyzer = FinancialAnalyzer::with_model(model.clone());
        let company = &sample_companies()[0];

        let report = analyzer.analyze_stock_performance(company).await;

        assert_eq!(
            serde_json::to_value(&report).expect("serializes"),
            json!({
                "framework": "round_robin_team",
                "company": "Tech Innovators Inc.",
                "investment_strategy": "Buy"
            })
        );

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        let ModelMessage::User(task) = &calls[0][1] else {
            panic!("task should be a user message");
        };
        assert!(task.contains("\"revenue_growth_qtr\": \"15%\""));
        assert!(task.contains("Recent News Sentiment: highly positive"));
    }

    #[test]
    fn newest_agent_json_wins_and_user_task_is_skipped() {
        let result = transcript(&[
            ("user", "{\"from\": \"task\"}"),
            ("FinancialAnalyst", "{\"from\": \"analyst\"}"),
            ("InvestmentStrategist", "{\"from\": \"strategist\"}"),
        ]);
        let FinancialOutcome::Recommendation(map) = FinancialOutcome::from_transcript(&result) else {
            panic!("expected recommendation");
        };
        assert_eq!(map.get("from"), Some(&json!("strategist")));

        let only_task = transcript(&[("user", "{\"from\": \"task\"}")]);
        assert!(matches!(
            FinancialOutcome::from_transcript(&only_task),
            FinancialOutcome::NoResponses { .. }
        ));
    }

    #[test]
    fn prose_only_transcript_needs_manual_review() {
        let result = transcript(&[
            ("user", "task"),
            ("FinancialAnalyst", "Solid margins."),
            ("InvestmentStrategist", "Hold. ANALYSIS_COMPLETE"),
        ]);
        assert_eq!(
            FinancialOutcome::from_transcript(&result),
            FinancialOutcome::Unstructured {
                analysis: "Solid margins. Hold. ANALYSIS_COMPLETE".to_string(),
                investment_strategy: "Manual review required".to_string(),
                note: "Agents responded but JSON extraction failed".to_string(),
            }
        );
    }

    #[test]
    fn empty_transcript_reports_debug_info() {
        let result = transcript(&[("user", "task")]);
        assert_eq!(
            serde_json::to_value(FinancialOutcome::from_transcript(&result)).expect("serializes"),
            json!({
                "error": "No agent responses found",
                "debug_info": "Total messages: 1, Stop reason: Text 'ANALYSIS_COMPLETE' mentioned"
            })
        );
    }

    #[tokio::test]
    async fn agent_failure_becomes_error_report() {
        let model = Arc::new(ScriptedModel::with_responses(vec![Err(
            ProviderError::Request("connection reset".to_string()),
        )]));
        let report = FinancialAnalyzer::with_model(model)
            .analyze_stock_performance(&sample_companies()[1])
            .await;

        assert_eq!(report.framework, Framework::RoundRobinTeam);
        assert!(
            report
                .error()
                .is_some_and(|error| error.contains("FinancialAnalyst"))
        );
    }

    #[tokio::test]
    async fn incomplete_config_disables_the_adapter() {
        let analyzer = FinancialAnalyzer::new(&Config::default());
        assert!(!analyzer.is_available());

        let report = analyzer
            .analyze_stock_performance(&sample_companies()[0])
            .await;
        assert_eq!(
            report.error(),
            Some("Financial analysis client not available")
        );
    }
}
