//! Legal document review: summary and clause extraction run in parallel, then
//! a risk assessment over the summary.

use std::sync::Arc;

use futures_util::future::try_join;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use super::{Framework, Report, connect, print_banner, print_report};
use crate::chain::{JsonOutputParser, LlmChain, PromptTemplate};
use crate::config::Config;
use crate::error::{ChainError, ShowcaseError};
use crate::extract::extract_json_from_text;
use crate::llm::ChatModel;

const FRAMEWORK: Framework = Framework::ParallelChain;
const TEMPERATURE: f32 = 0.0;

const SUMMARY_TEMPLATE: &str = "Summarize the following legal document concisely, highlighting its main purpose and key agreements.
Document: {document_text}";

const CLAUSES_TEMPLATE: &str = r#"From the following legal document, identify and extract the most important clauses related to rights, obligations, and termination conditions.
List them as a JSON array of strings.
Document: {document_text}
Return only a JSON array, e.g., ["clause1", "clause2", "clause3"]."#;

const RISK_TEMPLATE: &str = r#"Given the following legal document and its summary, assess potential legal risks or ambiguous points.
Provide your assessment in JSON format with a risk level (Low, Medium, High) and bullet points of specific risks.
Document Summary: {summary}
Full Document (for context): {document_text}
Return only valid JSON: {{ "risk_level": "Low/Medium/High", "identified_risks": ["risk1", "risk2"] }}"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalAnalysis {
    pub document_summary: String,
    pub key_clauses_extracted: Vec<Value>,
    pub risk_assessment: Value,
    pub status: &'static str,
}

/// Shape of the clause-extraction output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseOutput {
    /// The model returned the requested JSON array.
    Listed(Vec<Value>),
    /// Not an array; an object was recovered from its text form.
    Recovered(Map<String, Value>),
    Unrecognized,
}

impl ClauseOutput {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(clauses) => ClauseOutput::Listed(clauses),
            other => {
                let text = match &other {
                    Value::String(text) => text.clone(),
                    _ => other.to_string(),
                };
                let recovered = extract_json_from_text(&text);
                if recovered.is_empty() {
                    ClauseOutput::Unrecognized
                } else {
                    ClauseOutput::Recovered(recovered)
                }
            }
        }
    }

    pub fn into_clauses(self) -> Vec<Value> {
        match self {
            ClauseOutput::Listed(clauses) => clauses,
            ClauseOutput::Recovered(object) => vec![Value::String(Value::Object(object).to_string())],
            ClauseOutput::Unrecognized => Vec::new(),
        }
    }
}

#[derive(Clone)]
struct LegalChains {
    summary: LlmChain,
    clauses: LlmChain,
    risk: LlmChain,
}

impl LegalChains {
    fn build(model: Arc<dyn ChatModel>) -> Result<Self, ChainError> {
        Ok(Self {
            summary: LlmChain::new("summary", PromptTemplate::new(SUMMARY_TEMPLATE)?, model.clone()),
            clauses: LlmChain::new("key_clauses", PromptTemplate::new(CLAUSES_TEMPLATE)?, model.clone()),
            risk: LlmChain::new("risk_assessment", PromptTemplate::new(RISK_TEMPLATE)?, model),
        })
    }

    async fn run(&self, document: &str) -> Result<LegalAnalysis, ChainError> {
        let parser = JsonOutputParser;
        let document_vars = [("document_text", document)];

        let (summary, clauses) = try_join(
            self.summary.invoke(&document_vars),
            self.clauses.invoke_json(&document_vars, &parser),
        )
        .await?;

        let risk_assessment = self
            .risk
            .invoke_json(&[("document_text", document), ("summary", summary.as_str())], &parser)
            .await?;

        Ok(LegalAnalysis {
            document_summary: summary,
            key_clauses_extracted: ClauseOutput::from_value(clauses).into_clauses(),
            risk_assessment,
            status: "completed",
        })
    }
}

pub struct LegalWorkflow {
    chains: Option<LegalChains>,
}

impl LegalWorkflow {
    pub fn new(config: &Config) -> Self {
        let model = match connect(config, Some(TEMPERATURE)) {
            Ok(model) => model,
            Err(err) => {
                error!("Error setting up legal workflow: {err}");
                return Self { chains: None };
            }
        };
        Self::with_model(model)
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        match LegalChains::build(model) {
            Ok(chains) => {
                info!("legal workflow initialized");
                Self {
                    chains: Some(chains),
                }
            }
            Err(err) => {
                error!("Error setting up legal workflow: {err}");
                Self { chains: None }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.chains.is_some()
    }

    pub async fn analyze_legal_document(&self, document: &str) -> Report<LegalAnalysis> {
        let Some(chains) = &self.chains else {
            return Report::failed(FRAMEWORK, "Legal chain not available or not properly initialized");
        };

        info!(chars = document.len(), "starting legal document analysis");
        match chains.run(document).await {
            Ok(analysis) => Report::completed(FRAMEWORK, analysis),
            Err(err) => {
                error!("Legal document analysis failed: {err}");
                Report::failed(FRAMEWORK, err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegalDocument {
    pub name: &'static str,
    pub content: &'static str,
}

pub fn sample_document(scenario: &str) -> LegalDocument {
    match scenario {
        "simple_contract" => LegalDocument {
            name: "Simple Service Agreement",
            content: SIMPLE_SERVICE_AGREEMENT,
        },
        "complex_nda" => LegalDocument {
            name: "Complex Non-Disclosure Agreement",
            content: COMPLEX_NDA,
        },
        _ => LegalDocument {
            name: "Empty Document",
            content: "",
        },
    }
}

pub async fn showcase(config: &Config) -> Result<(), ShowcaseError> {
    print_banner("PARALLEL CHAIN: LEGAL DOCUMENT ANALYSIS");
    if !config.validate() {
        println!("{}", super::INVALID_CONFIG_MESSAGE);
        return Ok(());
    }

    let workflow = LegalWorkflow::new(config);
    for scenario in ["simple_contract", "complex_nda"] {
        let document = sample_document(scenario);
        println!("\nAnalyzing: {}", document.name);
        let report = workflow.analyze_legal_document(document.content).await;
        print_report(&report)?;
    }
    Ok(())
}

const SIMPLE_SERVICE_AGREEMENT: &str = r#"This Service Agreement ("Agreement") is made effective as of January 1, 2025,
between Company A (the "Service Provider") and Company B (the "Client").

1. Services. The Service Provider agrees to provide web development services
   to the Client, as detailed in Exhibit A.
2. Payment. The Client shall pay the Service Provider a fee of $5,000 upon
   completion of services.
3. Term. This Agreement shall commence on the Effective Date and continue
   until the services are completed, unless terminated earlier.
4. Termination. Either party may terminate this Agreement with 30 days'
   written notice.
5. Governing Law. This Agreement shall be governed by the laws of the State of New York."#;

const COMPLEX_NDA: &str = r#"NON-DISCLOSURE AGREEMENT

This Non-Disclosure Agreement (hereinafter "Agreement"), dated this 25th day of June, 2025 (the "Effective Date"),
is made by and between Global Innovations Inc. (hereinafter "Disclosing Party")
and Tech Solutions LLC (hereinafter "Receiving Party").

WHEREAS, the Disclosing Party possesses certain confidential and proprietary information
(hereinafter "Confidential Information") that it wishes to disclose to the Receiving Party
for the sole purpose of evaluating a potential business collaboration (the "Permitted Purpose");

NOW, THEREFORE, in consideration of the mutual covenants and agreements contained herein,
the parties agree as follows:

1. Definition of Confidential Information. "Confidential Information" shall mean any and all
   information disclosed by the Disclosing Party to the Receiving Party, whether oral,
   written, electronic, or in any other form, including but not limited to, trade secrets,
   business plans, financial data, customer lists, technical data, product designs, marketing strategies,
   and software code. This does not include information that is publicly available or independently developed.

2. Obligations of Receiving Party. The Receiving Party agrees:
   a. To use the Confidential Information solely for the Permitted Purpose.
   b. To maintain the Confidential Information in strict confidence and take all reasonable measures
      to protect its secrecy.
   c. Not to disclose, copy, or reproduce any Confidential Information without the prior
      written consent of the Disclosing Party.
   d. To limit access to Confidential Information to its employees, agents, or contractors
      who have a need to know for the Permitted Purpose and who are bound by confidentiality obligations
      at least as restrictive as those contained herein.

3. Term and Termination. This Agreement shall remain in effect for a period of five (5) years
   from the Effective Date, or until the Confidential Information becomes public knowledge
   through no fault of the Receiving Party. Either party may terminate this Agreement
   immediately upon written notice if the other party breaches any material term of this Agreement.
   Upon termination, all Confidential Information shall be returned or destroyed.

4. Return of Confidential Information. Upon request of the Disclosing Party, the Receiving Party
   shall promptly return or destroy all Confidential Information.

5. Remedies. The Receiving Party acknowledges that a breach of this Agreement would cause
   irreparable harm to the Disclosing Party, for which monetary damages would be an inadequate remedy.
   Therefore, the Disclosing Party shall be entitled to seek injunctive relief in addition to any other
   remedies available at law or in equity.

6. Governing Law. This Agreement shall be governed by and construed in accordance with the
   laws of the State of Delaware, without regard to its conflict of law principles."#;

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::error::ProviderError;
    use crate::llm::ModelCompletion;
    use crate::llm::testing::{ScriptedModel, user_text};

    fn scripted(clauses_reply: &'static str) -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::responding(move |messages| {
            let prompt = user_text(messages);
            let reply = if prompt.starts_with("Summarize") {
                "Service agreement for web development."
            } else if prompt.starts_with("From the following") {
                clauses_reply
            } else {
                "```json\n{\"risk_level\": \"Low\", \"identified_risks\": [\"Exhibit A is undefined\"]}\n```"
            };
            Ok(ModelCompletion::text(reply))
        }))
    }

    #[test]
    fn clause_output_shapes() {
        assert_eq!(
            ClauseOutput::from_value(json!(["Payment", "Termination"])).into_clauses(),
            vec![json!("Payment"), json!("Termination")]
        );
        assert_eq!(
            ClauseOutput::from_value(json!({"clause": "Payment"})),
            ClauseOutput::Recovered(
                json!({"clause": "Payment"})
                    .as_object()
                    .cloned()
                    .expect("object")
            )
        );
        assert_eq!(
            ClauseOutput::from_value(json!({"clause": "Payment"})).into_clauses(),
            vec![json!("{\"clause\":\"Payment\"}")]
        );
        assert_eq!(ClauseOutput::from_value(json!(42)), ClauseOutput::Unrecognized);
        assert!(ClauseOutput::from_value(json!("none")).into_clauses().is_empty());
    }

    #[tokio::test]
    async fn full_analysis_report() {
        let model = scripted(r#"["Payment of $5,000", "30 days' notice"]"#);
        let workflow = LegalWorkflow::with_model(model.clone());

        let report = workflow
            .analyze_legal_document(sample_document("simple_contract").content)
            .await;

        assert_eq!(
            serde_json::to_value(&report).expect("serializes"),
            json!({
                "framework": "parallel_chain",
                "document_summary": "Service agreement for web development.",
                "key_clauses_extracted": ["Payment of $5,000", "30 days' notice"],
                "risk_assessment": {
                    "risk_level": "Low",
                    "identified_risks": ["Exhibit A is undefined"]
                },
                "status": "completed"
            })
        );

        let calls = model.calls();
        assert_eq!(calls.len(), 3);
        let risk_prompt = user_text(&calls[2]);
        assert!(risk_prompt.contains("Document Summary: Service agreement for web development."));
        assert!(risk_prompt.contains("{ \"risk_level\": \"Low/Medium/High\""));
    }

    #[tokio::test]
    async fn object_shaped_clauses_are_wrapped() {
        let workflow = LegalWorkflow::with_model(scripted(r#"{"termination": "30 days"}"#));
        let report = workflow.analyze_legal_document("An agreement.").await;

        let analysis = report.payload().expect("completed");
        assert_eq!(
            analysis.key_clauses_extracted,
            vec![json!("{\"termination\":\"30 days\"}")]
        );
    }

    #[tokio::test]
    async fn empty_document_still_runs_the_chain() {
        let model = scripted("[]");
        let report = LegalWorkflow::with_model(model.clone())
            .analyze_legal_document(sample_document("unknown").content)
            .await;

        assert!(report.payload().is_some_and(|analysis| analysis.key_clauses_extracted.is_empty()));
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn unparseable_clauses_fail_the_run() {
        let report = LegalWorkflow::with_model(scripted("The key clauses are payment and term."))
            .analyze_legal_document("An agreement.")
            .await;
        assert_eq!(report.framework, Framework::ParallelChain);
        assert!(report.error().is_some_and(|error| error.contains("failed to parse model output")));
    }

    #[tokio::test]
    async fn provider_error_becomes_error_report() {
        let model = Arc::new(ScriptedModel::responding(|_| {
            Err(ProviderError::Auth("token expired".to_string()))
        }));
        let report = LegalWorkflow::with_model(model)
            .analyze_legal_document("An agreement.")
            .await;
        assert!(report.error().is_some_and(|error| error.contains("token expired")));
    }
}
