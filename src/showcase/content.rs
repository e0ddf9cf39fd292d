//! Blog post drafting and editing by a two-agent sequential crew.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use super::{Framework, Report, connect, print_banner, print_report};
use crate::config::Config;
use crate::crew::{Crew, CrewAgent, Process, Task};
use crate::error::{CrewError, ShowcaseError};
use crate::llm::ChatModel;

const FRAMEWORK: Framework = Framework::SequentialCrew;
const TEMPERATURE: f32 = 0.2;
const WRITER_ROLE: &str = "Content Writer";
const EDITOR_ROLE: &str = "Content Editor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogPost {
    pub topic: String,
    pub generated_content: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTopic {
    pub topic: &'static str,
    pub word_count: u32,
}

pub struct ContentCreator {
    team: Option<(CrewAgent, CrewAgent)>,
}

impl ContentCreator {
    pub fn new(config: &Config) -> Self {
        match connect(config, Some(TEMPERATURE)) {
            Ok(model) => {
                info!("content creation crew initialized");
                Self::with_model(model)
            }
            Err(err) => {
                error!("Error setting up content creation crew: {err}");
                Self { team: None }
            }
        }
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        let writer = CrewAgent::new(
            WRITER_ROLE,
            "Draft engaging and informative blog posts based on given topics",
            "Experienced writer with a knack for transforming complex ideas into clear, readable content.",
            model.clone(),
        )
        .verbose(true);
        let editor = CrewAgent::new(
            EDITOR_ROLE,
            "Review, refine, and optimize drafted content for clarity, grammar, and SEO",
            "Detail-oriented editor with a sharp eye for errors and a strong understanding of content best practices.",
            model,
        )
        .verbose(true);

        Self {
            team: Some((writer, editor)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.team.is_some()
    }

    pub async fn generate_blog_post(&self, topic: &str, word_count_target: u32) -> Report<BlogPost> {
        let Some((writer, editor)) = &self.team else {
            return Report::failed(FRAMEWORK, "Content crew not available or not properly initialized");
        };

        info!(topic, "generating blog post");
        match run_crew(writer, editor, topic, word_count_target).await {
            Ok(generated_content) => Report::completed(
                FRAMEWORK,
                BlogPost {
                    topic: topic.to_string(),
                    generated_content,
                    status: "completed",
                },
            ),
            Err(err) => {
                error!("Content creation failed for topic '{topic}': {err}");
                Report::failed(FRAMEWORK, err)
            }
        }
    }
}

async fn run_crew(
    writer: &CrewAgent,
    editor: &CrewAgent,
    topic: &str,
    word_count_target: u32,
) -> Result<String, CrewError> {
    let draft = Task::new(
        "draft",
        format!(
            "Draft a compelling and informative blog post about \"{topic}\".
The post should be approximately {word_count_target} words.
Focus on introducing the topic, explaining key concepts, and providing valuable insights.
Ensure it's well-structured with an introduction, main body, and conclusion."
        ),
        format!("A {word_count_target}-word draft blog post on '{topic}'."),
        WRITER_ROLE,
    );
    let edit = Task::new(
        "edit",
        format!(
            "Review and refine the drafted blog post on \"{topic}\".
- Check for grammar, spelling, and punctuation errors.
- Improve clarity, flow, and conciseness.
- Ensure the tone is appropriate for a professional blog.
- Optimize for readability and engagement.
- Provide the final, polished blog post."
        ),
        "A polished, final version of the blog post, ready for publication.",
        EDITOR_ROLE,
    )
    .with_context(["draft"]);

    let crew = Crew::new(
        vec![writer.clone(), editor.clone()],
        vec![draft, edit],
        Process::Sequential,
    )?;
    Ok(crew.kickoff().await?.raw)
}

pub fn sample_topic(scenario: &str) -> ContentTopic {
    match scenario {
        "tech" => ContentTopic {
            topic: "The Future of AI in Healthcare",
            word_count: 600,
        },
        "marketing" => ContentTopic {
            topic: "Effective SEO Strategies for Small Businesses",
            word_count: 400,
        },
        _ => ContentTopic {
            topic: "General Knowledge",
            word_count: 300,
        },
    }
}

pub async fn showcase(config: &Config) -> Result<(), ShowcaseError> {
    print_banner("SEQUENTIAL CREW: CONTENT CREATION");
    if !config.validate() {
        println!("{}", super::INVALID_CONFIG_MESSAGE);
        return Ok(());
    }

    let creator = ContentCreator::new(config);
    for scenario in ["tech", "marketing"] {
        let sample = sample_topic(scenario);
        println!("\nCreating content for: '{}'", sample.topic);
        let report = creator.generate_blog_post(sample.topic, sample.word_count).await;
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
    use crate::llm::testing::{ScriptedModel, user_text};

    #[test]
    fn scenarios_map_to_topics() {
        assert_eq!(sample_topic("tech").word_count, 600);
        assert_eq!(
            sample_topic("marketing").topic,
            "Effective SEO Strategies for Small Businesses"
        );
        assert_eq!(sample_topic("anything else").topic, "General Knowledge");
        assert_eq!(sample_topic("anything else").word_count, 300);
    }

    #[tokio::test]
    async fn editor_output_is_the_generated_content() {
        let model = Arc::new(ScriptedModel::with_texts(["first draft text", "final polished text"]));
        let creator = ContentCreator::with_model(model.clone());

        let report = creator
            .generate_blog_post("The Future of AI in Healthcare", 600)
            .await;

        assert_eq!(
            serde_json::to_value(&report).expect("serializes"),
            json!({
                "framework": "sequential_crew",
                "topic": "The Future of AI in Healthcare",
                "generated_content": "final polished text",
                "status": "completed"
            })
        );

        let calls = model.calls();
        assert!(user_text(&calls[0]).contains("approximately 600 words"));
        let edit_prompt = user_text(&calls[1]);
        assert!(edit_prompt.contains("Review and refine the drafted blog post"));
        assert!(edit_prompt.contains("first draft text"));
    }

    #[tokio::test]
    async fn crew_failure_becomes_error_report() {
        let model = Arc::new(ScriptedModel::with_responses(vec![
            Ok(crate::llm::ModelCompletion::text("draft")),
            Err(ProviderError::Response("empty choices".to_string())),
        ]));
        let report = ContentCreator::with_model(model)
            .generate_blog_post("General Knowledge", 300)
            .await;

        assert_eq!(report.framework, Framework::SequentialCrew);
        assert!(report.error().is_some_and(|error| error.contains("'edit'")));
    }

    #[tokio::test]
    async fn incomplete_config_disables_the_adapter() {
        let creator = ContentCreator::new(&Config::new("", "key", "https://x", "model"));
        assert!(!creator.is_available());
        assert_eq!(
            creator.generate_blog_post("topic", 100).await.error(),
            Some("Content crew not available or not properly initialized")
        );
    }
}
