//! Round-robin group chat.
//!
//! Assistant agents take turns answering over a shared transcript that starts
//! with the task. After every turn the termination condition is checked; the
//! first condition to fire ends the run and its reason is recorded.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ProviderError, TeamError};
use crate::llm::{ChatModel, ModelMessage, ModelToolChoice};

/// Source label of the task message that opens every transcript.
pub const TASK_SOURCE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMessage {
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub messages: Vec<TeamMessage>,
    pub stop_reason: Option<String>,
}

#[derive(Clone)]
pub struct AssistantAgent {
    name: String,
    system_message: String,
    model: Arc<dyn ChatModel>,
}

impl AssistantAgent {
    pub fn new(
        name: impl Into<String>,
        system_message: impl Into<String>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            name: name.into(),
            system_message: system_message.into(),
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transcript as this agent sees it: its own turns as assistant
    /// messages, everyone else's as user messages tagged with the speaker.
    fn context(&self, transcript: &[TeamMessage]) -> Vec<ModelMessage> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ModelMessage::System(self.system_message.clone()));
        for message in transcript {
            if message.source == self.name {
                messages.push(ModelMessage::Assistant {
                    content: Some(message.content.clone()),
                    tool_calls: Vec::new(),
                });
            } else if message.source == TASK_SOURCE {
                messages.push(ModelMessage::User(message.content.clone()));
            } else {
                messages.push(ModelMessage::User(format!(
                    "[{}]: {}",
                    message.source, message.content
                )));
            }
        }
        messages
    }

    async fn respond(&self, transcript: &[TeamMessage]) -> Result<String, ProviderError> {
        let completion = self
            .model
            .invoke(&self.context(transcript), &[], ModelToolChoice::None)
            .await?;
        completion
            .text
            .ok_or_else(|| ProviderError::Response("agent produced no text".to_string()))
    }
}

/// When a team run should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// An agent message contains the text.
    TextMention(String),
    /// The transcript, task message included, reaches this many messages.
    MaxMessages(usize),
    /// Whichever inner condition fires first.
    Any(Vec<Termination>),
}

impl Termination {
    pub fn any(conditions: impl IntoIterator<Item = Termination>) -> Self {
        Termination::Any(conditions.into_iter().collect())
    }

    /// Returns the stop reason if the condition holds for the transcript.
    pub fn check(&self, transcript: &[TeamMessage]) -> Option<String> {
        match self {
            Termination::TextMention(text) => transcript
                .iter()
                .filter(|message| message.source != TASK_SOURCE)
                .any(|message| message.content.contains(text.as_str()))
                .then(|| format!("Text '{text}' mentioned")),
            Termination::MaxMessages(max) => (transcript.len() >= *max).then(|| {
                format!(
                    "Maximum number of messages {max} reached, current message count: {}",
                    transcript.len()
                )
            }),
            Termination::Any(conditions) => conditions
                .iter()
                .find_map(|condition| condition.check(transcript)),
        }
    }
}

pub struct RoundRobinGroupChat {
    agents: Vec<AssistantAgent>,
    termination: Termination,
    max_turns: Option<usize>,
}

impl RoundRobinGroupChat {
    pub fn new(agents: Vec<AssistantAgent>, termination: Termination) -> Result<Self, TeamError> {
        if agents.is_empty() {
            return Err(TeamError::Config(
                "a team needs at least one agent".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for agent in &agents {
            if agent.name == TASK_SOURCE {
                return Err(TeamError::Config(format!(
                    "agent name '{TASK_SOURCE}' is reserved for the task message"
                )));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(TeamError::Config(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
        }

        Ok(Self {
            agents,
            termination,
            max_turns: None,
        })
    }

    /// Caps the number of agent turns regardless of the termination condition.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(AssistantAgent::name).collect()
    }

    pub async fn run(&self, task: impl Into<String>) -> Result<TaskResult, TeamError> {
        let mut transcript = vec![TeamMessage {
            source: TASK_SOURCE.to_string(),
            content: task.into(),
        }];

        info!(agents = ?self.agent_names(), "starting round-robin run");

        if let Some(reason) = self.termination.check(&transcript) {
            return Ok(TaskResult {
                messages: transcript,
                stop_reason: Some(reason),
            });
        }

        let mut turn = 0;
        for agent in self.agents.iter().cycle() {
            if self.max_turns.is_some_and(|max| turn >= max) {
                return Ok(TaskResult {
                    messages: transcript,
                    stop_reason: Some(format!("Maximum number of turns {turn} reached.")),
                });
            }
            turn += 1;

            let content = agent
                .respond(&transcript)
                .await
                .map_err(|source| TeamError::Agent {
                    agent: agent.name.clone(),
                    source,
                })?;
            debug!(agent = %agent.name, turn, chars = content.len(), "agent replied");
            transcript.push(TeamMessage {
                source: agent.name.clone(),
                content,
            });

            if let Some(reason) = self.termination.check(&transcript) {
                info!(turns = turn, %reason, "round-robin run stopped");
                return Ok(TaskResult {
                    messages: transcript,
                    stop_reason: Some(reason),
                });
            }
        }

        // `cycle` over a non-empty list never ends.
        Ok(TaskResult {
            messages: transcript,
            stop_reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::llm::ModelCompletion;
    use crate::llm::testing::ScriptedModel;

    fn message(source: &str, content: &str) -> TeamMessage {
        TeamMessage {
            source: source.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn termination_reasons_match_condition() {
        let transcript = vec![
            message("user", "task mentions ANALYSIS_COMPLETE"),
            message("a", "first"),
        ];

        assert_eq!(
            Termination::TextMention("ANALYSIS_COMPLETE".to_string()).check(&transcript),
            None
        );
        assert_eq!(
            Termination::MaxMessages(2).check(&transcript),
            Some("Maximum number of messages 2 reached, current message count: 2".to_string())
        );

        let mentioned = vec![message("user", "task"), message("b", "done ANALYSIS_COMPLETE")];
        assert_eq!(
            Termination::any([
                Termination::TextMention("ANALYSIS_COMPLETE".to_string()),
                Termination::MaxMessages(10),
            ])
            .check(&mentioned),
            Some("Text 'ANALYSIS_COMPLETE' mentioned".to_string())
        );
    }

    #[test]
    fn construction_rejects_bad_teams() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::with_texts(Vec::<String>::new()));
        assert!(matches!(
            RoundRobinGroupChat::new(Vec::new(), Termination::MaxMessages(2)),
            Err(TeamError::Config(_))
        ));

        let twins = vec![
            AssistantAgent::new("Twin", "a", model.clone()),
            AssistantAgent::new("Twin", "b", model.clone()),
        ];
        assert!(matches!(
            RoundRobinGroupChat::new(twins, Termination::MaxMessages(2)),
            Err(TeamError::Config(message)) if message.contains("duplicate")
        ));

        let reserved = vec![AssistantAgent::new("user", "a", model)];
        assert!(RoundRobinGroupChat::new(reserved, Termination::MaxMessages(2)).is_err());
    }

    #[tokio::test]
    async fn agents_alternate_until_text_mention() {
        let analyst = Arc::new(ScriptedModel::with_texts(["numbers look fine"]));
        let strategist = Arc::new(ScriptedModel::with_texts(["{\"investment_strategy\": \"Buy\"} ANALYSIS_COMPLETE"]));

        let team = RoundRobinGroupChat::new(
            vec![
                AssistantAgent::new("Analyst", "analyse", analyst.clone()),
                AssistantAgent::new("Strategist", "recommend", strategist.clone()),
            ],
            Termination::any([
                Termination::TextMention("ANALYSIS_COMPLETE".to_string()),
                Termination::MaxMessages(10),
            ]),
        )
        .expect("team builds");

        let result = team.run("analyse ACME").await.expect("run succeeds");

        let sources = result
            .messages
            .iter()
            .map(|message| message.source.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sources, vec!["user", "Analyst", "Strategist"]);
        assert_eq!(
            result.stop_reason.as_deref(),
            Some("Text 'ANALYSIS_COMPLETE' mentioned")
        );

        assert_eq!(
            strategist.calls()[0],
            vec![
                ModelMessage::System("recommend".to_string()),
                ModelMessage::User("analyse ACME".to_string()),
                ModelMessage::User("[Analyst]: numbers look fine".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn own_turns_are_replayed_as_assistant_messages() {
        let model = Arc::new(ScriptedModel::responding(|messages| {
            Ok(ModelCompletion::text(format!("turn {}", messages.len())))
        }));

        let team = RoundRobinGroupChat::new(
            vec![AssistantAgent::new("Solo", "sys", model.clone())],
            Termination::MaxMessages(3),
        )
        .expect("team builds");

        let result = team.run("go").await.expect("run succeeds");

        assert_eq!(result.messages.len(), 3);
        assert_eq!(
            result.stop_reason.as_deref(),
            Some("Maximum number of messages 3 reached, current message count: 3")
        );
        assert_eq!(
            model.calls()[1][2],
            ModelMessage::Assistant {
                content: Some("turn 2".to_string()),
                tool_calls: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn max_turns_caps_a_run_that_never_terminates() {
        let model = Arc::new(ScriptedModel::responding(|_| Ok(ModelCompletion::text("more"))));
        let team = RoundRobinGroupChat::new(
            vec![AssistantAgent::new("Talker", "sys", model)],
            Termination::TextMention("never".to_string()),
        )
        .expect("team builds")
        .with_max_turns(4);

        let result = team.run("go").await.expect("run succeeds");
        assert_eq!(result.messages.len(), 5);
        assert_eq!(
            result.stop_reason.as_deref(),
            Some("Maximum number of turns 4 reached.")
        );
    }

    #[tokio::test]
    async fn agent_failure_names_the_agent() {
        let model = Arc::new(ScriptedModel::with_responses(vec![Err(
            ProviderError::Request("timeout".to_string()),
        )]));
        let team = RoundRobinGroupChat::new(
            vec![AssistantAgent::new("Broken", "sys", model)],
            Termination::MaxMessages(5),
        )
        .expect("team builds");

        let err = team.run("go").await.expect_err("must fail");
        assert!(matches!(err, TeamError::Agent { ref agent, .. } if agent == "Broken"));
    }
}
