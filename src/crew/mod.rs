//! Role-playing agents working through tasks in a sequential process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{CrewError, ProviderError};
use crate::llm::{ChatModel, ModelMessage, ModelToolChoice};

#[derive(Clone)]
pub struct CrewAgent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub verbose: bool,
    model: Arc<dyn ChatModel>,
}

impl CrewAgent {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            verbose: false,
            model,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }

    async fn perform(&self, task: &Task, context: &[&TaskOutput]) -> Result<String, ProviderError> {
        let mut prompt = format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\nyou MUST return the actual complete content as the final answer, not a summary.",
            task.description.trim(),
            task.expected_output
        );
        if !context.is_empty() {
            let joined = context
                .iter()
                .map(|output| output.raw.as_str())
                .collect::<Vec<_>>()
                .join("\n\n----------\n\n");
            prompt.push_str("\n\nThis is the context you're working with:\n");
            prompt.push_str(&joined);
        }

        let messages = [
            ModelMessage::System(self.system_prompt()),
            ModelMessage::User(prompt),
        ];
        let completion = self
            .model
            .invoke(&messages, &[], ModelToolChoice::None)
            .await?;
        completion
            .text
            .ok_or_else(|| ProviderError::Response("agent produced no text".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    /// Role of the agent that performs the task.
    pub agent: String,
    /// Names of earlier tasks whose outputs are passed in. Empty means all
    /// previous outputs.
    pub context: Vec<String>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: agent.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context<I, T>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.context = tasks.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Process {
    #[default]
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewOutput {
    /// Output of the final task.
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
}

pub struct Crew {
    agents: HashMap<String, CrewAgent>,
    tasks: Vec<Task>,
    process: Process,
}

impl Crew {
    pub fn new(agents: Vec<CrewAgent>, tasks: Vec<Task>, process: Process) -> Result<Self, CrewError> {
        if tasks.is_empty() {
            return Err(CrewError::Config("a crew needs at least one task".to_string()));
        }

        let mut by_role = HashMap::new();
        for agent in agents {
            let role = agent.role.clone();
            if by_role.insert(role.clone(), agent).is_some() {
                return Err(CrewError::Config(format!("duplicate agent role: {role}")));
            }
        }

        let mut seen = HashSet::new();
        for task in &tasks {
            if !by_role.contains_key(&task.agent) {
                return Err(CrewError::Config(format!(
                    "task '{}' is assigned to unknown agent '{}'",
                    task.name, task.agent
                )));
            }
            for dependency in &task.context {
                if !seen.contains(dependency.as_str()) {
                    return Err(CrewError::Config(format!(
                        "task '{}' takes context from '{dependency}', which does not run before it",
                        task.name
                    )));
                }
            }
            if !seen.insert(task.name.as_str()) {
                return Err(CrewError::Config(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }

        Ok(Self {
            agents: by_role,
            tasks,
            process,
        })
    }

    pub async fn kickoff(&self) -> Result<CrewOutput, CrewError> {
        match self.process {
            Process::Sequential => self.run_sequential().await,
        }
    }

    async fn run_sequential(&self) -> Result<CrewOutput, CrewError> {
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let agent = self
                .agents
                .get(&task.agent)
                .ok_or_else(|| CrewError::Config(format!("unknown agent '{}'", task.agent)))?;

            let context = if task.context.is_empty() {
                outputs.iter().collect::<Vec<_>>()
            } else {
                outputs
                    .iter()
                    .filter(|output| task.context.contains(&output.task))
                    .collect()
            };

            info!(task = %task.name, agent = %agent.role, "starting crew task");
            let raw = agent
                .perform(task, &context)
                .await
                .map_err(|source| CrewError::Task {
                    task: task.name.clone(),
                    source,
                })?;
            if agent.verbose {
                debug!(task = %task.name, agent = %agent.role, output = %raw, "crew task finished");
            }

            outputs.push(TaskOutput {
                task: task.name.clone(),
                agent: agent.role.clone(),
                raw,
            });
        }

        let raw = outputs
            .last()
            .map(|output| output.raw.clone())
            .unwrap_or_default();
        Ok(CrewOutput {
            raw,
            tasks_output: outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::llm::testing::{ScriptedModel, user_text};

    fn agent(role: &str, model: Arc<dyn ChatModel>) -> CrewAgent {
        CrewAgent::new(role, format!("{role} goal"), format!("{role} backstory"), model)
    }

    #[test]
    fn crew_validation() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::with_texts(Vec::<String>::new()));
        let writer = || agent("Writer", model.clone());

        assert!(matches!(
            Crew::new(vec![writer()], Vec::new(), Process::Sequential),
            Err(CrewError::Config(_))
        ));

        let unknown_agent = vec![Task::new("draft", "d", "e", "Ghost")];
        assert!(Crew::new(vec![writer()], unknown_agent, Process::Sequential).is_err());

        let forward_context = vec![
            Task::new("edit", "d", "e", "Writer").with_context(["draft"]),
            Task::new("draft", "d", "e", "Writer"),
        ];
        assert!(Crew::new(vec![writer()], forward_context, Process::Sequential).is_err());

        let duplicate = vec![
            Task::new("draft", "d", "e", "Writer"),
            Task::new("draft", "d", "e", "Writer"),
        ];
        assert!(Crew::new(vec![writer()], duplicate, Process::Sequential).is_err());
    }

    #[tokio::test]
    async fn sequential_tasks_pass_context_forward() {
        let writer_model = Arc::new(ScriptedModel::with_texts(["rough draft"]));
        let editor_model = Arc::new(ScriptedModel::with_texts(["polished post"]));

        let crew = Crew::new(
            vec![
                agent("Writer", writer_model.clone()),
                agent("Editor", editor_model.clone()),
            ],
            vec![
                Task::new("draft", "Draft a post", "A draft", "Writer"),
                Task::new("edit", "Edit the post", "A final post", "Editor").with_context(["draft"]),
            ],
            Process::Sequential,
        )
        .expect("crew builds");

        let output = crew.kickoff().await.expect("kickoff succeeds");

        assert_eq!(output.raw, "polished post");
        assert_eq!(output.tasks_output.len(), 2);
        assert_eq!(output.tasks_output[0].raw, "rough draft");

        let writer_prompt = user_text(&writer_model.calls()[0]);
        assert!(writer_prompt.contains("Current Task: Draft a post"));
        assert!(!writer_prompt.contains("context you're working with"));

        let editor_calls = editor_model.calls();
        let editor_call = &editor_calls[0];
        assert_eq!(
            editor_call[0],
            ModelMessage::System(
                "You are Editor. Editor backstory\nYour personal goal is: Editor goal".to_string()
            )
        );
        let editor_prompt = user_text(editor_call);
        assert!(editor_prompt.contains("A final post"));
        assert!(editor_prompt.ends_with("rough draft"));
    }

    #[tokio::test]
    async fn tasks_without_context_see_all_previous_outputs() {
        let model = Arc::new(ScriptedModel::with_texts(["one", "two", "three"]));
        let crew = Crew::new(
            vec![agent("Worker", model.clone())],
            vec![
                Task::new("a", "first", "x", "Worker"),
                Task::new("b", "second", "x", "Worker"),
                Task::new("c", "third", "x", "Worker"),
            ],
            Process::default(),
        )
        .expect("crew builds");

        crew.kickoff().await.expect("kickoff succeeds");

        let third_prompt = user_text(&model.calls()[2]);
        assert!(third_prompt.contains("one\n\n----------\n\ntwo"));
    }

    #[tokio::test]
    async fn task_failure_names_the_task() {
        let model = Arc::new(ScriptedModel::with_responses(vec![Err(
            ProviderError::Auth("bad key".to_string()),
        )]));
        let crew = Crew::new(
            vec![agent("Writer", model)],
            vec![Task::new("draft", "d", "e", "Writer")],
            Process::Sequential,
        )
        .expect("crew builds");

        let err = crew.kickoff().await.expect_err("must fail");
        assert!(matches!(err, CrewError::Task { ref task, .. } if task == "draft"));
    }
}
