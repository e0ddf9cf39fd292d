use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatModel, ModelCompletion, ModelMessage, ModelToolChoice, ModelToolDefinition};
use crate::error::ProviderError;

type Responder = dyn Fn(&[ModelMessage]) -> Result<ModelCompletion, ProviderError> + Send + Sync;

/// Test double that answers from a queue, or from a closure over the prompt.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelCompletion, ProviderError>>>,
    responder: Option<Box<Responder>>,
    calls: Mutex<Vec<Vec<ModelMessage>>>,
}

impl ScriptedModel {
    pub(crate) fn with_responses(responses: Vec<Result<ModelCompletion, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_texts<I, T>(texts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::with_responses(
            texts
                .into_iter()
                .map(|text| Ok(ModelCompletion::text(text)))
                .collect(),
        )
    }

    pub(crate) fn responding<F>(responder: F) -> Self
    where
        F: Fn(&[ModelMessage]) -> Result<ModelCompletion, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responses: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ModelMessage>> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

/// Concatenated text of all user messages, for prompt-matching responders.
pub(crate) fn user_text(messages: &[ModelMessage]) -> String {
    messages
        .iter()
        .filter_map(|message| match message {
            ModelMessage::User(content) => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        _tools: &[ModelToolDefinition],
        _tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push(messages.to_vec());

        if let Some(responder) = &self.responder {
            return responder(messages);
        }

        let mut guard = self.responses.lock().expect("lock poisoned");
        guard.pop_front().unwrap_or_else(|| {
            Err(ProviderError::Response(
                "no more mock model responses".to_string(),
            ))
        })
    }
}
