use crate::llm::ModelMessage;

const CHARS_PER_TOKEN: usize = 4;
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Conversation history bounded by an approximate token budget.
///
/// Eviction drops the oldest non-system turns first, where an assistant
/// message and the tool results after it form one turn. The system prompt and
/// the turn holding the newest message are always kept, so tool results never
/// outlive the assistant message that requested them.
#[derive(Debug, Clone, Default)]
pub struct TokenMemory {
    messages: Vec<ModelMessage>,
    max_tokens: Option<usize>,
}

impl TokenMemory {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_budget(max_tokens: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_tokens: Some(max_tokens),
        }
    }

    pub fn push(&mut self, message: ModelMessage) {
        self.messages.push(message);
        self.evict();
    }

    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn total_tokens(&self) -> usize {
        self.messages.iter().map(estimate_tokens).sum()
    }

    fn evict(&mut self) {
        let Some(budget) = self.max_tokens else {
            return;
        };

        while self.total_tokens() > budget {
            let Some(start) = self
                .messages
                .iter()
                .position(|message| !matches!(message, ModelMessage::System(_)))
            else {
                break;
            };
            let end = self.turn_end(start);
            // The newest message stays, and so does the turn it belongs to.
            if end >= self.messages.len() {
                break;
            }
            self.messages.drain(start..end);
        }
    }

    /// End (exclusive) of the turn starting at `start`: an assistant message
    /// together with the tool results that answer its calls.
    fn turn_end(&self, start: usize) -> usize {
        let mut end = start + 1;
        while matches!(
            self.messages.get(end),
            Some(ModelMessage::ToolResult { .. })
        ) {
            end += 1;
        }
        end
    }
}

pub fn estimate_tokens(message: &ModelMessage) -> usize {
    message.text_len().div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}
