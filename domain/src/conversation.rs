use std::collections::VecDeque;

/// Shown in place of the answer when a non-streaming chat call fails.
pub const CHAT_FAILURE_MESSAGE: &str = "Error: Failed to get response from the server.";

/// Shown when no credential could be obtained for a streaming call.
pub const STREAM_CREDENTIAL_FAILURE_MESSAGE: &str =
    "Error: Could not get auth token for streaming.";

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Prompts the user already sent in this chat session, oldest first.
///
/// With a limit set the history is a rolling window: pushing onto a full
/// history drops the oldest prompt.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    prompts: VecDeque<String>,
    limit: Option<usize>,
}

impl ConversationHistory {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            prompts: VecDeque::new(),
            limit: limit.filter(|&l| l > 0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn push(&mut self, prompt: impl Into<String>) {
        if let Some(limit) = self.limit {
            while self.prompts.len() >= limit {
                self.prompts.pop_front();
            }
        }
        self.prompts.push_back(prompt.into());
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prompts.iter().map(String::as_str)
    }

    /// Snapshot sent as the JSON body of a chat request.
    pub fn to_vec(&self) -> Vec<String> {
        self.prompts.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.prompts.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Single,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Sending,
    Streaming,
    /// Last request failed; accepts new submits like `Idle`.
    Error,
}

/// Chat view state: phase, visible response buffer and history.
///
/// Only the request that won `begin` may write into the response buffer.
/// Every transition out of `Sending`/`Streaming` checks the phase first, so a
/// late completion for a mode that is no longer active is ignored.
#[derive(Debug, Clone)]
pub struct ChatState {
    phase: ChatPhase,
    response: String,
    pending: bool,
    history: ConversationHistory,
}

impl ChatState {
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            phase: ChatPhase::Idle,
            response: String::new(),
            pending: false,
            history,
        }
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, ChatPhase::Sending | ChatPhase::Streaming)
    }

    pub fn input_enabled(&self) -> bool {
        !self.is_busy()
    }

    /// "AI is thinking" indicator: a request is active and nothing arrived yet.
    pub fn is_pending(&self) -> bool {
        self.pending && self.response.is_empty()
    }

    /// Claims the response buffer for a new request. Returns `false` and
    /// leaves the state untouched while another request is in flight.
    pub fn begin(&mut self, mode: ChatMode) -> bool {
        if self.is_busy() {
            return false;
        }
        self.phase = match mode {
            ChatMode::Single => ChatPhase::Sending,
            ChatMode::Streaming => ChatPhase::Streaming,
        };
        self.response.clear();
        self.pending = true;
        true
    }

    pub fn complete_single(&mut self, prompt: &str, answer: String) {
        if self.phase != ChatPhase::Sending {
            return;
        }
        self.response = answer;
        self.history.push(prompt);
        self.finish(ChatPhase::Idle);
    }

    pub fn fail_single(&mut self) {
        if self.phase != ChatPhase::Sending {
            return;
        }
        self.response = CHAT_FAILURE_MESSAGE.to_string();
        self.finish(ChatPhase::Error);
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        if self.phase != ChatPhase::Streaming {
            return;
        }
        self.response.push_str(fragment);
        self.pending = false;
    }

    /// Stream ended cleanly: the prompt counts as asked.
    pub fn finish_stream(&mut self, prompt: &str) {
        if self.phase != ChatPhase::Streaming {
            return;
        }
        self.history.push(prompt);
        self.finish(ChatPhase::Idle);
    }

    /// Stream broke or was cancelled. Whatever arrived stays visible; no
    /// error text and no history entry.
    pub fn abort_stream(&mut self) {
        if self.phase != ChatPhase::Streaming {
            return;
        }
        self.finish(ChatPhase::Idle);
    }

    pub fn fail_stream_credential(&mut self) {
        if self.phase != ChatPhase::Streaming {
            return;
        }
        self.response = STREAM_CREDENTIAL_FAILURE_MESSAGE.to_string();
        self.finish(ChatPhase::Error);
    }

    fn finish(&mut self, phase: ChatPhase) {
        self.phase = phase;
        self.pending = false;
    }
}
