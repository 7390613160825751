use domain::conversation::{ChatMode, ChatState, ConversationHistory};
use infrastructure::backend_client::BackendClient;
use infrastructure::identity::{IdentityProvider, OidcClient};
use shared::utils::is_blank;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Blank prompt, or another request still in flight. Nothing was sent.
    Ignored,
    Completed,
    /// The request failed and the response shows an error message.
    Failed,
    /// The stream broke; partial output stays, nothing is recorded.
    Aborted,
    Cancelled,
}

/// Drives the chat view: one request at a time, either mode.
pub struct ChatService<P = OidcClient> {
    backend: BackendClient<P>,
    state: ChatState,
}

impl<P: IdentityProvider> ChatService<P> {
    pub fn new(backend: BackendClient<P>, history_limit: Option<usize>) -> Self {
        Self {
            backend,
            state: ChatState::new(ConversationHistory::new(history_limit)),
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        self.state.history()
    }

    /// Single-response call carrying the prior history. The prompt joins the
    /// history only once the answer arrived.
    pub async fn send(&mut self, prompt: &str, system_prompt: &str) -> ChatOutcome {
        if is_blank(prompt) || !self.state.begin(ChatMode::Single) {
            return ChatOutcome::Ignored;
        }

        let history = self.state.history().to_vec();
        match self.backend.chat(prompt, system_prompt, &history).await {
            Ok(answer) => {
                self.state.complete_single(prompt, answer);
                ChatOutcome::Completed
            }
            Err(e) => {
                warn!("Chat request failed: {e}");
                self.state.fail_single();
                ChatOutcome::Failed
            }
        }
    }

    /// Streams the answer, calling `on_fragment` for each piece as it
    /// arrives. Resolving `cancel` closes the connection.
    pub async fn stream<F, C>(
        &mut self,
        prompt: &str,
        system_prompt: &str,
        mut on_fragment: F,
        cancel: C,
    ) -> ChatOutcome
    where
        F: FnMut(&str),
        C: Future<Output = ()>,
    {
        if is_blank(prompt) || !self.state.begin(ChatMode::Streaming) {
            return ChatOutcome::Ignored;
        }

        let token = match self.backend.guard().credential().await {
            Ok(token) => token,
            Err(e) => {
                warn!("No credential for streaming: {e}");
                self.state.fail_stream_credential();
                return ChatOutcome::Failed;
            }
        };

        let mut stream = match self
            .backend
            .open_chat_stream(prompt, system_prompt, &token)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Chat stream could not be opened: {e}");
                self.state.abort_stream();
                return ChatOutcome::Aborted;
            }
        };

        tokio::pin!(cancel);
        let mut received = 0usize;
        loop {
            tokio::select! {
                next = stream.next_fragment() => match next {
                    Some(Ok(fragment)) => {
                        received += 1;
                        self.state.append_fragment(&fragment);
                        on_fragment(&fragment);
                    }
                    Some(Err(e)) => {
                        warn!("Chat stream interrupted after {received} fragments: {e}");
                        stream.close();
                        self.state.abort_stream();
                        return ChatOutcome::Aborted;
                    }
                    None => {
                        debug!("Chat stream finished after {received} fragments");
                        self.state.finish_stream(prompt);
                        return ChatOutcome::Completed;
                    }
                },
                _ = &mut cancel => {
                    debug!("Chat stream cancelled after {received} fragments");
                    stream.close();
                    self.state.abort_stream();
                    return ChatOutcome::Cancelled;
                }
            }
        }
    }
}
