use crate::identity::{IdentityProvider, OidcClient};
use crate::session_guard::SessionGuard;
use crate::sse::SseDecoder;
use domain::error::{ClientError, ClientResult};
use domain::models::ToolDescriptor;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde_json::Value;
use shared::telemetry::Telemetry;
use shared::types::Result;
use shared::utils::redact_query;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest server error body carried into an error message.
const ERROR_BODY_LIMIT: usize = 512;

/// HTTP client for the assistant backend. Every call goes through the
/// session guard, which fails before any request is sent when there is no
/// authenticated session.
pub struct BackendClient<P = OidcClient> {
    http: Client,
    base_url: String,
    guard: Arc<SessionGuard<P>>,
    stream_token_in_query: bool,
}

impl<P> Clone for BackendClient<P> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            guard: Arc::clone(&self.guard),
            stream_token_in_query: self.stream_token_in_query,
        }
    }
}

impl<P: IdentityProvider> BackendClient<P> {
    pub fn new(
        base_url: &str,
        guard: Arc<SessionGuard<P>>,
        connect_timeout: Duration,
        stream_token_in_query: bool,
    ) -> Result<Self> {
        let http = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            guard,
            stream_token_in_query,
        })
    }

    pub fn guard(&self) -> &Arc<SessionGuard<P>> {
        &self.guard
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /llm/chat`: prior prompts as the JSON body, answer as plain text.
    pub async fn chat(
        &self,
        prompt: &str,
        system_prompt: &str,
        history: &[String],
    ) -> ClientResult<String> {
        let telemetry = Telemetry::new();
        let url = self.url("/llm/chat");
        let request = self
            .http
            .post(&url)
            .query(&[("prompt", prompt), ("systemPrompt", system_prompt)])
            .json(history);
        let response = self
            .guard
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(transport_error)?;
        let answer = success_text(response).await?;
        debug!(
            "POST {} answered {} bytes in {}ms",
            url,
            answer.len(),
            telemetry.elapsed_ms()
        );
        Ok(answer)
    }

    /// `GET /llm/search/similar`. The payload is returned as raw JSON;
    /// its shape varies between backend versions.
    pub async fn search_similar(&self, text: &str, top_k: usize) -> ClientResult<Value> {
        let telemetry = Telemetry::new();
        let url = self.url("/llm/search/similar");
        let request = self
            .http
            .get(&url)
            .query(&[("text", text.to_string()), ("topK", top_k.to_string())]);
        let response = self
            .guard
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(transport_error)?;
        let body = success_text(response).await?;
        debug!("GET {} answered in {}ms", url, telemetry.elapsed_ms());
        serde_json::from_str(&body)
            .map_err(|e| ClientError::MalformedResponseShape(format!("invalid JSON: {e}")))
    }

    /// `GET /llm/tools`: tools the backend can call on the model's behalf.
    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        let request = self.http.get(self.url("/llm/tools"));
        let response = self
            .guard
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(transport_error)?;
        let body = success_text(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::network(format!("unreadable tool list: {e}")))
    }

    /// Opens `GET /llm/chat/stream`. The credential is passed in rather than
    /// fetched here: the caller obtains it first and reports a failure to do
    /// so differently from a failed connection.
    pub async fn open_chat_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
        token: &str,
    ) -> ClientResult<ChatStream> {
        let url = self.url("/llm/chat/stream");
        let mut query = vec![("prompt", prompt), ("systemPrompt", system_prompt)];
        if self.stream_token_in_query {
            query.push(("authToken", token));
        }
        let response = self
            .http
            .get(&url)
            .query(&query)
            .bearer_auth(token)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::server(status.as_u16(), truncate(body)));
        }
        debug!("GET {} stream opened", redact_query(response.url().as_str()));
        Ok(ChatStream::new(response))
    }
}

/// An open server-push connection yielding message payloads in arrival order.
/// Dropping the stream closes the connection.
pub struct ChatStream {
    response: Option<Response>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

impl ChatStream {
    fn new(response: Response) -> Self {
        Self {
            response: Some(response),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next fragment; `None` once the server ended the stream cleanly.
    /// A transport error closes the stream.
    pub async fn next_fragment(&mut self) -> Option<ClientResult<String>> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Some(Ok(fragment));
            }
            let response = self.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    for event in self.decoder.feed(&bytes) {
                        if event.is_message() {
                            self.ready.push_back(event.data);
                        }
                    }
                }
                Ok(None) => {
                    self.response = None;
                    return None;
                }
                Err(e) => {
                    self.close();
                    return Some(Err(transport_error(e)));
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.response = None;
        self.ready.clear();
    }
}

/// reqwest errors carry the request URL, which may hold the access token.
fn transport_error(error: reqwest::Error) -> ClientError {
    ClientError::network(error.without_url().to_string())
}

async fn success_text(response: Response) -> ClientResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(ClientError::server(status.as_u16(), truncate(body)));
    }
    Ok(body)
}

fn truncate(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
