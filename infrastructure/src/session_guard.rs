use crate::identity::IdentityProvider;
use crate::session_store::SessionStore;
use domain::error::{ClientError, ClientResult};
use domain::session::{now_epoch_secs, Session, SessionState, TokenSet};
use reqwest::RequestBuilder;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Owns the session and hands out credentials for outgoing requests,
/// refreshing the access token first when it is about to expire.
///
/// Callers serialise on the session lock, so concurrent requests that find
/// the token near expiry trigger a single refresh.
pub struct SessionGuard<P> {
    provider: P,
    session: Mutex<Session>,
    min_validity: Duration,
    store: Option<SessionStore>,
}

impl<P: IdentityProvider> SessionGuard<P> {
    pub fn new(provider: P, min_validity: Duration) -> Self {
        Self {
            provider,
            session: Mutex::new(Session::new()),
            min_validity,
            store: None,
        }
    }

    /// Persist token changes to `store`.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> Option<&SessionStore> {
        self.store.as_ref()
    }

    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub async fn establish(&self, tokens: TokenSet) {
        let claims = self.provider.claims(&tokens.access_token);
        self.persist(&tokens);
        self.session.lock().await.establish(tokens, claims);
    }

    /// Destroys the session and its persisted copy. Returns the tokens that
    /// were active so the caller can end the session at the provider.
    pub async fn invalidate(&self) -> Option<TokenSet> {
        let mut session = self.session.lock().await;
        let previous = session.tokens().cloned();
        session.invalidate();
        self.forget();
        previous
    }

    /// Ends bootstrap without a session but leaves the persisted copy in
    /// place, so a later run can still restore it.
    pub async fn set_unauthenticated(&self) {
        self.session.lock().await.invalidate();
    }

    /// Current access token, refreshed first if it expires within the
    /// minimum validity window.
    pub async fn credential(&self) -> ClientResult<String> {
        let mut session = self.session.lock().await;
        if !session.is_authenticated() {
            return Err(ClientError::Unauthenticated);
        }

        let now = now_epoch_secs();
        if session.needs_refresh(now, self.min_validity.as_secs()) {
            let refresh_token = session
                .tokens()
                .and_then(|t| t.usable_refresh_token(now))
                .map(str::to_owned);
            let Some(refresh_token) = refresh_token else {
                session.invalidate();
                self.forget();
                return Err(ClientError::CredentialRefreshFailed(
                    "session has no usable refresh token".into(),
                ));
            };

            debug!("Access token near expiry, refreshing");
            match self.provider.refresh(&refresh_token).await {
                Ok(tokens) => {
                    let claims = self.provider.claims(&tokens.access_token);
                    self.persist(&tokens);
                    session.establish(tokens, claims);
                }
                Err(ClientError::Unauthenticated) => {
                    session.invalidate();
                    self.forget();
                    return Err(ClientError::CredentialRefreshFailed(
                        "session expired at the identity provider".into(),
                    ));
                }
                Err(ClientError::CredentialRefreshFailed(reason)) => {
                    return Err(ClientError::CredentialRefreshFailed(reason));
                }
                Err(other) => return Err(ClientError::CredentialRefreshFailed(other.to_string())),
            }
        }

        session
            .access_token()
            .map(str::to_owned)
            .ok_or(ClientError::Unauthenticated)
    }

    /// Attaches `Authorization: Bearer <token>` to `request`.
    pub async fn authorize(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        let token = self.credential().await?;
        Ok(request.bearer_auth(token))
    }

    fn persist(&self, tokens: &TokenSet) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(tokens) {
                warn!("Could not persist session: {e:#}");
            }
        }
    }

    fn forget(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                warn!("Could not remove persisted session: {e:#}");
            }
        }
    }
}
