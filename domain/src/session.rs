use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Authentication status of the client-side session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Identity bootstrap has not finished yet.
    Uninitialized,
    Unauthenticated,
    Authenticated,
}

/// Tokens issued by the identity provider. Expiry values are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub expires_at: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_expires_at: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenSet {
    /// Seconds of validity left at `now`, zero once expired.
    pub fn remaining(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// A refresh token that has not expired yet. Keycloak reports `0`
    /// for refresh tokens without an expiry, which maps to `None` here.
    pub fn usable_refresh_token(&self, now: u64) -> Option<&str> {
        match self.refresh_expires_at {
            Some(exp) if exp <= now => None,
            _ => self.refresh_token.as_deref(),
        }
    }
}

/// Subset of the access token claims the client displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    tokens: Option<TokenSet>,
    claims: Claims,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            tokens: None,
            claims: Claims::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated && self.tokens.is_some()
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        self.tokens.as_ref()
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn establish(&mut self, tokens: TokenSet, claims: Claims) {
        self.tokens = Some(tokens);
        self.claims = claims;
        self.state = SessionState::Authenticated;
    }

    /// Drops credentials on logout, on a rejected refresh, or when bootstrap
    /// finishes without a usable session.
    pub fn invalidate(&mut self) {
        self.tokens = None;
        self.claims = Claims::default();
        self.state = SessionState::Unauthenticated;
    }

    /// True when the access token has less than `min_validity` seconds left.
    pub fn needs_refresh(&self, now: u64, min_validity: u64) -> bool {
        match &self.tokens {
            Some(tokens) => tokens.remaining(now) < min_validity,
            None => false,
        }
    }

    /// Username claim, falling back to email, then a generic label.
    pub fn display_name(&self) -> String {
        self.claims
            .preferred_username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.claims.email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("User")
            .to_string()
    }

    pub fn avatar_letter(&self) -> char {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .unwrap_or('U')
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
