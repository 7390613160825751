use anyhow::{anyhow, Context};
use domain::conversation::DEFAULT_HISTORY_LIMIT;
use domain::models::DEFAULT_TOP_K;
use dotenvy::dotenv;
use shared::types::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Identity provider root, e.g. `http://localhost:9090/`.
    pub url: String,
    pub realm: String,
    pub client_id: String,
}

impl IdentityConfig {
    /// `{url}/realms/{realm}/protocol/openid-connect`
    pub fn endpoint_base(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect",
            self.url.trim_end_matches('/'),
            self.realm
        )
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub identity: IdentityConfig,
    pub search_top_k: usize,
    pub min_token_validity: Duration,
    pub bootstrap_timeout: Duration,
    pub connect_timeout: Duration,
    /// `None` keeps the whole conversation.
    pub history_limit: Option<usize>,
    pub stream_token_in_query: bool,
    pub session_path: PathBuf,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let history_limit: usize = parse(&lookup, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let session_path = match lookup("SESSION_PATH") {
            Some(path) => PathBuf::from(path),
            None => Self::default_session_path(lookup("HOME")),
        };

        Ok(Self {
            backend_url: get("FILES_ASSISTANT_BACKEND_URL", "http://localhost:8080"),
            identity: IdentityConfig {
                url: get("OIDC_URL", "http://localhost:9090/"),
                realm: get("OIDC_REALM", "home"),
                client_id: get("OIDC_CLIENT_ID", "mcpfileclient"),
            },
            search_top_k: parse(&lookup, "SEARCH_TOP_K", DEFAULT_TOP_K)?,
            min_token_validity: Duration::from_secs(parse(&lookup, "TOKEN_MIN_VALIDITY_SECS", 5)?),
            bootstrap_timeout: Duration::from_secs(parse(
                &lookup,
                "IDENTITY_BOOTSTRAP_TIMEOUT_SECS",
                10,
            )?),
            connect_timeout: Duration::from_secs(parse(&lookup, "CONNECT_TIMEOUT_SECS", 10)?),
            history_limit: (history_limit > 0).then_some(history_limit),
            stream_token_in_query: parse_bool(&lookup, "STREAM_TOKEN_IN_QUERY", true)?,
            session_path,
        })
    }

    fn default_session_path(home: Option<String>) -> PathBuf {
        let mut path = PathBuf::from(home.unwrap_or_else(|| ".".to_string()));
        path.push(".local");
        path.push("share");
        path.push("files_assistant");
        path.push("session.json");
        path
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow!("Invalid value for {key}: {other:?}")),
    }
}
