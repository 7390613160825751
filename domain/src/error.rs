use thiserror::Error;

/// Failures surfaced by the authenticated request path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No authenticated session; raised before any network call.
    #[error("not authenticated")]
    Unauthenticated,

    #[error("credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("{}", describe_failure(.status, .message))]
    NetworkOrServerFailure {
        status: Option<u16>,
        message: String,
    },

    /// Search payload was neither an array nor an object wrapping one.
    #[error("unexpected response shape: {0}")]
    MalformedResponseShape(String),
}

impl ClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkOrServerFailure {
            status: None,
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::NetworkOrServerFailure {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::CredentialRefreshFailed(_)
        )
    }
}

fn describe_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("server responded with {code}: {message}"),
        None => format!("request failed: {message}"),
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
