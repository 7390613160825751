use crate::config::IdentityConfig;
use anyhow::anyhow;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use domain::error::{ClientError, ClientResult};
use domain::session::{now_epoch_secs, Claims, TokenSet};
use reqwest::Client;
use serde::Deserialize;
use shared::types::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// The identity provider operations the session guard depends on.
pub trait IdentityProvider: Send + Sync {
    /// Exchanges a refresh token for a new token set. A rejected grant is
    /// reported as `ClientError::Unauthenticated`.
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = ClientResult<TokenSet>> + Send;

    /// Reads display claims from an access token.
    fn claims(&self, access_token: &str) -> Claims {
        decode_claims(access_token).unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh_expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, now: u64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            expires_at: now + self.expires_in,
            refresh_token: self.refresh_token,
            refresh_expires_at: self
                .refresh_expires_in
                .filter(|&secs| secs > 0)
                .map(|secs| now + secs),
            id_token: self.id_token,
        }
    }
}

#[derive(Deserialize, Debug)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Pending device login, shown to the user while the client polls.
#[derive(Deserialize, Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

/// Keycloak-compatible OpenID Connect client for a public client id.
#[derive(Clone)]
pub struct OidcClient {
    http: Client,
    config: IdentityConfig,
}

impl OidcClient {
    pub fn new(config: IdentityConfig, connect_timeout: Duration) -> Result<Self> {
        let http = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.config.endpoint_base(), suffix)
    }

    pub async fn start_device_login(&self) -> Result<DeviceAuthorization> {
        let url = self.endpoint("auth/device");
        let response = self
            .http
            .post(&url)
            .form(&[("client_id", self.config.client_id.as_str()), ("scope", "openid")])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("Device authorization failed ({status}): {body}"));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Polls the token endpoint until the user approves or denies the login,
    /// or the device code expires.
    pub async fn poll_device_login(&self, device: &DeviceAuthorization) -> Result<TokenSet> {
        let url = self.endpoint("token");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = device.interval.max(1);

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!("Login code expired before it was approved"));
            }

            let response = self
                .http
                .post(&url)
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.config.client_id.as_str()),
                    ("device_code", device.device_code.as_str()),
                ])
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            if status.is_success() {
                let tokens: TokenResponse = serde_json::from_str(&body)?;
                info!("Device login approved");
                return Ok(tokens.into_token_set(now_epoch_secs()));
            }

            let error: OAuthErrorBody = serde_json::from_str(&body)
                .map_err(|_| anyhow!("Token endpoint error ({status}): {body}"))?;
            match error.error.as_str() {
                "authorization_pending" => debug!("Waiting for device approval"),
                "slow_down" => interval += 5,
                "expired_token" => return Err(anyhow!("Login code expired before it was approved")),
                "access_denied" => return Err(anyhow!("Login was denied")),
                other => {
                    return Err(anyhow!(
                        "Login failed: {} {}",
                        other,
                        error.error_description.unwrap_or_default()
                    ))
                }
            }
        }
    }

    /// Ends the session at the provider.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("logout"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Logout failed ({status}): {body}"));
        }
        Ok(())
    }
}

impl IdentityProvider for OidcClient {
    async fn refresh(&self, refresh_token: &str) -> ClientResult<TokenSet> {
        let response = self
            .http
            .post(self.endpoint("token"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| ClientError::CredentialRefreshFailed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::CredentialRefreshFailed(e.to_string()))?;

        if status.is_success() {
            let tokens: TokenResponse = serde_json::from_str(&body)
                .map_err(|e| ClientError::CredentialRefreshFailed(e.to_string()))?;
            debug!("Access token refreshed");
            return Ok(tokens.into_token_set(now_epoch_secs()));
        }

        match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(error) if error.error == "invalid_grant" => {
                warn!(
                    "Refresh token rejected: {}",
                    error.error_description.unwrap_or_default()
                );
                Err(ClientError::Unauthenticated)
            }
            _ => Err(ClientError::CredentialRefreshFailed(format!(
                "token endpoint responded with {status}"
            ))),
        }
    }
}

/// Decodes the payload of a JWT without verifying it. Signature checks
/// belong to the backend; the client only reads display claims.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}
