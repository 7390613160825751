use anyhow::Context;
use domain::route::{resolve_route, Route, RouteDecision};
use domain::session::{Session, SessionState};
use infrastructure::identity::{DeviceAuthorization, OidcClient};
use infrastructure::session_guard::SessionGuard;
use shared::types::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A persisted session was found and is usable.
    Restored,
    Unauthenticated,
    /// The identity provider did not answer in time; the client continues
    /// as unauthenticated.
    TimedOut,
}

/// Session lifecycle: bootstrap on start, device login, logout, and the
/// route decisions that follow from the current state.
pub struct AuthService {
    guard: Arc<SessionGuard<OidcClient>>,
    bootstrap_timeout: Duration,
}

impl AuthService {
    pub fn new(guard: Arc<SessionGuard<OidcClient>>, bootstrap_timeout: Duration) -> Self {
        Self {
            guard,
            bootstrap_timeout,
        }
    }

    pub fn guard(&self) -> &Arc<SessionGuard<OidcClient>> {
        &self.guard
    }

    /// Restores a persisted session, refreshing it if needed. Bounded by the
    /// bootstrap timeout so the client never waits indefinitely.
    pub async fn bootstrap(&self) -> BootstrapOutcome {
        match tokio::time::timeout(self.bootstrap_timeout, self.restore()).await {
            Ok(true) => BootstrapOutcome::Restored,
            Ok(false) => BootstrapOutcome::Unauthenticated,
            Err(_) => {
                warn!(
                    "Identity bootstrap did not finish within {:?}",
                    self.bootstrap_timeout
                );
                self.guard.set_unauthenticated().await;
                BootstrapOutcome::TimedOut
            }
        }
    }

    async fn restore(&self) -> bool {
        let Some(tokens) = self.guard.store().and_then(|store| store.load()) else {
            self.guard.set_unauthenticated().await;
            return false;
        };

        self.guard.establish(tokens).await;
        match self.guard.credential().await {
            Ok(_) => {
                info!("Restored session for {}", self.guard.snapshot().await.display_name());
                true
            }
            Err(e) => {
                warn!("Stored session is not usable: {e}");
                self.guard.set_unauthenticated().await;
                false
            }
        }
    }

    pub async fn start_login(&self) -> Result<DeviceAuthorization> {
        self.guard
            .provider()
            .start_device_login()
            .await
            .context("Could not start login at the identity provider")
    }

    /// Waits for the user to approve `device` and establishes the session.
    /// Returns the display name.
    pub async fn complete_login(&self, device: &DeviceAuthorization) -> Result<String> {
        let tokens = self
            .guard
            .provider()
            .poll_device_login(device)
            .await
            .context("Login did not complete")?;
        self.guard.establish(tokens).await;
        let name = self.guard.snapshot().await.display_name();
        info!("Logged in as {name}");
        Ok(name)
    }

    /// Destroys the local session and ends it at the provider. Provider
    /// failures are logged only: the local session is gone either way.
    /// Returns where the client goes next.
    pub async fn logout(&self) -> Route {
        if let Some(tokens) = self.guard.invalidate().await {
            if let Some(refresh_token) = tokens.refresh_token {
                if let Err(e) = self.guard.provider().logout(&refresh_token).await {
                    warn!("Identity provider logout failed: {e:#}");
                }
            }
        }
        info!("Logged out");
        Route::Login
    }

    pub async fn state(&self) -> SessionState {
        self.guard.state().await
    }

    pub async fn session(&self) -> Session {
        self.guard.snapshot().await
    }

    pub async fn resolve(&self, requested: Route) -> RouteDecision {
        resolve_route(self.state().await, requested)
    }
}
