use crate::auth::{AccessToken, IdentityProvider, Session, TokenOutcome};
use crate::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    TokenPending,
    InteractionInFlight,
    TokenReady,
    TokenMissing,
}

impl AuthState {
    pub fn as_label(self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed out",
            AuthState::TokenPending => "acquiring token",
            AuthState::InteractionInFlight => "waiting for sign-in",
            AuthState::TokenReady => "token ready",
            AuthState::TokenMissing => "no token",
        }
    }
}

pub struct TokenProvider {
    identity: Arc<dyn IdentityProvider>,
    session: Option<Session>,
    state: AuthState,
}

impl TokenProvider {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            session: None,
            state: AuthState::SignedOut,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub async fn restore_account(&mut self) -> Result<Option<&Session>, AppError> {
        let accounts = self.identity.cached_accounts().await?;
        let Some(account) = accounts.into_iter().next() else {
            info!("no cached account to restore");
            return Ok(None);
        };
        info!(username = %account.username, "restoring cached session");
        self.session = Some(Session::new(account));
        self.state = AuthState::TokenPending;
        Ok(self.session.as_ref())
    }

    pub async fn restore_session(&mut self) -> Result<Option<&Session>, AppError> {
        if self.restore_account().await?.is_none() {
            return Ok(None);
        }
        self.acquire_token().await;
        Ok(self.session.as_ref())
    }

    pub async fn restore_silent(&mut self) -> Result<Option<&Session>, AppError> {
        let Some(account) = self.restore_account().await?.map(|s| s.account.clone()) else {
            return Ok(None);
        };
        match self.identity.acquire_silent(&account).await {
            TokenOutcome::Ready(token) => self.set_token(token),
            TokenOutcome::NeedsInteraction => {
                info!(username = %account.username, "silent token acquisition needs interaction");
                self.clear_token();
            }
            TokenOutcome::Failed(reason) => {
                warn!(%reason, "silent token acquisition failed");
                self.clear_token();
            }
        }
        Ok(self.session.as_ref())
    }

    /// Silent acquisition with a single interactive fallback. Returns the
    /// resulting state; the token, if any, is on the session.
    pub async fn acquire_token(&mut self) -> AuthState {
        let Some(account) = self.session.as_ref().map(|s| s.account.clone()) else {
            self.state = AuthState::SignedOut;
            return self.state;
        };
        self.state = AuthState::TokenPending;

        match self.identity.acquire_silent(&account).await {
            TokenOutcome::Ready(token) => self.set_token(token),
            TokenOutcome::NeedsInteraction => {
                info!(username = %account.username, "silent token acquisition needs interaction");
                self.state = AuthState::InteractionInFlight;
                match self.identity.acquire_interactive().await {
                    Ok(grant) => {
                        if grant.account != account {
                            info!(username = %grant.account.username, "interactive sign-in switched account");
                        }
                        self.session = Some(Session {
                            account: grant.account,
                            token: Some(grant.token),
                        });
                        self.state = AuthState::TokenReady;
                    }
                    Err(e) => {
                        warn!(error = %e, "interactive token acquisition failed");
                        self.clear_token();
                    }
                }
            }
            TokenOutcome::Failed(reason) => {
                warn!(%reason, "silent token acquisition failed");
                self.clear_token();
            }
        }
        self.state
    }

    pub async fn login(&mut self) -> Result<AuthState, AppError> {
        let account = self.identity.login_interactive().await?;
        info!(username = %account.username, "signed in");
        self.session = Some(Session::new(account));
        self.state = AuthState::TokenPending;
        Ok(self.acquire_token().await)
    }

    pub async fn logout(&mut self) -> Result<(), AppError> {
        let Some(session) = self.session.take() else {
            self.state = AuthState::SignedOut;
            return Ok(());
        };
        self.state = AuthState::SignedOut;
        self.identity.logout(&session.account).await?;
        info!(username = %session.account.username, "signed out");
        Ok(())
    }

    fn set_token(&mut self, token: AccessToken) {
        if let Some(session) = self.session.as_mut() {
            session.token = Some(token);
        }
        self.state = AuthState::TokenReady;
    }

    fn clear_token(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.token = None;
        }
        self.state = AuthState::TokenMissing;
    }
}
