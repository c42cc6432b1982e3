use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub mod entra;
pub mod provider;
pub mod store;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub home_account_id: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at - skew > now
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account: Account,
    pub token: Option<AccessToken>,
}

impl Session {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            token: None,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.secret.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Ready(AccessToken),
    NeedsInteraction,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodePrompt {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct InteractiveGrant {
    pub account: Account,
    pub token: AccessToken,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn cached_accounts(&self) -> Result<Vec<Account>, AppError>;

    async fn acquire_silent(&self, account: &Account) -> TokenOutcome;

    async fn acquire_interactive(&self) -> Result<InteractiveGrant, AppError>;

    async fn login_interactive(&self) -> Result<Account, AppError> {
        self.acquire_interactive().await.map(|grant| grant.account)
    }

    async fn logout(&self, account: &Account) -> Result<(), AppError>;
}
