use crate::auth::store::{load_cached_account, save_cached_account, CachedAccount, CredentialStore};
use crate::auth::{
    AccessToken, Account, DeviceCodePrompt, IdentityProvider, InteractiveGrant, TokenOutcome,
};
use crate::config::IdentitySettings;
use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const INTERACTION_ERRORS: [&str; 4] = [
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

fn default_expires_in() -> i64 {
    900
}

fn default_interval() -> u64 {
    5
}

enum TokenReply {
    Granted(TokenResponse),
    Rejected(OAuthErrorBody),
}

pub struct EntraIdentity {
    client: Client,
    settings: IdentitySettings,
    store: Arc<dyn CredentialStore>,
    prompts: Option<UnboundedSender<DeviceCodePrompt>>,
    access: Mutex<Option<AccessToken>>,
}

impl EntraIdentity {
    pub fn new(
        settings: IdentitySettings,
        store: Arc<dyn CredentialStore>,
        prompts: Option<UnboundedSender<DeviceCodePrompt>>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            settings,
            store,
            prompts,
            access: Mutex::new(None),
        })
    }

    fn scope_param(&self) -> String {
        let mut scopes = self.settings.api_scopes();
        scopes.extend(OIDC_SCOPES.iter().map(|s| s.to_string()));
        scopes.join(" ")
    }

    fn require_client_id(&self) -> Result<&str, AppError> {
        if self.settings.client_id.trim().is_empty() {
            return Err(AppError::Config(
                "identity.client_id is not configured. Set it in config.toml or COSTBOARD_CLIENT_ID."
                    .into(),
            ));
        }
        Ok(self.settings.client_id.as_str())
    }

    fn cached_access(&self) -> Option<AccessToken> {
        let guard = self.access.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|t| t.is_fresh(Utc::now(), Duration::minutes(5)))
            .cloned()
    }

    fn remember_access(&self, token: Option<AccessToken>) {
        *self.access.lock().unwrap_or_else(|p| p.into_inner()) = token;
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenReply, AppError> {
        let response = self
            .client
            .post(self.settings.endpoint("token"))
            .form(form)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if status.is_success() {
            return Ok(TokenReply::Granted(serde_json::from_value(body)?));
        }
        match serde_json::from_value::<OAuthErrorBody>(body) {
            Ok(err) => Ok(TokenReply::Rejected(err)),
            Err(_) => Err(AppError::Auth(format!(
                "token endpoint returned HTTP {status}"
            ))),
        }
    }

    fn access_from(response: &TokenResponse) -> AccessToken {
        AccessToken {
            secret: response.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(response.expires_in.unwrap_or(3600)),
        }
    }

    async fn redeem_refresh_token(&self, cached: CachedAccount) -> TokenOutcome {
        let client_id = match self.require_client_id() {
            Ok(id) => id,
            Err(e) => return TokenOutcome::Failed(e.to_string()),
        };
        let scope = self.scope_param();
        let form = [
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("refresh_token", cached.refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        match self.post_token(&form).await {
            Ok(TokenReply::Granted(response)) => {
                let token = Self::access_from(&response);
                if let Some(rotated) = response.refresh_token.filter(|rt| !rt.is_empty()) {
                    let updated = CachedAccount {
                        account: cached.account,
                        refresh_token: rotated,
                    };
                    if let Err(e) =
                        save_cached_account(self.store.as_ref(), &self.settings.cache_key(), &updated)
                    {
                        warn!(error = %e, "failed to persist rotated refresh token");
                    }
                }
                self.remember_access(Some(token.clone()));
                TokenOutcome::Ready(token)
            }
            Ok(TokenReply::Rejected(err)) if INTERACTION_ERRORS.contains(&err.error.as_str()) => {
                debug!(error = %err.error, "refresh token rejected");
                TokenOutcome::NeedsInteraction
            }
            Ok(TokenReply::Rejected(err)) => {
                TokenOutcome::Failed(err.error_description.unwrap_or(err.error))
            }
            Err(e) => TokenOutcome::Failed(e.to_string()),
        }
    }

    async fn start_device_flow(&self, client_id: &str) -> Result<DeviceCodeResponse, AppError> {
        let scope = self.scope_param();
        let response = self
            .client
            .post(self.settings.endpoint("devicecode"))
            .form(&[("client_id", client_id), ("scope", scope.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn poll_device_flow(
        &self,
        client_id: &str,
        device: &DeviceCodeResponse,
    ) -> Result<TokenResponse, AppError> {
        let deadline = Utc::now() + Duration::seconds(device.expires_in);
        let mut interval = device.interval;
        let form = [
            ("client_id", client_id),
            ("grant_type", DEVICE_CODE_GRANT),
            ("device_code", device.device_code.as_str()),
        ];

        loop {
            match self.post_token(&form).await? {
                TokenReply::Granted(response) => return Ok(response),
                TokenReply::Rejected(err) if err.error == "authorization_pending" => {}
                TokenReply::Rejected(err) if err.error == "slow_down" => interval += 5,
                TokenReply::Rejected(err) => {
                    return Err(AppError::Auth(
                        err.error_description.unwrap_or(err.error),
                    ))
                }
            }
            if Utc::now() >= deadline {
                return Err(AppError::Auth("device code expired before sign-in".into()));
            }
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
        }
    }
}

/// Reads the signed-in identity from an `id_token` without verifying it; the
/// token came straight from the token endpoint over TLS.
pub fn account_from_id_token(id_token: &str) -> Result<Account, AppError> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(AppError::Auth(format!(
            "invalid id_token: expected 3 parts, got {}",
            parts.len()
        )));
    }
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AppError::Auth(format!("invalid id_token payload: {e}")))?;
    let claims: Value = serde_json::from_slice(&decoded)?;

    let claim = |name: &str| claims.get(name).and_then(Value::as_str).unwrap_or_default();
    let username = [claim("preferred_username"), claim("upn"), claim("email")]
        .into_iter()
        .find(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string();
    let oid = claim("oid");
    let tid = claim("tid");
    let home_account_id = if oid.is_empty() {
        claim("sub").to_string()
    } else {
        format!("{oid}.{tid}")
    };

    Ok(Account {
        username,
        home_account_id,
    })
}

#[async_trait]
impl IdentityProvider for EntraIdentity {
    async fn cached_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(load_cached_account(self.store.as_ref(), &self.settings.cache_key())?
            .map(|cached| vec![cached.account])
            .unwrap_or_default())
    }

    async fn acquire_silent(&self, account: &Account) -> TokenOutcome {
        if let Some(token) = self.cached_access() {
            return TokenOutcome::Ready(token);
        }
        let cached = match load_cached_account(self.store.as_ref(), &self.settings.cache_key()) {
            Ok(Some(cached)) if cached.account == *account => cached,
            Ok(_) => return TokenOutcome::NeedsInteraction,
            Err(e) => return TokenOutcome::Failed(e.to_string()),
        };
        self.redeem_refresh_token(cached).await
    }

    async fn acquire_interactive(&self) -> Result<InteractiveGrant, AppError> {
        let client_id = self.require_client_id()?.to_string();
        let device = self.start_device_flow(&client_id).await?;
        let prompt = DeviceCodePrompt {
            message: device.message.clone().unwrap_or_else(|| {
                format!(
                    "To sign in, open {} and enter the code {}.",
                    device.verification_uri, device.user_code
                )
            }),
        };
        info!(verification_uri = %device.verification_uri, "device code sign-in started");
        if let Some(tx) = &self.prompts {
            if tx.send(prompt).is_err() {
                debug!("device code prompt receiver dropped");
            }
        }

        let response = self.poll_device_flow(&client_id, &device).await?;
        let id_token = response
            .id_token
            .as_deref()
            .ok_or_else(|| AppError::Auth("identity provider returned no id_token".into()))?;
        let account = account_from_id_token(id_token)?;
        let token = Self::access_from(&response);

        if let Some(refresh_token) = response.refresh_token.clone().filter(|rt| !rt.is_empty()) {
            save_cached_account(
                self.store.as_ref(),
                &self.settings.cache_key(),
                &CachedAccount {
                    account: account.clone(),
                    refresh_token,
                },
            )?;
        } else {
            warn!("sign-in returned no refresh token; the session will not survive a restart");
        }
        self.remember_access(Some(token.clone()));

        Ok(InteractiveGrant { account, token })
    }

    async fn logout(&self, account: &Account) -> Result<(), AppError> {
        self.remember_access(None);
        let key = self.settings.cache_key();
        match load_cached_account(self.store.as_ref(), &key)? {
            Some(cached) if cached.account != *account => {
                debug!("cached account differs from session account; keeping it");
                Ok(())
            }
            _ => self.store.delete(&key),
        }
    }
}
