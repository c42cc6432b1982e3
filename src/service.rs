use crate::auth::entra::EntraIdentity;
use crate::auth::provider::{AuthState, TokenProvider};
use crate::auth::store::KeyringStore;
use crate::auth::{DeviceCodePrompt, Session};
use crate::billing::BillingClient;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{CostQuery, CostRecord, ResourceCostRecord, Subscription};
use crate::navigation::DrillDown;
use crate::storage::Storage;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub struct CostService {
    client: Arc<BillingClient>,
}

impl CostService {
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: Arc::new(BillingClient::new(&cfg.api_base_url)?),
        })
    }

    pub fn client(&self) -> Arc<BillingClient> {
        self.client.clone()
    }

    pub async fn subscriptions(&self, session: &Session) -> Result<Vec<Subscription>, AppError> {
        self.client.list_subscriptions(session).await
    }

    pub async fn resource_groups(
        &self,
        session: &Session,
        subscription_id: &str,
    ) -> Result<Vec<String>, AppError> {
        self.client
            .list_resource_groups(session, subscription_id)
            .await
    }

    pub async fn fetch_costs(
        &self,
        session: &Session,
        query: &CostQuery,
        storage: &mut Storage,
    ) -> Result<Vec<CostRecord>, AppError> {
        let records = self.client.get_costs(session, query).await?;
        storage.replace_costs(query, &records, Utc::now())?;
        info!(
            subscription = %query.subscription_id,
            rows = records.len(),
            "cost rows fetched"
        );
        Ok(records)
    }

    pub async fn fetch_resources(
        &self,
        session: &Session,
        target: &DrillDown,
        storage: &mut Storage,
    ) -> Result<Vec<ResourceCostRecord>, AppError> {
        let records = self.client.get_resource_costs(session, target).await?;
        storage.replace_resources(target, &records, Utc::now())?;
        info!(
            resource_group = %target.resource_group,
            rows = records.len(),
            "resource rows fetched"
        );
        Ok(records)
    }
}

pub fn token_provider(
    cfg: &AppConfig,
    prompts: Option<UnboundedSender<DeviceCodePrompt>>,
) -> Result<TokenProvider, AppError> {
    let identity = EntraIdentity::new(cfg.identity.clone(), Arc::new(KeyringStore), prompts)?;
    Ok(TokenProvider::new(Arc::new(identity)))
}

pub async fn authenticated_session(tokens: &mut TokenProvider) -> Result<Session, AppError> {
    let Some(session) = tokens.restore_session().await?.cloned() else {
        return Err(AppError::Auth(
            "Not signed in. Run `costboard login` first.".into(),
        ));
    };
    if tokens.state() != AuthState::TokenReady {
        warn!(
            state = tokens.state().as_label(),
            "no access token, sending requests unauthenticated"
        );
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, Account};
    use crate::models::DateRange;
    use chrono::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            account: Account {
                username: "user@example.com".into(),
                home_account_id: "oid.tid".into(),
            },
            token: Some(AccessToken {
                secret: "token".into(),
                expires_at: Utc::now() + Duration::hours(1),
            }),
        }
    }

    fn service(server: &MockServer) -> CostService {
        let cfg = AppConfig {
            api_base_url: server.uri(),
            ..AppConfig::default()
        };
        CostService::new(&cfg).expect("service")
    }

    #[tokio::test]
    async fn fetched_costs_are_stored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/costs"))
            .and(query_param("subscription_id", "a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"ResourceGroupName": "rg1", "PreTaxCost": 12.5},
                {"ResourceGroupName": "rg2", "PreTaxCost": 3.0}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().expect("tempdir");
        let mut storage = Storage::open(&tmp.path().join("costs.sqlite")).expect("storage");
        let query = CostQuery {
            subscription_id: "a".into(),
            resource_group: None,
            range: DateRange::parse("2024-01-01", "2024-01-31").expect("range"),
        };

        let records = service(&server)
            .fetch_costs(&session(), &query, &mut storage)
            .await
            .expect("fetch");

        assert_eq!(records.len(), 2);
        let stored = storage.stored_costs().expect("stored");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].resource_group_name, "rg1");
    }

    #[tokio::test]
    async fn failed_fetch_leaves_storage_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resources"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = TempDir::new().expect("tempdir");
        let mut storage = Storage::open(&tmp.path().join("costs.sqlite")).expect("storage");
        let target = DrillDown {
            subscription: "a".into(),
            resource_group: "rg1".into(),
            from: "2024-01-01".into(),
            to: "2024-01-31".into(),
        };

        let err = service(&server)
            .fetch_resources(&session(), &target, &mut storage)
            .await
            .expect_err("server error");

        assert!(matches!(err, AppError::Http(_)));
        assert_eq!(storage.resource_count().expect("count"), 0);
    }
}
