use crate::auth::Session;
use crate::error::AppError;
use crate::models::{CostQuery, CostRecord, ResourceCostRecord, Subscription};
use crate::navigation::DrillDown;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

pub struct BillingClient {
    client: Client,
    base: Url,
}

impl BillingClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        Ok(self.base.join(path)?)
    }

    pub fn subscriptions_url(&self) -> Result<Url, AppError> {
        self.endpoint("api/subscriptions")
    }

    pub fn resource_groups_url(&self, subscription_id: &str) -> Result<Url, AppError> {
        let mut url = self.endpoint("api/resource-groups")?;
        url.query_pairs_mut()
            .append_pair("subscription_id", subscription_id);
        Ok(url)
    }

    pub fn costs_url(&self, query: &CostQuery) -> Result<Url, AppError> {
        let mut url = self.endpoint("api/costs")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("subscription_id", &query.subscription_id)
                .append_pair("from_date", &query.range.from_label())
                .append_pair("to_date", &query.range.to_label());
            if let Some(group) = query.resource_group.as_deref().filter(|g| !g.is_empty()) {
                pairs.append_pair("resource_group", group);
            }
        }
        Ok(url)
    }

    pub fn resources_url(&self, target: &DrillDown) -> Result<Url, AppError> {
        let mut url = self.endpoint("api/resources")?;
        url.query_pairs_mut()
            .append_pair("subscription", &target.subscription)
            .append_pair("rg", &target.resource_group)
            .append_pair("from_date", &target.from)
            .append_pair("to_date", &target.to);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        session: &Session,
    ) -> Result<T, AppError> {
        debug!(%url, authenticated = session.bearer().is_some(), "billing request");
        let mut req = self.client.get(url);
        if let Some(token) = session.bearer() {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?.error_for_status()?.json().await?)
    }

    pub async fn list_subscriptions(&self, session: &Session) -> Result<Vec<Subscription>, AppError> {
        self.get_json(self.subscriptions_url()?, session).await
    }

    pub async fn list_resource_groups(
        &self,
        session: &Session,
        subscription_id: &str,
    ) -> Result<Vec<String>, AppError> {
        if subscription_id.trim().is_empty() {
            return Err(AppError::Validation(
                "A subscription is required to list resource groups.".into(),
            ));
        }
        self.get_json(self.resource_groups_url(subscription_id)?, session)
            .await
    }

    pub async fn get_costs(
        &self,
        session: &Session,
        query: &CostQuery,
    ) -> Result<Vec<CostRecord>, AppError> {
        self.get_json(self.costs_url(query)?, session).await
    }

    pub async fn get_resource_costs(
        &self,
        session: &Session,
        target: &DrillDown,
    ) -> Result<Vec<ResourceCostRecord>, AppError> {
        self.get_json(self.resources_url(target)?, session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, Account};
    use crate::models::DateRange;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(token: Option<&str>) -> Session {
        Session {
            account: Account {
                username: "user@example.com".into(),
                home_account_id: "oid.tid".into(),
            },
            token: token.map(|secret| AccessToken {
                secret: secret.into(),
                expires_at: Utc::now() + Duration::hours(1),
            }),
        }
    }

    fn query(resource_group: Option<&str>) -> CostQuery {
        CostQuery {
            subscription_id: "a".into(),
            resource_group: resource_group.map(str::to_string),
            range: DateRange::parse("2024-01-01", "2024-01-31").expect("range"),
        }
    }

    fn pairs(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn costs_url_carries_subscription_window_and_group() {
        let client = BillingClient::new("http://localhost:8000").expect("client");
        let url = client.costs_url(&query(Some("rg1"))).expect("url");
        assert_eq!(url.path(), "/api/costs");
        let params = pairs(&url);
        assert_eq!(params["subscription_id"], "a");
        assert_eq!(params["resource_group"], "rg1");
        assert_eq!(params["from_date"], "2024-01-01");
        assert_eq!(params["to_date"], "2024-01-31");
    }

    #[test]
    fn costs_url_omits_empty_group_filter() {
        let client = BillingClient::new("http://localhost:8000").expect("client");
        for group in [None, Some("")] {
            let url = client.costs_url(&query(group)).expect("url");
            assert!(!pairs(&url).contains_key("resource_group"));
        }
    }

    #[test]
    fn resources_url_uses_detail_parameter_names() {
        let client = BillingClient::new("http://localhost:8000/").expect("client");
        let url = client
            .resources_url(&DrillDown {
                subscription: "a".into(),
                resource_group: "rg 1".into(),
                from: "2024-01-01".into(),
                to: "2024-01-31".into(),
            })
            .expect("url");
        assert_eq!(url.path(), "/api/resources");
        let params = pairs(&url);
        assert_eq!(params["subscription"], "a");
        assert_eq!(params["rg"], "rg 1");
        assert_eq!(params["from_date"], "2024-01-01");
        assert_eq!(params["to_date"], "2024-01-31");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        for base in ["https://host/billing", "https://host/billing/"] {
            let client = BillingClient::new(base).expect("client");
            assert_eq!(
                client.subscriptions_url().expect("url").as_str(),
                "https://host/billing/api/subscriptions"
            );
        }
    }

    #[tokio::test]
    async fn requests_carry_bearer_token_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/subscriptions"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "a", "name": "Alpha"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = BillingClient::new(&server.uri()).expect("client");
        let subs = client
            .list_subscriptions(&session(Some("token-1")))
            .await
            .expect("subscriptions");
        assert_eq!(
            subs,
            vec![Subscription {
                id: "a".into(),
                name: "Alpha".into()
            }]
        );
    }

    #[tokio::test]
    async fn requests_without_token_send_no_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resource-groups"))
            .and(query_param("subscription_id", "a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["rg1", "rg2"])))
            .mount(&server)
            .await;

        let client = BillingClient::new(&server.uri()).expect("client");
        let groups = client
            .list_resource_groups(&session(None), "a")
            .await
            .expect("groups");
        assert_eq!(groups, vec!["rg1".to_string(), "rg2".to_string()]);

        let requests = server.received_requests().await.expect("recorded");
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn empty_subscription_is_rejected_without_request() {
        let server = MockServer::start().await;
        let client = BillingClient::new(&server.uri()).expect("client");

        let err = client
            .list_resource_groups(&session(None), "  ")
            .await
            .expect_err("validation");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(server
            .received_requests()
            .await
            .unwrap_or_default()
            .is_empty());
    }

    #[tokio::test]
    async fn get_costs_parses_rows_and_propagates_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/costs"))
            .and(query_param("resource_group", "rg1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ResourceGroupName": "rg1", "PreTaxCost": 42.0}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/resources"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": "Azure API rate limit exceeded. Please try again later."
            })))
            .mount(&server)
            .await;

        let client = BillingClient::new(&server.uri()).expect("client");
        let rows = client
            .get_costs(&session(Some("t")), &query(Some("rg1")))
            .await
            .expect("costs");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource_group_name, "rg1");

        let err = client
            .get_resource_costs(
                &session(Some("t")),
                &DrillDown {
                    subscription: "a".into(),
                    resource_group: "rg1".into(),
                    from: "2024-01-01".into(),
                    to: "2024-01-31".into(),
                },
            )
            .await
            .expect_err("rate limited");
        assert!(matches!(err, AppError::Http(_)));
    }
}
