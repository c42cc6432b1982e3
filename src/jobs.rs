use crate::auth::Session;
use crate::billing::BillingClient;
use crate::error::AppError;
use crate::models::{CostQuery, CostRecord, ResourceCostRecord, Subscription};
use crate::navigation::DrillDown;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Subscriptions,
    ResourceGroups,
    Costs,
    Resources,
}

impl FetchKind {
    pub fn as_label(self) -> &'static str {
        match self {
            FetchKind::Subscriptions => "subscriptions",
            FetchKind::ResourceGroups => "resource groups",
            FetchKind::Costs => "cost data",
            FetchKind::Resources => "resource costs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Subscriptions,
    ResourceGroups { subscription_id: String },
    Costs(CostQuery),
    Resources(DrillDown),
}

impl FetchRequest {
    pub fn kind(&self) -> FetchKind {
        match self {
            FetchRequest::Subscriptions => FetchKind::Subscriptions,
            FetchRequest::ResourceGroups { .. } => FetchKind::ResourceGroups,
            FetchRequest::Costs(_) => FetchKind::Costs,
            FetchRequest::Resources(_) => FetchKind::Resources,
        }
    }
}

#[derive(Debug)]
pub enum FetchOutput {
    Subscriptions(Vec<Subscription>),
    ResourceGroups {
        subscription_id: String,
        groups: Vec<String>,
    },
    Costs {
        query: CostQuery,
        records: Vec<CostRecord>,
    },
    Resources {
        target: DrillDown,
        records: Vec<ResourceCostRecord>,
    },
}

pub type FetchResult = Result<FetchOutput, AppError>;

pub async fn execute(client: &BillingClient, session: &Session, request: FetchRequest) -> FetchResult {
    match request {
        FetchRequest::Subscriptions => client
            .list_subscriptions(session)
            .await
            .map(FetchOutput::Subscriptions),
        FetchRequest::ResourceGroups { subscription_id } => {
            let groups = client.list_resource_groups(session, &subscription_id).await?;
            Ok(FetchOutput::ResourceGroups {
                subscription_id,
                groups,
            })
        }
        FetchRequest::Costs(query) => {
            let records = client.get_costs(session, &query).await?;
            Ok(FetchOutput::Costs { query, records })
        }
        FetchRequest::Resources(target) => {
            let records = client.get_resource_costs(session, &target).await?;
            Ok(FetchOutput::Resources { target, records })
        }
    }
}

/// In-flight fetch tasks, at most one per kind. Starting a fetch aborts the
/// previous one of the same kind, so a superseded response is never applied.
#[derive(Default)]
pub struct FetchJobs {
    running: HashMap<FetchKind, JoinHandle<FetchResult>>,
}

impl FetchJobs {
    pub fn spawn<F>(&mut self, kind: FetchKind, task: F)
    where
        F: Future<Output = FetchResult> + Send + 'static,
    {
        if let Some(previous) = self.running.insert(kind, tokio::spawn(task)) {
            if !previous.is_finished() {
                debug!(kind = kind.as_label(), "superseding in-flight fetch");
            }
            previous.abort();
        }
    }

    pub fn dispatch(&mut self, client: Arc<BillingClient>, session: Session, request: FetchRequest) {
        let kind = request.kind();
        self.spawn(kind, async move { execute(&client, &session, request).await });
    }

    pub fn is_running(&self, kind: FetchKind) -> bool {
        self.running.contains_key(&kind)
    }

    pub fn cancel(&mut self, kind: FetchKind) {
        if let Some(handle) = self.running.remove(&kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.abort();
        }
    }

    pub async fn take_finished(&mut self) -> Vec<(FetchKind, FetchResult)> {
        let done: Vec<FetchKind> = self
            .running
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(kind, _)| *kind)
            .collect();

        let mut out = Vec::with_capacity(done.len());
        for kind in done {
            let Some(handle) = self.running.remove(&kind) else {
                continue;
            };
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Task(e.to_string())),
            };
            out.push((kind, result));
        }
        out
    }
}

impl Drop for FetchJobs {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
