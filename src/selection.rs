use crate::error::AppError;
use crate::models::{CostQuery, CostRecord, DateRange, Subscription};
use crate::navigation::DrillDown;

pub const NO_SUBSCRIPTION_MESSAGE: &str = "Please select a subscription.";

#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub subscriptions: Vec<Subscription>,
    pub subscription: Option<String>,
    pub resource_groups: Vec<String>,
    pub resource_group: Option<String>,
    pub range: DateRange,
    pub costs: Vec<CostRecord>,
    pub costs_query: Option<CostQuery>,
}

impl SelectionState {
    pub fn with_range(range: DateRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    pub fn select_subscription(&mut self, id: &str) -> Option<String> {
        let id = id.trim();
        let next = (!id.is_empty()).then(|| id.to_string());
        if next == self.subscription {
            return None;
        }

        self.subscription = next;
        self.resource_group = None;
        self.resource_groups.clear();
        self.costs.clear();
        self.costs_query = None;
        self.subscription.clone()
    }

    /// `None` or an empty name means all groups. Never triggers a fetch.
    pub fn select_resource_group(&mut self, name: Option<&str>) {
        self.resource_group = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
    }

    pub fn set_range(&mut self, range: DateRange) {
        self.range = range;
    }

    pub fn cost_query(&self) -> Result<CostQuery, AppError> {
        let Some(subscription_id) = self.subscription.clone() else {
            return Err(AppError::Validation(NO_SUBSCRIPTION_MESSAGE.into()));
        };
        Ok(CostQuery {
            subscription_id,
            resource_group: self.resource_group.clone(),
            range: self.range,
        })
    }

    pub fn drill_down(&self, label: &str) -> Option<DrillDown> {
        let subscription = self.subscription.clone()?;
        if label.trim().is_empty() {
            return None;
        }
        Some(DrillDown {
            subscription,
            resource_group: label.to_string(),
            from: self.range.from_label(),
            to: self.range.to_label(),
        })
    }

    pub fn apply_subscriptions(&mut self, subscriptions: Vec<Subscription>) {
        self.subscriptions = subscriptions;
    }

    pub fn apply_resource_groups(&mut self, subscription_id: &str, groups: Vec<String>) -> bool {
        if self.subscription.as_deref() != Some(subscription_id) {
            return false;
        }
        self.resource_groups = groups;
        true
    }

    pub fn accepts_costs(&self, query: &CostQuery) -> bool {
        self.subscription.as_deref() == Some(query.subscription_id.as_str())
    }

    pub fn apply_costs(&mut self, query: CostQuery, records: Vec<CostRecord>) -> bool {
        if !self.accepts_costs(&query) {
            return false;
        }
        self.costs = records;
        self.costs_query = Some(query);
        true
    }

    pub fn subscription_name(&self) -> Option<&str> {
        let id = self.subscription.as_deref()?;
        self.subscriptions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.name.as_str())
            .or(Some(id))
    }

    pub fn clear(&mut self) {
        *self = Self::with_range(self.range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(group: &str, amount: f64) -> CostRecord {
        CostRecord {
            resource_group_name: group.into(),
            pre_tax_cost: amount,
        }
    }

    fn range() -> DateRange {
        DateRange::parse("2024-01-01", "2024-01-31").expect("range")
    }

    fn loaded() -> SelectionState {
        let mut state = SelectionState::with_range(range());
        state.apply_subscriptions(vec![
            Subscription {
                id: "a".into(),
                name: "Alpha".into(),
            },
            Subscription {
                id: "b".into(),
                name: "Beta".into(),
            },
        ]);
        state
    }

    #[test]
    fn changing_subscription_clears_dependents_before_group_fetch() {
        let mut state = loaded();
        assert_eq!(state.select_subscription("a"), Some("a".to_string()));
        assert!(state.apply_resource_groups("a", vec!["rg1".into()]));
        state.select_resource_group(Some("rg1"));
        let query = state.cost_query().expect("query");
        assert!(state.apply_costs(query, vec![cost("rg1", 5.0)]));

        let fetch = state.select_subscription("b");

        assert_eq!(fetch, Some("b".to_string()));
        assert!(state.resource_group.is_none());
        assert!(state.resource_groups.is_empty());
        assert!(state.costs.is_empty());
        assert!(state.costs_query.is_none());
    }

    #[test]
    fn reselecting_same_subscription_keeps_state() {
        let mut state = loaded();
        state.select_subscription("a");
        state.apply_resource_groups("a", vec!["rg1".into()]);

        assert_eq!(state.select_subscription("a"), None);
        assert_eq!(state.resource_groups, vec!["rg1".to_string()]);
    }

    #[test]
    fn clearing_subscription_requests_no_fetch() {
        let mut state = loaded();
        state.select_subscription("a");
        assert_eq!(state.select_subscription(""), None);
        assert!(state.subscription.is_none());
    }

    #[test]
    fn cost_query_without_subscription_is_a_validation_error() {
        let state = loaded();
        let err = state.cost_query().expect_err("no subscription");
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), NO_SUBSCRIPTION_MESSAGE);
    }

    #[test]
    fn empty_group_selection_means_all_groups() {
        let mut state = loaded();
        state.select_subscription("a");
        state.select_resource_group(Some("rg1"));
        state.select_resource_group(Some(" "));
        assert_eq!(state.cost_query().expect("query").resource_group, None);
    }

    #[test]
    fn stale_group_and_cost_responses_are_dropped() {
        let mut state = loaded();
        state.select_subscription("a");
        let stale_query = state.cost_query().expect("query");
        state.select_subscription("b");

        assert!(!state.apply_resource_groups("a", vec!["rg-a".into()]));
        assert!(!state.apply_costs(stale_query, vec![cost("rg-a", 1.0)]));
        assert!(state.resource_groups.is_empty());
        assert!(state.costs.is_empty());
    }

    #[test]
    fn drill_down_uses_current_subscription_and_range() {
        let mut state = loaded();
        assert!(state.drill_down("rg1").is_none());

        state.select_subscription("a");
        let target = state.drill_down("rg1").expect("target");
        assert_eq!(target.subscription, "a");
        assert_eq!(target.resource_group, "rg1");
        assert_eq!(target.from, "2024-01-01");
        assert_eq!(target.to, "2024-01-31");
        assert!(state.drill_down("").is_none());
    }

    #[test]
    fn subscription_name_falls_back_to_id() {
        let mut state = loaded();
        state.select_subscription("a");
        assert_eq!(state.subscription_name(), Some("Alpha"));
        state.select_subscription("zzz");
        assert_eq!(state.subscription_name(), Some("zzz"));
    }
}
