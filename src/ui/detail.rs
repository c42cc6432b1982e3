use crate::error::AppError;
use crate::jobs::FetchRequest;
use crate::models::ResourceCostRecord;
use crate::navigation::DrillDown;

pub const UNNAMED_RESOURCE: &str = "Unnamed";
pub const RESOURCE_FETCH_FAILED: &str = "Failed to load resource-level cost data.";

pub fn resource_display_name(resource_id: Option<&str>) -> String {
    match resource_id {
        Some(id) if !id.is_empty() => id.rsplit('/').next().unwrap_or(id).to_string(),
        _ => UNNAMED_RESOURCE.to_string(),
    }
}

pub fn format_cost(cost: Option<f64>) -> String {
    match cost {
        Some(value) => format!("{value:.2}"),
        None => "0.00".to_string(),
    }
}

pub fn format_cost_with_currency(currency: &str, cost: Option<f64>) -> String {
    format!("{currency} {}", format_cost(cost))
}

#[derive(Debug, Clone)]
pub struct ResourceDetail {
    pub target: DrillDown,
    pub records: Vec<ResourceCostRecord>,
    pub error: Option<String>,
    pub loading: bool,
    pub scroll: usize,
}

impl ResourceDetail {
    pub fn mount(route: &str) -> Result<(Self, FetchRequest), AppError> {
        let target = DrillDown::from_route(route)?;
        let view = Self {
            target: target.clone(),
            records: vec![],
            error: None,
            loading: true,
            scroll: 0,
        };
        Ok((view, FetchRequest::Resources(target)))
    }

    pub fn reload(&mut self) -> FetchRequest {
        self.loading = true;
        self.error = None;
        FetchRequest::Resources(self.target.clone())
    }

    pub fn apply(&mut self, target: &DrillDown, records: Vec<ResourceCostRecord>) -> bool {
        if *target != self.target {
            return false;
        }
        self.records = records;
        self.loading = false;
        self.error = None;
        self.scroll = 0;
        true
    }

    pub fn fail(&mut self) {
        self.loading = false;
        self.error = Some(RESOURCE_FETCH_FAILED.to_string());
    }

    pub fn rows(&self, currency: &str) -> Vec<(String, String)> {
        self.records
            .iter()
            .map(|r| {
                (
                    resource_display_name(r.resource_id.as_deref()),
                    format_cost_with_currency(currency, r.pre_tax_cost),
                )
            })
            .collect()
    }
}
