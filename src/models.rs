use crate::error::AppError;
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    #[serde(rename = "ResourceGroupName")]
    pub resource_group_name: String,
    #[serde(rename = "PreTaxCost")]
    pub pre_tax_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceCostRecord {
    #[serde(rename = "ResourceId", default)]
    pub resource_id: Option<String>,
    #[serde(rename = "PreTaxCost", default)]
    pub pre_tax_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, AppError> {
        if from > to {
            return Err(AppError::Validation(format!(
                "From date {} is after to date {}.",
                from.format(DATE_FORMAT),
                to.format(DATE_FORMAT)
            )));
        }
        Ok(Self { from, to })
    }

    pub fn ending_on(today: NaiveDate, days: i64) -> Self {
        Self {
            from: today - Duration::days(days),
            to: today,
        }
    }

    pub fn last_days(days: i64) -> Self {
        Self::ending_on(Local::now().date_naive(), days)
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, AppError> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    pub fn from_label(&self) -> String {
        self.from.format(DATE_FORMAT).to_string()
    }

    pub fn to_label(&self) -> String {
        self.to.format(DATE_FORMAT).to_string()
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::last_days(30)
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    Ok(NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)?)
}

/// A validated cost request. `resource_group: None` means all groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub range: DateRange,
}
