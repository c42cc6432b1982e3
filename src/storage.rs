use crate::error::AppError;
use crate::models::{CostQuery, CostRecord, ResourceCostRecord};
use crate::navigation::DrillDown;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub struct Storage {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCost {
    pub subscription_id: String,
    pub resource_group_filter: String,
    pub from_date: String,
    pub to_date: String,
    pub resource_group_name: String,
    pub pre_tax_cost: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let this = Self { conn };
        this.init()?;
        Ok(this)
    }

    fn init(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cost_rows (
                id INTEGER PRIMARY KEY,
                subscription_id TEXT NOT NULL,
                resource_group_filter TEXT NOT NULL,
                from_date TEXT NOT NULL,
                to_date TEXT NOT NULL,
                resource_group_name TEXT NOT NULL,
                pre_tax_cost REAL NOT NULL,
                fetched_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS resource_rows (
                id INTEGER PRIMARY KEY,
                subscription_id TEXT NOT NULL,
                resource_group TEXT NOT NULL,
                from_date TEXT NOT NULL,
                to_date TEXT NOT NULL,
                resource_id TEXT,
                pre_tax_cost REAL,
                fetched_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn replace_costs(
        &mut self,
        query: &CostQuery,
        records: &[CostRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        let filter = query.resource_group.clone().unwrap_or_default();
        let from = query.range.from_label();
        let to = query.range.to_label();

        tx.execute(
            "DELETE FROM cost_rows
             WHERE subscription_id = ? AND resource_group_filter = ? AND from_date = ? AND to_date = ?",
            params![query.subscription_id, filter, from, to],
        )?;

        let mut insert = tx.prepare(
            "INSERT INTO cost_rows (subscription_id, resource_group_filter, from_date, to_date, resource_group_name, pre_tax_cost, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for r in records {
            insert.execute(params![
                query.subscription_id,
                filter,
                from,
                to,
                r.resource_group_name,
                r.pre_tax_cost,
                fetched_at.to_rfc3339(),
            ])?;
        }

        drop(insert);
        tx.commit()?;
        Ok(())
    }

    pub fn replace_resources(
        &mut self,
        target: &DrillDown,
        records: &[ResourceCostRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM resource_rows
             WHERE subscription_id = ? AND resource_group = ? AND from_date = ? AND to_date = ?",
            params![target.subscription, target.resource_group, target.from, target.to],
        )?;

        let mut insert = tx.prepare(
            "INSERT INTO resource_rows (subscription_id, resource_group, from_date, to_date, resource_id, pre_tax_cost, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        for r in records {
            insert.execute(params![
                target.subscription,
                target.resource_group,
                target.from,
                target.to,
                r.resource_id,
                r.pre_tax_cost,
                fetched_at.to_rfc3339(),
            ])?;
        }

        drop(insert);
        tx.commit()?;
        Ok(())
    }

    pub fn resource_count(&self) -> Result<u64, AppError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM resource_rows", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn stored_costs(&self) -> Result<Vec<StoredCost>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT subscription_id, resource_group_filter, from_date, to_date, resource_group_name, pre_tax_cost, fetched_at
             FROM cost_rows ORDER BY fetched_at DESC, pre_tax_cost DESC",
        )?;

        let rows = stmt
            .query_map([], |r| {
                let fetched_at: String = r.get(6)?;
                Ok(StoredCost {
                    subscription_id: r.get(0)?,
                    resource_group_filter: r.get(1)?,
                    from_date: r.get(2)?,
                    to_date: r.get(3)?,
                    resource_group_name: r.get(4)?,
                    pre_tax_cost: r.get(5)?,
                    fetched_at: chrono::DateTime::parse_from_rfc3339(&fetched_at)
                        .map(|d| d.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                6,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_cost_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&self.stored_costs()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_ts(hour: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + (hour * 3600), 0)
            .single()
            .expect("valid fixed timestamp")
    }

    fn query(subscription: &str, group: Option<&str>) -> CostQuery {
        CostQuery {
            subscription_id: subscription.into(),
            resource_group: group.map(str::to_string),
            range: DateRange::parse("2024-01-01", "2024-01-31").expect("range"),
        }
    }

    fn cost(group: &str, amount: f64) -> CostRecord {
        CostRecord {
            resource_group_name: group.into(),
            pre_tax_cost: amount,
        }
    }

    fn open(tmp: &TempDir) -> Storage {
        Storage::open(&tmp.path().join("costs.sqlite")).expect("open storage")
    }

    #[test]
    fn refetching_a_query_replaces_its_rows() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);

        storage
            .replace_costs(&query("a", None), &[cost("rg1", 1.0), cost("rg2", 2.0)], fixed_ts(1))
            .expect("first fetch");
        storage
            .replace_costs(&query("a", None), &[cost("rg1", 3.0)], fixed_ts(2))
            .expect("second fetch");

        let rows = storage.stored_costs().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource_group_name, "rg1");
        assert!((rows[0].pre_tax_cost - 3.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].fetched_at, fixed_ts(2));
    }

    #[test]
    fn other_queries_are_left_alone() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);

        storage
            .replace_costs(&query("a", None), &[cost("rg1", 1.0)], fixed_ts(1))
            .expect("all groups");
        storage
            .replace_costs(&query("a", Some("rg1")), &[cost("rg1", 1.0)], fixed_ts(1))
            .expect("filtered");
        storage
            .replace_costs(&query("b", None), &[], fixed_ts(2))
            .expect("empty result");

        let rows = storage.stored_costs().expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.subscription_id == "a"));
    }

    #[test]
    fn resource_rows_keep_missing_columns() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);
        let target = DrillDown {
            subscription: "a".into(),
            resource_group: "rg1".into(),
            from: "2024-01-01".into(),
            to: "2024-01-31".into(),
        };

        storage
            .replace_resources(
                &target,
                &[
                    ResourceCostRecord::default(),
                    ResourceCostRecord {
                        resource_id: Some("sub/rg/providers/x/vm1".into()),
                        pre_tax_cost: Some(4.0),
                    },
                ],
                fixed_ts(1),
            )
            .expect("store resources");
        storage
            .replace_resources(&target, &[ResourceCostRecord::default()], fixed_ts(2))
            .expect("replace resources");

        assert_eq!(storage.resource_count().expect("count"), 1);
    }

    #[test]
    fn export_cost_json_serializes_stored_rows() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);
        storage
            .replace_costs(&query("a", Some("rg1")), &[cost("rg1", 0.5)], fixed_ts(1))
            .expect("store");

        let json = storage.export_cost_json().expect("export json");
        let rows: Vec<StoredCost> = serde_json::from_str(&json).expect("parse exported json");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource_group_filter, "rg1");
        assert_eq!(rows[0].from_date, "2024-01-01");
    }
}
