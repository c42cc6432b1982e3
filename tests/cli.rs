use rusqlite::Connection;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn home_path(home: &TempDir) -> &Path {
    home.path()
}

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_costboard")
}

fn run_cmd(home: &TempDir, args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env("COSTBOARD_HOME", home_path(home))
        .env_remove("COSTBOARD_API_URL")
        .env_remove("COSTBOARD_CLIENT_ID")
        .env_remove("COSTBOARD_TENANT_ID")
        .env_remove("COSTBOARD_LOG")
        .output()
        .expect("run costboard command")
}

fn db_path(home: &TempDir) -> PathBuf {
    home.path().join("data").join("costs.sqlite")
}

fn seed_cost_row(home: &TempDir, subscription: &str, group: &str, cost: f64) {
    let conn = Connection::open(db_path(home)).expect("open sqlite");
    conn.execute_batch(
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
        "#,
    )
    .expect("create cost table");

    conn.execute(
        "INSERT INTO cost_rows (subscription_id, resource_group_filter, from_date, to_date, resource_group_name, pre_tax_cost, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            subscription,
            "",
            "2024-01-01",
            "2024-01-31",
            group,
            cost,
            "2024-02-01T00:00:00+00:00"
        ],
    )
    .expect("insert cost row");
}

#[test]
fn init_creates_config_data_and_log_paths() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["init"]);
    assert!(output.status.success());

    assert!(home.path().join("config").join("config.toml").exists());
    assert!(home.path().join("data").exists());
    assert!(home.path().join("logs").exists());
}

#[test]
fn init_is_idempotent() {
    let home = TempDir::new().expect("temp home");

    assert!(run_cmd(&home, &["init"]).status.success());
    let first = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after first init");

    assert!(run_cmd(&home, &["init"]).status.success());
    let second = fs::read_to_string(home.path().join("config").join("config.toml"))
        .expect("read config after second init");

    assert_eq!(first, second);
}

#[test]
fn costs_without_subscription_prompts_for_one() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(
        &home,
        &[
            "costs",
            "--subscription",
            "",
            "--from",
            "2024-01-01",
            "--to",
            "2024-01-31",
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Please select a subscription."));
}

#[test]
fn costs_reject_inverted_window_before_any_request() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(
        &home,
        &[
            "costs",
            "--subscription",
            "a",
            "--from",
            "2024-02-01",
            "--to",
            "2024-01-01",
        ],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is after to date"));
}

#[test]
fn resources_reject_malformed_route() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["resources", "--route", "/resources?subscription=a"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing 'rg' parameter"));
}

#[test]
fn export_csv_outputs_header_and_escaped_fields() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());
    seed_cost_row(&home, "sub,1", "rg\"x", 1.25);

    let output = run_cmd(&home, &["export", "--format", "csv"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(
        "subscription_id,resource_group_filter,from_date,to_date,resource_group,pre_tax_cost,fetched_at"
    ));
    assert!(stdout.contains("\"sub,1\",,2024-01-01,2024-01-31,\"rg\"\"x\",1.25"));
}

#[test]
fn export_json_outputs_valid_array() {
    let home = TempDir::new().expect("temp home");
    assert!(run_cmd(&home, &["init"]).status.success());
    seed_cost_row(&home, "a", "rg1", 2.5);

    let output = run_cmd(&home, &["export", "--format", "json"]);
    assert!(output.status.success());

    let parsed: Value = serde_json::from_slice(&output.stdout).expect("valid json output");
    let arr = parsed.as_array().expect("json array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["subscription_id"], "a");
    assert_eq!(arr[0]["resource_group_name"], "rg1");
    assert_eq!(arr[0]["pre_tax_cost"], 2.5);
}

#[test]
fn export_rejects_unknown_format() {
    let home = TempDir::new().expect("temp home");
    let output = run_cmd(&home, &["export", "--format", "xml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unsupported export format"));
}
