mod auth;
mod billing;
mod config;
mod error;
mod jobs;
mod logging;
mod models;
mod navigation;
mod selection;
mod service;
mod storage;
mod ui;

use auth::provider::TokenProvider;
use auth::DeviceCodePrompt;
use clap::{Parser, Subcommand};
use config::{db_path, ensure_initialized, load_config, AppConfig};
use error::AppError;
use models::{parse_date, CostQuery, DateRange};
use navigation::DrillDown;
use selection::SelectionState;
use service::{authenticated_session, token_provider, CostService};
use storage::Storage;
use tokio::sync::mpsc;
use ui::detail::{format_cost_with_currency, resource_display_name};
use ui::run::run_tui;

#[derive(Debug, Parser)]
#[command(name = "costboard")]
#[command(about = "Cloud subscription cost dashboard with resource drill-down")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    /// Sign in with a device code.
    Login,
    Logout,
    /// Show the signed-in account, token state and stored row counts.
    Status,
    Subscriptions,
    ResourceGroups {
        #[arg(long)]
        subscription: String,
    },
    Costs {
        #[arg(long)]
        subscription: String,
        #[arg(long)]
        resource_group: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Resource-level costs for one resource group.
    Resources {
        #[arg(long, conflicts_with_all = ["subscription", "rg", "from", "to"])]
        route: Option<String>,
        #[arg(long)]
        subscription: Option<String>,
        #[arg(long)]
        rg: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Export {
        #[arg(long, default_value = "json")]
        format: String,
    },
    Tui,
}

fn resolve_range(
    from: Option<&str>,
    to: Option<&str>,
    default_days: i64,
) -> Result<DateRange, AppError> {
    let fallback = DateRange::last_days(default_days);
    let from = from.map(parse_date).transpose()?.unwrap_or(fallback.from);
    let to = to.map(parse_date).transpose()?.unwrap_or(fallback.to);
    DateRange::new(from, to)
}

fn validate_cost_query(
    subscription: &str,
    resource_group: Option<&str>,
    range: DateRange,
) -> Result<CostQuery, AppError> {
    let mut selection = SelectionState::with_range(range);
    selection.select_subscription(subscription);
    selection.select_resource_group(resource_group);
    selection.cost_query()
}

fn resolve_target(
    route: Option<&str>,
    subscription: Option<String>,
    rg: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<DrillDown, AppError> {
    if let Some(route) = route {
        return DrillDown::from_route(route);
    }
    match (subscription, rg, from, to) {
        (Some(subscription), Some(resource_group), Some(from), Some(to)) => {
            DateRange::parse(&from, &to)?;
            Ok(DrillDown {
                subscription,
                resource_group,
                from,
                to,
            })
        }
        _ => Err(AppError::Validation(
            "Provide --route, or all of --subscription, --rg, --from and --to.".into(),
        )),
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn cli_token_provider(cfg: &AppConfig) -> Result<TokenProvider, AppError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<DeviceCodePrompt>();
    tokio::spawn(async move {
        while let Some(prompt) = rx.recv().await {
            eprintln!("{}", prompt.message);
        }
    });
    token_provider(cfg, Some(tx))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Tui) {
        ensure_initialized()?;
        let _guard = logging::init_tui()?;
        return run_tui().await;
    }

    ensure_initialized()?;
    let _guard = logging::init()?;
    let cfg = load_config()?;

    match cli.command {
        Commands::Init => {
            println!("Initialized costboard config and data directories.");
        }
        Commands::Login => {
            let mut tokens = cli_token_provider(&cfg)?;
            let state = tokens.login().await?;
            let username = tokens
                .session()
                .map(|s| s.account.username.clone())
                .unwrap_or_default();
            println!("Signed in as {username} ({}).", state.as_label());
        }
        Commands::Logout => {
            let mut tokens = cli_token_provider(&cfg)?;
            if tokens.restore_account().await?.is_none() {
                println!("Not signed in.");
            } else {
                tokens.logout().await?;
                println!("Signed out.");
            }
        }
        Commands::Status => {
            let storage = Storage::open(&db_path()?)?;
            let mut tokens = cli_token_provider(&cfg)?;
            let account = tokens
                .restore_silent()
                .await?
                .map(|s| s.account.username.clone());
            println!("API: {}", cfg.api_base_url);
            println!(
                "Account: {}",
                account.as_deref().unwrap_or("(signed out)")
            );
            println!("Auth: {}", tokens.state().as_label());
            println!("Stored cost rows: {}", storage.stored_costs()?.len());
            println!("Stored resource rows: {}", storage.resource_count()?);
        }
        Commands::Subscriptions => {
            let mut tokens = cli_token_provider(&cfg)?;
            let session = authenticated_session(&mut tokens).await?;
            let service = CostService::new(&cfg)?;
            for s in service.subscriptions(&session).await? {
                println!("{}\t{}", s.id, s.name);
            }
        }
        Commands::ResourceGroups { subscription } => {
            let subscription = subscription.trim().to_string();
            if subscription.is_empty() {
                return Err(AppError::Validation(
                    selection::NO_SUBSCRIPTION_MESSAGE.into(),
                ));
            }
            let mut tokens = cli_token_provider(&cfg)?;
            let session = authenticated_session(&mut tokens).await?;
            let service = CostService::new(&cfg)?;
            for group in service.resource_groups(&session, &subscription).await? {
                println!("{group}");
            }
        }
        Commands::Costs {
            subscription,
            resource_group,
            from,
            to,
        } => {
            let range = resolve_range(from.as_deref(), to.as_deref(), cfg.default_window_days)?;
            let query = validate_cost_query(&subscription, resource_group.as_deref(), range)?;
            let mut storage = Storage::open(&db_path()?)?;
            let mut tokens = cli_token_provider(&cfg)?;
            let session = authenticated_session(&mut tokens).await?;
            let service = CostService::new(&cfg)?;
            let records = service.fetch_costs(&session, &query, &mut storage).await?;
            for r in records {
                println!(
                    "{}\t{}",
                    r.resource_group_name,
                    format_cost_with_currency(&cfg.currency_symbol, Some(r.pre_tax_cost))
                );
            }
        }
        Commands::Resources {
            route,
            subscription,
            rg,
            from,
            to,
        } => {
            let target = resolve_target(route.as_deref(), subscription, rg, from, to)?;
            let mut storage = Storage::open(&db_path()?)?;
            let mut tokens = cli_token_provider(&cfg)?;
            let session = authenticated_session(&mut tokens).await?;
            let service = CostService::new(&cfg)?;
            let records = service
                .fetch_resources(&session, &target, &mut storage)
                .await?;
            println!("Resources in RG: {}", target.resource_group);
            println!("From: {} → To: {}", target.from, target.to);
            for r in records {
                println!(
                    "{}\t{}",
                    resource_display_name(r.resource_id.as_deref()),
                    format_cost_with_currency(&cfg.currency_symbol, r.pre_tax_cost)
                );
            }
        }
        Commands::Export { format } => {
            let storage = Storage::open(&db_path()?)?;
            if format.eq_ignore_ascii_case("json") {
                println!("{}", storage.export_cost_json()?);
            } else if format.eq_ignore_ascii_case("csv") {
                println!(
                    "subscription_id,resource_group_filter,from_date,to_date,resource_group,pre_tax_cost,fetched_at"
                );
                for r in storage.stored_costs()? {
                    println!(
                        "{},{},{},{},{},{:.2},{}",
                        csv_field(&r.subscription_id),
                        csv_field(&r.resource_group_filter),
                        csv_field(&r.from_date),
                        csv_field(&r.to_date),
                        csv_field(&r.resource_group_name),
                        r.pre_tax_cost,
                        csv_field(&r.fetched_at.to_rfc3339()),
                    );
                }
            } else {
                return Err(AppError::Config(
                    "Unsupported export format. Use json or csv".into(),
                ));
            }
        }
        Commands::Tui => {}
    }

    Ok(())
}
