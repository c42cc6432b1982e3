use crate::auth::provider::AuthState;
use crate::auth::Session;
use crate::jobs::{FetchKind, FetchOutput, FetchRequest, FetchResult};
use crate::models::DateRange;
use crate::storage::Storage;
use crate::ui::app::{AppState, ConfirmAction, DateDraft, Screen};
use crate::ui::detail::ResourceDetail;
use chrono::Utc;
use tracing::{debug, error, info, warn};

pub const COST_FETCH_FAILED: &str = "Failed to fetch cost data.";

pub fn show_error(state: &mut AppState, message: String) {
    state.error_message = message;
    state.previous_screen = state.screen.clone();
    state.screen = Screen::ErrorDialog;
}

pub fn show_info(state: &mut AppState, message: String) {
    state.info_message = message;
    state.previous_screen = state.screen.clone();
    state.screen = Screen::InfoDialog;
}

pub fn close_dialog(state: &mut AppState) {
    state.screen = match &state.previous_screen {
        Screen::ErrorDialog | Screen::InfoDialog | Screen::Confirm(_) => Screen::Dashboard,
        other => other.clone(),
    };
}

pub fn ask_confirm(state: &mut AppState, action: ConfirmAction) {
    state.previous_screen = state.screen.clone();
    state.screen = Screen::Confirm(action);
    state.confirm_selected = 0;
}

pub fn group_options(state: &AppState) -> Vec<String> {
    let mut options = vec!["All".to_string()];
    options.extend(state.selection.resource_groups.iter().cloned());
    options
}

pub fn apply_auth(
    state: &mut AppState,
    session: Option<Session>,
    auth_state: AuthState,
) -> Option<FetchRequest> {
    let was_signed_in = state.session.is_some();
    let account_changed = state.session.as_ref().map(|s| &s.account)
        != session.as_ref().map(|s| &s.account);
    state.session = session;
    state.auth_state = auth_state;
    state.auth_busy = false;

    if state.session.is_none() {
        if was_signed_in {
            sign_out_view(state);
        }
        state.status = auth_state.as_label().to_string();
        return None;
    }

    if account_changed {
        state.selection.clear();
        state.subscription_cursor = 0;
        state.group_cursor = 0;
        state.bar_selected = 0;
    }
    state.status = format!("signed in ({})", auth_state.as_label());
    Some(FetchRequest::Subscriptions)
}

fn sign_out_view(state: &mut AppState) {
    state.selection.clear();
    state.detail = None;
    state.subscription_cursor = 0;
    state.group_cursor = 0;
    state.bar_selected = 0;
    if matches!(state.screen, Screen::ResourceDetail | Screen::DateForm) {
        state.screen = Screen::Dashboard;
    }
}

pub fn choose_subscription(state: &mut AppState) -> Option<FetchRequest> {
    let id = state
        .selection
        .subscriptions
        .get(state.subscription_cursor)?
        .id
        .clone();
    let subscription_id = state.selection.select_subscription(&id)?;
    state.group_cursor = 0;
    state.bar_selected = 0;
    state.status = format!("loading resource groups for {subscription_id}...");
    Some(FetchRequest::ResourceGroups { subscription_id })
}

pub fn choose_resource_group(state: &mut AppState) {
    let options = group_options(state);
    let cursor = state.group_cursor.min(options.len().saturating_sub(1));
    if cursor == 0 {
        state.selection.select_resource_group(None);
    } else {
        state.selection.select_resource_group(Some(&options[cursor]));
    }
}

pub fn request_costs(state: &mut AppState) -> Option<FetchRequest> {
    match state.selection.cost_query() {
        Ok(query) => {
            state.status = "fetching cost data...".into();
            Some(FetchRequest::Costs(query))
        }
        Err(e) => {
            show_error(state, e.to_string());
            None
        }
    }
}

pub fn open_drill_down(state: &mut AppState) -> Option<FetchRequest> {
    let label = state
        .selection
        .costs
        .get(state.bar_selected)?
        .resource_group_name
        .clone();
    let target = state.selection.drill_down(&label)?;
    let route = target.to_route();
    info!(%route, "drill down");

    match ResourceDetail::mount(&route) {
        Ok((view, request)) => {
            state.detail = Some(view);
            state.screen = Screen::ResourceDetail;
            Some(request)
        }
        Err(e) => {
            show_error(state, e.to_string());
            None
        }
    }
}

pub fn open_date_form(state: &mut AppState) {
    state.date_draft = DateDraft::from_range(&state.selection.range);
    state.screen = Screen::DateForm;
}

pub fn submit_date_form(state: &mut AppState) {
    match DateRange::parse(&state.date_draft.from, &state.date_draft.to) {
        Ok(range) => {
            state.selection.set_range(range);
            state.screen = Screen::Dashboard;
            state.status = format!("window {} → {}", range.from_label(), range.to_label());
        }
        Err(e) => show_error(state, e.to_string()),
    }
}

pub fn apply_fetch(
    state: &mut AppState,
    storage: &mut Storage,
    kind: FetchKind,
    result: FetchResult,
) {
    match result {
        Ok(FetchOutput::Subscriptions(subscriptions)) => {
            state.status = format!("{} subscriptions", subscriptions.len());
            state.subscription_cursor = state
                .subscription_cursor
                .min(subscriptions.len().saturating_sub(1));
            state.selection.apply_subscriptions(subscriptions);
        }
        Ok(FetchOutput::ResourceGroups {
            subscription_id,
            groups,
        }) => {
            let count = groups.len();
            if state.selection.apply_resource_groups(&subscription_id, groups) {
                state.group_cursor = 0;
                state.status = format!("{count} resource groups");
            }
        }
        Ok(FetchOutput::Costs { query, records }) => {
            if !state.selection.accepts_costs(&query) {
                debug!(subscription = %query.subscription_id, "dropping superseded cost rows");
                return;
            }
            let count = records.len();
            if let Err(e) = storage.replace_costs(&query, &records, Utc::now()) {
                warn!(error = %e, "failed to store cost rows");
            }
            state.selection.apply_costs(query, records);
            state.bar_selected = 0;
            state.status = format!("{count} cost rows");
        }
        Ok(FetchOutput::Resources { target, records }) => {
            if let Err(e) = storage.replace_resources(&target, &records, Utc::now()) {
                warn!(error = %e, "failed to store resource rows");
            }
            if let Some(detail) = state.detail.as_mut() {
                detail.apply(&target, records);
            }
        }
        Err(e) => match kind {
            FetchKind::Subscriptions | FetchKind::ResourceGroups => {
                warn!(error = %e, kind = kind.as_label(), "fetch failed");
                state.status = format!("Error loading {}: {e}", kind.as_label());
            }
            FetchKind::Costs => {
                error!(error = %e, "error fetching cost data");
                state.status = format!("cost fetch failed: {e}");
                show_error(state, COST_FETCH_FAILED.to_string());
            }
            FetchKind::Resources => {
                error!(error = %e, "error loading resource costs");
                if let Some(detail) = state.detail.as_mut() {
                    detail.fail();
                }
            }
        },
    }
}
