use crate::auth::provider::{AuthState, TokenProvider};
use crate::auth::{DeviceCodePrompt, Session};
use crate::billing::BillingClient;
use crate::config::{db_path, load_config, AppConfig};
use crate::error::AppError;
use crate::jobs::{FetchJobs, FetchKind, FetchRequest};
use crate::models::DateRange;
use crate::selection::SelectionState;
use crate::service::{token_provider, CostService};
use crate::storage::Storage;
use crate::ui::app::{AppState, ConfirmAction, Focus, Screen};
use crate::ui::dashboard::{
    apply_auth, apply_fetch, ask_confirm, choose_resource_group, choose_subscription,
    close_dialog, group_options, open_date_form, open_drill_down, request_costs, show_error,
    show_info, submit_date_form,
};
use crate::ui::render::render;
use chrono::{Duration, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error};

const TICK: StdDuration = StdDuration::from_millis(100);
const DATE_INPUT_MAX: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthJob {
    Restore,
    Login,
    Logout,
    Renew,
}

impl AuthJob {
    fn as_label(self) -> &'static str {
        match self {
            AuthJob::Restore => "session restore",
            AuthJob::Login => "sign-in",
            AuthJob::Logout => "sign-out",
            AuthJob::Renew => "token renewal",
        }
    }
}

#[derive(Debug, PartialEq)]
enum Action {
    Fetch(FetchRequest),
    Auth(AuthJob),
    Cancel(FetchKind),
}

struct AuthTask {
    job: AuthJob,
    handle: JoinHandle<(TokenProvider, Result<(), AppError>)>,
}

struct Runtime {
    cfg: AppConfig,
    client: Arc<BillingClient>,
    jobs: FetchJobs,
    tokens: Option<TokenProvider>,
    auth_task: Option<AuthTask>,
    prompt_tx: UnboundedSender<DeviceCodePrompt>,
    deferred: Vec<FetchRequest>,
}

pub async fn run_tui() -> Result<(), AppError> {
    let cfg = load_config()?;
    let db = db_path()?;
    let mut storage = Storage::open(&db)?;
    let service = CostService::new(&cfg)?;
    let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
    let tokens = token_provider(&cfg, Some(prompt_tx.clone()))?;

    let runtime = Runtime {
        cfg,
        client: service.client(),
        jobs: FetchJobs::default(),
        tokens: Some(tokens),
        auth_task: None,
        prompt_tx,
        deferred: vec![],
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let loop_result = run_loop(&mut terminal, runtime, &mut storage, prompt_rx).await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

fn initial_state(cfg: &AppConfig) -> AppState {
    AppState {
        currency: cfg.currency_symbol.clone(),
        selection: SelectionState::with_range(DateRange::last_days(cfg.default_window_days)),
        ..AppState::default()
    }
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut rt: Runtime,
    storage: &mut Storage,
    mut prompts: UnboundedReceiver<DeviceCodePrompt>,
) -> Result<(), AppError> {
    let mut state = initial_state(&rt.cfg);
    start_auth(&mut state, &mut rt, AuthJob::Restore);

    while state.running {
        if rt
            .auth_task
            .as_ref()
            .is_some_and(|task| task.handle.is_finished())
        {
            finish_auth(&mut state, &mut rt).await;
        }

        while let Ok(prompt) = prompts.try_recv() {
            show_info(&mut state, prompt.message);
        }

        for (kind, result) in rt.jobs.take_finished().await {
            apply_fetch(&mut state, storage, kind, result);
        }
        state.costs_loading = rt.jobs.is_running(FetchKind::Costs);

        terminal.draw(|f| render(f, &state))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(action) = handle_key(key.code, key.modifiers, &mut state) {
                    perform(&mut state, &mut rt, action);
                }
            }
        }
    }

    rt.jobs.cancel_all();
    if let Some(task) = rt.auth_task.take() {
        task.handle.abort();
    }
    Ok(())
}

fn perform(state: &mut AppState, rt: &mut Runtime, action: Action) {
    match action {
        Action::Fetch(request) => dispatch(state, rt, request, true),
        Action::Auth(job) => {
            if job == AuthJob::Logout {
                rt.jobs.cancel_all();
                rt.deferred.clear();
            }
            start_auth(state, rt, job);
        }
        Action::Cancel(kind) => rt.jobs.cancel(kind),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FetchPlan {
    Dispatch,
    Defer,
    Renew,
}

/// `may_renew` is false when replaying fetches after a renewal, so a token
/// that comes back already close to expiry is used rather than renewed again.
fn plan_fetch(session: &Session, renewing: bool, may_renew: bool) -> FetchPlan {
    if renewing {
        FetchPlan::Defer
    } else if may_renew && token_needs_renewal(session) {
        FetchPlan::Renew
    } else {
        FetchPlan::Dispatch
    }
}

fn dispatch(state: &mut AppState, rt: &mut Runtime, request: FetchRequest, may_renew: bool) {
    let Some(session) = state.session.clone() else {
        state.status = "Sign in first (press 'l').".into();
        return;
    };
    let renewing = rt.auth_task.as_ref().is_some_and(|t| t.job == AuthJob::Renew);
    match plan_fetch(&session, renewing, may_renew && rt.tokens.is_some()) {
        FetchPlan::Defer => rt.deferred.push(request),
        FetchPlan::Renew => {
            debug!(kind = request.kind().as_label(), "deferring fetch until token renewal");
            rt.deferred.push(request);
            start_auth(state, rt, AuthJob::Renew);
        }
        FetchPlan::Dispatch => {
            debug!(kind = request.kind().as_label(), "dispatching fetch");
            rt.jobs.dispatch(rt.client.clone(), session, request);
        }
    }
}

fn token_needs_renewal(session: &Session) -> bool {
    session
        .token
        .as_ref()
        .is_some_and(|t| !t.is_fresh(Utc::now(), Duration::minutes(1)))
}

fn start_auth(state: &mut AppState, rt: &mut Runtime, job: AuthJob) {
    if rt.auth_task.is_some() {
        if job != AuthJob::Renew {
            state.status = "Sign-in already in progress.".into();
        }
        return;
    }
    let Some(mut tokens) = rt.tokens.take() else {
        state.status = "Sign-in unavailable.".into();
        return;
    };

    state.auth_busy = true;
    state.auth_state = match job {
        AuthJob::Login => AuthState::InteractionInFlight,
        AuthJob::Logout => AuthState::SignedOut,
        AuthJob::Restore | AuthJob::Renew => AuthState::TokenPending,
    };
    state.status = format!("{} in progress...", job.as_label());

    let handle = tokio::spawn(async move {
        let result = match job {
            AuthJob::Restore => tokens.restore_session().await.map(|_| ()),
            AuthJob::Login => tokens.login().await.map(|_| ()),
            AuthJob::Logout => tokens.logout().await,
            AuthJob::Renew => {
                tokens.acquire_token().await;
                Ok(())
            }
        };
        (tokens, result)
    });
    rt.auth_task = Some(AuthTask { job, handle });
}

async fn finish_auth(state: &mut AppState, rt: &mut Runtime) {
    let Some(task) = rt.auth_task.take() else {
        return;
    };

    if state.screen == Screen::InfoDialog {
        close_dialog(state);
    }

    match task.handle.await {
        Ok((tokens, result)) => {
            let session = tokens.session().cloned();
            let auth_state = tokens.state();
            rt.tokens = Some(tokens);

            let follow_up = apply_auth(state, session, auth_state);
            if let Err(e) = result {
                error!(error = %e, job = task.job.as_label(), "authentication task failed");
                show_error(state, format!("{} failed: {e}", task.job.as_label()));
            }

            let deferred = std::mem::take(&mut rt.deferred);
            let renewed = task.job == AuthJob::Renew;
            if !renewed {
                if let Some(request) = follow_up {
                    dispatch(state, rt, request, true);
                }
            }
            for request in deferred {
                dispatch(state, rt, request, !renewed);
            }
        }
        Err(e) => {
            error!(error = %e, job = task.job.as_label(), "authentication task aborted");
            state.auth_busy = false;
            rt.deferred.clear();
            show_error(state, format!("{} failed: {e}", task.job.as_label()));
            match token_provider(&rt.cfg, Some(rt.prompt_tx.clone())) {
                Ok(tokens) => rt.tokens = Some(tokens),
                Err(e) => error!(error = %e, "failed to rebuild token provider"),
            }
        }
    }
}

fn move_cursor(cursor: &mut usize, len: usize, down: bool) {
    if down {
        if *cursor + 1 < len {
            *cursor += 1;
        }
    } else if *cursor > 0 {
        *cursor -= 1;
    }
}

fn handle_key(code: KeyCode, modifiers: KeyModifiers, state: &mut AppState) -> Option<Action> {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        ask_confirm(state, ConfirmAction::Quit);
        return None;
    }

    if code == KeyCode::Char('z')
        && matches!(state.screen, Screen::Dashboard | Screen::ResourceDetail)
    {
        state.compact_mode = !state.compact_mode;
        state.status = if state.compact_mode {
            "compact mode enabled".into()
        } else {
            "compact mode disabled".into()
        };
        return None;
    }

    match state.screen.clone() {
        Screen::Dashboard => dashboard_key(code, state),
        Screen::ResourceDetail => detail_key(code, state),
        Screen::DateForm => {
            match code {
                KeyCode::Esc => state.screen = Screen::Dashboard,
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                    state.date_draft.active_field = 1 - state.date_draft.active_field.min(1);
                }
                KeyCode::Backspace => {
                    state.date_draft.active_mut().pop();
                }
                KeyCode::Char(ch) if ch.is_ascii_digit() || ch == '-' => {
                    let field = state.date_draft.active_mut();
                    if field.len() < DATE_INPUT_MAX {
                        field.push(ch);
                    }
                }
                KeyCode::Enter => submit_date_form(state),
                _ => {}
            }
            None
        }
        Screen::Confirm(action) => {
            match code {
                KeyCode::Esc => state.screen = state.previous_screen.clone(),
                KeyCode::Left => state.confirm_selected = 0,
                KeyCode::Right => state.confirm_selected = 1,
                KeyCode::Tab => state.confirm_selected = 1 - state.confirm_selected.min(1),
                KeyCode::Enter => {
                    if state.confirm_selected == 0 {
                        state.screen = state.previous_screen.clone();
                        return None;
                    }
                    match action {
                        ConfirmAction::Quit => state.running = false,
                        ConfirmAction::Logout => {
                            state.screen = Screen::Dashboard;
                            return Some(Action::Auth(AuthJob::Logout));
                        }
                    }
                }
                _ => {}
            }
            None
        }
        Screen::ErrorDialog | Screen::InfoDialog => {
            if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                close_dialog(state);
            }
            None
        }
    }
}

fn dashboard_key(code: KeyCode, state: &mut AppState) -> Option<Action> {
    match code {
        KeyCode::Char('q') => {
            ask_confirm(state, ConfirmAction::Quit);
            return None;
        }
        KeyCode::Char('l') => {
            if state.signed_in() {
                state.status = "Already signed in. Press 'o' to sign out first.".into();
                return None;
            }
            return Some(Action::Auth(AuthJob::Login));
        }
        _ => {}
    }

    if !state.signed_in() {
        if matches!(code, KeyCode::Char('f' | 'd' | 'r' | 'o') | KeyCode::Enter) {
            state.status = "Sign in first (press 'l').".into();
        }
        return None;
    }

    match code {
        KeyCode::Tab => state.focus = state.focus.next(),
        KeyCode::BackTab => state.focus = state.focus.previous(),
        KeyCode::Up | KeyCode::Down => {
            let down = code == KeyCode::Down;
            match state.focus {
                Focus::Subscriptions => {
                    let len = state.selection.subscriptions.len();
                    move_cursor(&mut state.subscription_cursor, len, down);
                }
                Focus::ResourceGroups => {
                    let len = group_options(state).len();
                    move_cursor(&mut state.group_cursor, len, down);
                }
                Focus::Chart => {
                    let len = state.selection.costs.len();
                    move_cursor(&mut state.bar_selected, len, down);
                }
            }
        }
        KeyCode::Enter => match state.focus {
            Focus::Subscriptions => return choose_subscription(state).map(Action::Fetch),
            Focus::ResourceGroups => choose_resource_group(state),
            Focus::Chart => return open_drill_down(state).map(Action::Fetch),
        },
        KeyCode::Char('f') => return request_costs(state).map(Action::Fetch),
        KeyCode::Char('d') => open_date_form(state),
        KeyCode::Char('r') => {
            state.status = "reloading subscriptions...".into();
            return Some(Action::Fetch(FetchRequest::Subscriptions));
        }
        KeyCode::Char('o') => ask_confirm(state, ConfirmAction::Logout),
        _ => {}
    }
    None
}

fn detail_key(code: KeyCode, state: &mut AppState) -> Option<Action> {
    match code {
        KeyCode::Esc | KeyCode::Backspace => {
            state.detail = None;
            state.screen = Screen::Dashboard;
            Some(Action::Cancel(FetchKind::Resources))
        }
        KeyCode::Char('q') => {
            ask_confirm(state, ConfirmAction::Quit);
            None
        }
        KeyCode::Up | KeyCode::Down => {
            if let Some(detail) = state.detail.as_mut() {
                let len = detail.records.len();
                move_cursor(&mut detail.scroll, len, code == KeyCode::Down);
            }
            None
        }
        KeyCode::Char('r') => state
            .detail
            .as_mut()
            .map(|detail| Action::Fetch(detail.reload())),
        _ => None,
    }
}
