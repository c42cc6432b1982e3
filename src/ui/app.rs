use crate::auth::provider::AuthState;
use crate::auth::Session;
use crate::models::DateRange;
use crate::selection::SelectionState;
use crate::ui::detail::ResourceDetail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    ResourceDetail,
    DateForm,
    Confirm(ConfirmAction),
    ErrorDialog,
    InfoDialog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Quit,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Subscriptions,
    ResourceGroups,
    Chart,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Subscriptions => Focus::ResourceGroups,
            Focus::ResourceGroups => Focus::Chart,
            Focus::Chart => Focus::Subscriptions,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Focus::Subscriptions => Focus::Chart,
            Focus::ResourceGroups => Focus::Subscriptions,
            Focus::Chart => Focus::ResourceGroups,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DateDraft {
    pub from: String,
    pub to: String,
    pub active_field: usize,
}

impl DateDraft {
    pub fn from_range(range: &DateRange) -> Self {
        Self {
            from: range.from_label(),
            to: range.to_label(),
            active_field: 0,
        }
    }

    pub fn active_mut(&mut self) -> &mut String {
        if self.active_field == 0 {
            &mut self.from
        } else {
            &mut self.to
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub running: bool,
    pub status: String,
    pub compact_mode: bool,
    pub screen: Screen,
    pub previous_screen: Screen,
    pub focus: Focus,
    pub subscription_cursor: usize,
    pub group_cursor: usize,
    pub bar_selected: usize,
    pub selection: SelectionState,
    pub session: Option<Session>,
    pub auth_state: AuthState,
    pub auth_busy: bool,
    pub costs_loading: bool,
    pub detail: Option<ResourceDetail>,
    pub date_draft: DateDraft,
    pub confirm_selected: usize,
    pub currency: String,
    pub error_message: String,
    pub info_message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            running: true,
            status: "ready".into(),
            compact_mode: false,
            screen: Screen::Dashboard,
            previous_screen: Screen::Dashboard,
            focus: Focus::Subscriptions,
            subscription_cursor: 0,
            group_cursor: 0,
            bar_selected: 0,
            selection: SelectionState::default(),
            session: None,
            auth_state: AuthState::SignedOut,
            auth_busy: false,
            costs_loading: false,
            detail: None,
            date_draft: DateDraft::default(),
            confirm_selected: 0,
            currency: "₹".into(),
            error_message: String::new(),
            info_message: String::new(),
        }
    }
}

impl AppState {
    pub fn signed_in(&self) -> bool {
        self.session.is_some()
    }
}
