use crate::ui::app::{AppState, ConfirmAction, Focus, Screen};
use crate::ui::dashboard::group_options;
use crate::ui::detail::format_cost;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table,
    Wrap,
};

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_BAR: Color = Color::Blue;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;

pub fn render(f: &mut ratatui::Frame, state: &AppState) {
    let size = f.area();
    let compact = state.compact_mode || size.width < 110;

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(size);

    render_header(f, root[0], state);

    if state.signed_in() {
        if showing_detail(state) {
            render_detail(f, root[1], state);
        } else {
            render_dashboard(f, root[1], state, compact);
        }
    } else {
        let hint = if state.auth_busy {
            "Signing in... follow the device code instructions if prompted."
        } else {
            "Not signed in. Press 'l' to sign in with Microsoft."
        };
        let body = Paragraph::new(hint)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Cost Dashboard "))
            .style(Style::default().fg(COLOR_MUTED));
        f.render_widget(body, root[1]);
    }

    let footer = Paragraph::new(footer_text(state))
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(footer, root[2]);

    match &state.screen {
        Screen::Dashboard | Screen::ResourceDetail => {}
        Screen::DateForm => render_date_form(f, state),
        Screen::Confirm(action) => render_confirm(f, state, action),
        Screen::ErrorDialog => render_error(f, state),
        Screen::InfoDialog => render_info(f, state),
    }
}

/// The detail table stays visible under popups opened from it.
fn showing_detail(state: &AppState) -> bool {
    match state.screen {
        Screen::ResourceDetail => true,
        Screen::ErrorDialog | Screen::InfoDialog | Screen::Confirm(_) => {
            state.previous_screen == Screen::ResourceDetail
        }
        Screen::Dashboard | Screen::DateForm => false,
    }
}

fn render_header(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let who = state
        .session
        .as_ref()
        .map(|s| format!("Signed in as: {}", s.account.username))
        .unwrap_or_else(|| "signed out".to_string());
    let header = Paragraph::new(format!(
        " costboard  ·  {who}  ·  {}  ·  {} ",
        state.auth_state.as_label(),
        state.status
    ))
    .block(Block::default().borders(Borders::ALL).title(" Session "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(header, area);
}

fn focus_block(title: &str, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(format!(" {title} "))
}

fn picker_items(options: &[String], cursor: usize, chosen: Option<usize>) -> Vec<ListItem<'static>> {
    options
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            let marker = if Some(idx) == chosen { "●" } else { " " };
            let style = if idx == cursor {
                Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{marker} {label}")).style(style)
        })
        .collect()
}

fn render_dashboard(f: &mut ratatui::Frame, area: Rect, state: &AppState, compact: bool) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(if compact {
            [Constraint::Percentage(35), Constraint::Percentage(65)]
        } else {
            [Constraint::Percentage(28), Constraint::Percentage(72)]
        })
        .split(area);

    let pickers = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(45),
            Constraint::Min(3),
        ])
        .split(columns[0]);

    let selection = &state.selection;
    let subscription_labels: Vec<String> = selection
        .subscriptions
        .iter()
        .map(|s| if compact { s.name.clone() } else { format!("{} ({})", s.name, s.id) })
        .collect();
    let chosen_subscription = selection
        .subscription
        .as_deref()
        .and_then(|id| selection.subscriptions.iter().position(|s| s.id == id));
    let subscriptions = List::new(picker_items(
        &subscription_labels,
        state.subscription_cursor,
        chosen_subscription,
    ))
    .block(focus_block("Subscription", state.focus == Focus::Subscriptions));
    f.render_widget(subscriptions, pickers[0]);

    let groups = group_options(state);
    let chosen_group = match selection.resource_group.as_deref() {
        None => Some(0),
        Some(name) => groups.iter().position(|g| g == name),
    };
    let group_list = List::new(picker_items(&groups, state.group_cursor, chosen_group))
        .block(focus_block("Resource Group", state.focus == Focus::ResourceGroups));
    f.render_widget(group_list, pickers[1]);

    let window = Paragraph::new(format!(
        "From: {}  To: {}",
        selection.range.from_label(),
        selection.range.to_label()
    ))
    .block(Block::default().borders(Borders::ALL).title(" Window "));
    f.render_widget(window, pickers[2]);

    render_chart(f, columns[1], state);
}

fn render_chart(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let title = match state.selection.subscription_name() {
        Some(name) => format!("Cost By Resource Group · {name}"),
        None => "Cost By Resource Group".to_string(),
    };
    let block = focus_block(&title, state.focus == Focus::Chart);
    let costs = &state.selection.costs;
    if costs.is_empty() || state.costs_loading {
        let hint = if state.costs_loading {
            "Fetching cost data..."
        } else if state.selection.subscription.is_some() {
            "Press 'f' to fetch cost data."
        } else {
            "Select a subscription, then press 'f' to fetch cost data."
        };
        f.render_widget(
            Paragraph::new(hint)
                .style(Style::default().fg(COLOR_MUTED))
                .block(block),
            area,
        );
        return;
    }

    let bars: Vec<Bar> = costs
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let style = if idx == state.bar_selected && state.focus == Focus::Chart {
                Style::default().fg(COLOR_ACCENT)
            } else {
                Style::default().fg(COLOR_BAR)
            };
            Bar::default()
                .value(record.pre_tax_cost.max(0.0).round() as u64)
                .text_value(format!("{} {}", state.currency, format_cost(Some(record.pre_tax_cost))))
                .label(Line::from(record.resource_group_name.clone()))
                .style(style)
        })
        .collect();

    let chart = BarChart::default()
        .block(block)
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(1)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(chart, area);
}

fn render_detail(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let Some(detail) = state.detail.as_ref() else {
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(4)])
        .split(area);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("Resources in RG: {}", detail.target.resource_group),
            Style::default().fg(COLOR_HEADER).add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("From: {} → To: {}", detail.target.from, detail.target.to)),
    ];
    if let Some(error) = &detail.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    } else if detail.loading {
        lines.push(Line::from(Span::styled(
            "loading...",
            Style::default().fg(COLOR_MUTED),
        )));
    }
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::LEFT | Borders::RIGHT)),
        sections[0],
    );

    let rows = detail
        .rows(&state.currency)
        .into_iter()
        .skip(detail.scroll)
        .map(|(name, cost)| Row::new(vec![Cell::from(name), Cell::from(cost)]))
        .collect::<Vec<_>>();
    let table = Table::new(rows, [Constraint::Percentage(70), Constraint::Percentage(30)])
        .header(
            Row::new(vec!["Resource Name", "Cost"]).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Subscription {} ", detail.target.subscription)),
        );
    f.render_widget(table, sections[1]);
}

fn footer_text(state: &AppState) -> &'static str {
    match state.screen {
        Screen::Dashboard if !state.signed_in() => "l sign in | z compact | q quit",
        Screen::Dashboard => {
            "Tab focus | Up/Down move | Enter select/drill down | f fetch cost | d dates | r reload | o sign out | q quit"
        }
        Screen::ResourceDetail => "Up/Down scroll | r reload | Esc back",
        Screen::DateForm => "Tab switch field | YYYY-MM-DD | Enter apply | Esc cancel",
        Screen::Confirm(_) => "Left/Right choose | Enter confirm | Esc cancel",
        Screen::ErrorDialog => "Enter/Esc close",
        Screen::InfoDialog => "Enter/Esc close",
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn form_line(label: &str, value: &str, active: bool) -> Line<'static> {
    let prefix = if active { "> " } else { "  " };
    let style = if active {
        Style::default()
            .fg(COLOR_ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::styled(prefix.to_string(), style),
        Span::styled(format!("{label}: {value}"), style),
    ])
}

fn render_date_form(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(50, 30, f.area());
    f.render_widget(Clear, area);
    let draft = &state.date_draft;
    let content = Paragraph::new(vec![
        form_line("From", &draft.from, draft.active_field == 0),
        form_line("To", &draft.to, draft.active_field == 1),
        Line::from(""),
        Line::from(Span::styled(
            "Dates are inclusive, format YYYY-MM-DD",
            Style::default().fg(COLOR_MUTED),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Date Range "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(content, area);
}

fn render_confirm(f: &mut ratatui::Frame, state: &AppState, action: &ConfirmAction) {
    let area = centered_rect(56, 34, f.area());
    f.render_widget(Clear, area);

    let (title, message, consequence) = match action {
        ConfirmAction::Quit => (
            "Confirm Quit",
            "Do you want to exit costboard?",
            "Consequence: closes TUI and returns to shell.",
        ),
        ConfirmAction::Logout => (
            "Confirm Sign Out",
            "Sign out of this account?",
            "Consequence: cached sign-in is removed from the keychain.",
        ),
    };

    let cancel_style = if state.confirm_selected == 0 {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let confirm_style = if state.confirm_selected == 1 {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let content = Paragraph::new(vec![
        Line::from(message),
        Line::from(Span::styled(consequence, Style::default().fg(COLOR_MUTED))),
        Line::from(""),
        Line::from(vec![
            Span::styled("[Cancel (Esc)]", cancel_style),
            Span::raw("   "),
            Span::styled("[Confirm (Enter)]", confirm_style),
        ]),
        Line::from("Use Left/Right to choose"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", title)),
    )
    .alignment(Alignment::Center);

    f.render_widget(content, area);
}

fn render_error(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from(state.error_message.clone()),
        Line::from(""),
        Line::from("Press Enter or Esc"),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Error "))
    .style(Style::default().fg(Color::Red))
    .wrap(Wrap { trim: true });
    f.render_widget(content, area);
}

fn render_info(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(70, 38, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from(state.info_message.clone()),
        Line::from(""),
        Line::from("Press Enter or Esc"),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Sign In "))
    .style(Style::default().fg(Color::Yellow))
    .wrap(Wrap { trim: true });
    f.render_widget(content, area);
}
