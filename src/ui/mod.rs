use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use time::{macros::format_description, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{
    AppState, EditorMode, EditorOverlay, FocusPane, LoginField, LoginForm, Overlay,
};
use crate::highlight::{build_highlight_regex, split_matches};
use crate::model::{status_health, StatusHealth, TrackedItem};
use crate::view::{parse_timestamp, ListEntry};

const CHAPTER_WIDTH: usize = 12;
const UPDATED_WIDTH: usize = 17;
const BADGE_WIDTH: usize = 5;

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    show_sidebar: bool,
    list_state: &mut ListState,
    sidebar_state: &mut ListState,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(4),
        ])
        .split(frame.size());

    frame.render_widget(build_filter_bar(state), vertical[0]);

    let body = if show_sidebar {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(vertical[1])
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(100)])
            .split(vertical[1])
    };

    draw_grid(frame, state, body[0], list_state);
    if show_sidebar {
        draw_sidebar(frame, state, body[1], sidebar_state);
    }

    let status = Paragraph::new(build_status_line(state))
        .block(Block::default().borders(Borders::TOP))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, vertical[2]);

    render_overlay(frame, state);
}

fn focus_style(state: &AppState, pane: FocusPane) -> Style {
    if state.focus == pane && state.overlay().is_none() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn build_filter_bar(state: &AppState) -> Paragraph<'static> {
    let selection = state.selection();
    let label_style = Style::default().fg(Color::Gray);
    let value_style = Style::default().add_modifier(Modifier::BOLD);

    let search_value = if state.search_query().is_empty() && !state.is_search_active() {
        Span::styled("(none)", Style::default().fg(Color::DarkGray))
    } else {
        let mut text = state.search_query().to_string();
        if state.is_search_active() {
            text.push('▏');
        }
        Span::styled(text, value_style.fg(Color::Yellow))
    };

    let mut spans = vec![
        Span::styled("Search: ", label_style),
        search_value,
        Span::raw("   "),
        Span::styled("Title: ", label_style),
        Span::styled(selection.alphabet.label().to_string(), value_style),
        Span::raw("   "),
        Span::styled("Date: ", label_style),
        Span::styled(selection.date.label().to_string(), value_style),
        Span::raw("   "),
        Span::styled(
            format!("{}/{} shown", state.entries().len(), state.items().len()),
            label_style,
        ),
    ];
    let fresh = state.new_chapter_count();
    if fresh > 0 {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("{fresh} new"),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let border = if state.is_search_active() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .title("MangaTrack")
            .borders(Borders::ALL)
            .border_style(border),
    )
}

fn draw_grid(frame: &mut Frame, state: &AppState, area: Rect, list_state: &mut ListState) {
    let regex = build_highlight_regex(state.search_query());
    // borders + highlight symbol + status dot
    let fixed = 2 + 2 + 2 + CHAPTER_WIDTH + UPDATED_WIDTH + BADGE_WIDTH + 3;
    let title_width = (area.width as usize).saturating_sub(fixed).max(8);

    let mut items: Vec<ListItem> = state
        .entries()
        .iter()
        .map(|entry| ListItem::new(grid_line(entry, regex.as_ref(), title_width)))
        .collect();
    if items.is_empty() {
        let message = if state.is_loading() {
            "Loading tracked titles…"
        } else if state.items().is_empty() {
            "Nothing tracked yet. Press `e` then `a` to add a link."
        } else {
            "No titles match the current search."
        };
        items.push(ListItem::new(message));
    }

    let title = if state.from_cache {
        "Tracked titles (cached)"
    } else {
        "Tracked titles"
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(focus_style(state, FocusPane::Grid)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn grid_line(entry: &ListEntry, regex: Option<&Regex>, title_width: usize) -> Line<'static> {
    let item = &entry.item;
    let mut spans = vec![status_dot(item.status.as_str())];

    let title = fit_width(&item.title, title_width);
    let padding = title_width.saturating_sub(title.width());
    spans.extend(highlight_spans(
        &title,
        regex,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    ));
    spans.push(Span::raw(" ".repeat(padding + 1)));

    spans.push(Span::styled(
        pad(&chapter_label(item), CHAPTER_WIDTH),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        pad(&format_updated(&item.last_updated), UPDATED_WIDTH),
        Style::default().fg(Color::Gray),
    ));
    spans.push(Span::raw(" "));
    if entry.is_new {
        spans.push(Span::styled(
            " NEW ",
            Style::default()
                .bg(Color::Green)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ));
    }
    Line::from(spans)
}

fn chapter_label(item: &TrackedItem) -> String {
    let chapter = item.chapter_number.trim();
    if chapter.is_empty() {
        "Ch. ?".to_string()
    } else {
        fit_width(&format!("Ch. {chapter}"), CHAPTER_WIDTH)
    }
}

fn format_updated(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(parsed) => format_time_short(parsed),
        None if raw.trim().is_empty() => "never".to_string(),
        None => fit_width(raw.trim(), UPDATED_WIDTH),
    }
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

fn status_color(raw: &str) -> Color {
    match status_health(raw) {
        StatusHealth::Up => Color::Green,
        StatusHealth::Down => Color::Red,
        StatusHealth::Unknown => Color::Gray,
    }
}

fn status_dot(raw: &str) -> Span<'static> {
    Span::styled("● ", Style::default().fg(status_color(raw)))
}

fn highlight_spans(text: &str, regex: Option<&Regex>, highlight_style: Style) -> Vec<Span<'static>> {
    split_matches(text, regex)
        .into_iter()
        .map(|(segment, matched)| {
            let style = if matched {
                highlight_style
            } else {
                Style::default()
            };
            Span::styled(segment.to_string(), style)
        })
        .collect()
}

fn draw_sidebar(frame: &mut Frame, state: &AppState, area: Rect, sidebar_state: &mut ListState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    let width = (area.width as usize).saturating_sub(6).max(4);

    let mut bookmarks: Vec<ListItem> = state
        .bookmarks
        .iter()
        .map(|bookmark| {
            ListItem::new(Line::from(vec![
                status_dot(&bookmark.status),
                Span::raw(fit_width(&bookmark.title, width)),
            ]))
        })
        .collect();
    if bookmarks.is_empty() {
        bookmarks.push(ListItem::new(Span::styled(
            "No bookmarks",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let list = List::new(bookmarks)
        .block(
            Block::default()
                .title("Bookmarks")
                .borders(Borders::ALL)
                .border_style(focus_style(state, FocusPane::Sidebar)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_stateful_widget(list, sections[0], sidebar_state);

    let mut lines: Vec<Line> = state
        .websites
        .iter()
        .map(|site| {
            Line::from(vec![
                status_dot(&site.status),
                Span::raw(fit_width(&site.title, width)),
            ])
        })
        .collect();
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No site list loaded",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let websites = Paragraph::new(Text::from(lines))
        .block(Block::default().title("Supported sites").borders(Borders::ALL));
    frame.render_widget(websites, sections[1]);
}

fn build_status_line(state: &AppState) -> Text<'static> {
    let mut spans = Vec::new();
    let sync_label = if state.is_loading() {
        ("Syncing…".to_string(), Color::Yellow)
    } else {
        match (state.last_synced, state.from_cache) {
            (Some(at), true) => (format!("Cached {}", format_time_short(at)), Color::Yellow),
            (Some(at), false) => (format!("Synced {}", format_time_short(at)), Color::Green),
            (None, _) => ("Not synced".to_string(), Color::DarkGray),
        }
    };
    spans.push(Span::styled(sync_label.0, Style::default().fg(sync_label.1)));
    if let Some(user) = &state.username {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            format!("@{user}"),
            Style::default().fg(Color::Magenta),
        ));
    }
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }

    let keys = Line::from(vec![
        Span::styled(
            "Keys: ",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            "j/k move • / search • s title order • d date order • e edit • Ctrl-r reload • R re-scrape • Tab focus • q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    Text::from(vec![Line::from(spans), keys])
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        Some(Overlay::Editor(editor)) => render_editor(frame, editor),
        Some(Overlay::Login(form)) => render_login(frame, form),
        None => {}
    }
}

fn render_editor(frame: &mut Frame, editor: &EditorOverlay) {
    let area = centered_rect(70, 70, frame.size());
    frame.render_widget(Clear, area);

    let title = if editor.draft.is_dirty() {
        format!(
            "Edit tracked titles* (+{} / -{})",
            editor.draft.pending_additions().len(),
            editor.draft.pending_deletions().len()
        )
    } else {
        "Edit tracked titles".to_string()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(inner);

    let width = (sections[0].width as usize).saturating_sub(6).max(8);
    let rows: Vec<ListItem> = editor
        .draft
        .items()
        .map(|item| {
            let (marker, style) = if item.is_draft_only() {
                ("+ ", Style::default().fg(Color::Green))
            } else if item.is_deleted() {
                (
                    "- ",
                    Style::default()
                        .fg(Color::Red)
                        .add_modifier(Modifier::CROSSED_OUT),
                )
            } else {
                ("  ", Style::default())
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, style),
                Span::styled(fit_width(&item.title, width / 2), style),
                Span::raw("  "),
                Span::styled(
                    fit_width(&item.link, width / 2),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();
    let mut list_state = ListState::default();
    if !editor.draft.is_empty() {
        list_state.select(Some(editor.draft.selected_index()));
    }
    let list = List::new(rows)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, sections[0], &mut list_state);

    let mut footer = Vec::with_capacity(2);
    match editor.mode {
        EditorMode::AddLink => footer.push(Line::from(vec![
            Span::styled("Link: ", Style::default().fg(Color::Gray)),
            Span::styled(format!("{}▏", editor.input), Style::default().fg(Color::Yellow)),
        ])),
        EditorMode::Browse if editor.submitting => footer.push(Line::from(Span::styled(
            "Saving…",
            Style::default().fg(Color::Yellow),
        ))),
        EditorMode::Browse => footer.push(Line::from(Span::styled(
            "a add • x/Space delete • u restore all • Enter save • Esc discard",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    if let Some(error) = &editor.error {
        footer.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    frame.render_widget(
        Paragraph::new(Text::from(footer))
            .block(Block::default().borders(Borders::TOP))
            .wrap(Wrap { trim: true }),
        sections[1],
    );
}

fn render_login(frame: &mut Frame, form: &LoginForm) {
    let area = centered_rect(50, 45, frame.size());
    frame.render_widget(Clear, area);

    let field_line = |label: &str, value: String, field: LoginField| {
        let active = form.field == field;
        let value_style = if active {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let cursor = if active { "▏" } else { "" };
        Line::from(vec![
            Span::styled(format!("{label:<10}"), Style::default().fg(Color::Gray)),
            Span::styled(format!("{value}{cursor}"), value_style),
        ])
    };

    let mut lines = vec![
        field_line("Username", form.username.clone(), LoginField::Username),
        field_line(
            "Password",
            "*".repeat(form.password.graphemes(true).count()),
            LoginField::Password,
        ),
    ];
    if form.register {
        lines.push(field_line("Email", form.email.clone(), LoginField::Email));
    }
    lines.push(Line::from(""));
    if form.submitting {
        lines.push(Line::from(Span::styled(
            "Contacting backend…",
            Style::default().fg(Color::Yellow),
        )));
    } else if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    let switch_hint = if form.register {
        "Ctrl-n back to login"
    } else {
        "Ctrl-n create account"
    };
    lines.push(Line::from(Span::styled(
        format!("Tab next field • Enter submit • {switch_hint} • Esc close"),
        Style::default().fg(Color::DarkGray),
    )));

    let title = if form.register { "Register" } else { "Log in" };
    let paragraph = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

/// Truncates to at most `width` display columns, marking the cut with `…`.
fn fit_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let grapheme_width = grapheme.width();
        if used + grapheme_width + 1 > width {
            break;
        }
        out.push_str(grapheme);
        used += grapheme_width;
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
