use ratatui::{
    Frame,
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
};

use crate::domain::mail::MailRecord;
use crate::push::state::ChannelState;
use crate::terminal::state::{AppState, Focus};

pub fn render(f: &mut Frame, state: &mut AppState) {
    let [top, bottom, footer] = Layout::vertical([
        Constraint::Percentage(55),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .areas(f.area());

    let table_border = if state.focus == Focus::Table {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let body_border = if state.focus == Focus::Body {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    // TOP: feed table
    let title = if state.loading {
        " Latest mail (loading…) ".to_string()
    } else {
        format!(" Latest mail ({}) ", state.records().len())
    };

    let header = Row::new(state.columns.columns().iter().enumerate().map(|(i, c)| {
        let style = if i == state.selected_column {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        Cell::from(c.title).style(style)
    }));

    let rows: Vec<Row> = state.records().iter().map(row).collect();
    let widths: Vec<Constraint> = state
        .columns
        .widths()
        .into_iter()
        .map(Constraint::Length)
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(table_border)),
        )
        .highlight_symbol("➜ ")
        .row_highlight_style(Style::default().fg(Color::Green));

    f.render_stateful_widget(table, top, &mut state.table_state);

    // BOTTOM: selected mail
    let body_block = Block::default()
        .title(" Mail ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(body_border));

    let width = bottom.width.saturating_sub(2) as usize;
    let body_text = match state.selected() {
        Some(r) => format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}",
            r.sender,
            r.recipient_email,
            r.display_subject(),
            r.content.plain_text(width)
        ),
        None => "No mail yet.\nNew mail appears here as soon as the backend pushes it.".to_string(),
    };

    let p = Paragraph::new(body_text)
        .block(body_block)
        .wrap(Wrap { trim: false })
        .scroll((state.body_scroll, 0));
    f.render_widget(p, bottom);

    // Footer
    let (dot, color) = match state.channel {
        ChannelState::Connected => ("● live", Color::Green),
        ChannelState::Connecting => ("◌ connecting", Color::Yellow),
        ChannelState::Disconnected => ("○ offline", Color::Red),
    };
    let mut spans = vec![
        Span::styled(dot, Style::default().fg(color)),
        Span::raw("  "),
    ];
    if let Some(s) = &state.status {
        spans.push(Span::styled(s.clone(), Style::default().fg(Color::Cyan)));
        spans.push(Span::raw("  "));
    }
    for (key, what) in [
        ("j/k", " move  "),
        ("h/l", " column  "),
        ("</>", " width  "),
        ("Tab", " focus  "),
        ("r", " reload  "),
        ("q", " quit"),
    ] {
        spans.push(Span::styled(key, Style::default().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(what));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), footer);
}

fn row(r: &MailRecord) -> Row<'static> {
    let when = r
        .received_at()
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_default();
    Row::new(vec![
        Cell::from(when),
        Cell::from(r.sender.clone()),
        Cell::from(r.display_subject().to_string()),
        Cell::from(r.recipient_email.clone()),
        Cell::from(if r.has_attachments { "📎" } else { "" }),
    ])
}
