//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]).
//!
//! ## For contributors
//!
//! * The layout is a listing on the left, the selected record's payload on
//!   the right, and a one-line status bar at the bottom.
//! * Colours and styles are defined inline.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::present::{format_timestamp, DisplayModel, EMPTY_MESSAGE};

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
            .areas(main_area);

    draw_record_list(app, frame, list_area);
    draw_detail(app, frame, detail_area);
    draw_status_bar(app, frame, status_area);
}

/// Render the scrollable record listing.
fn draw_record_list(app: &mut App, frame: &mut Frame, area: Rect) {
    let list_items: Vec<ListItem> = app
        .records
        .iter()
        .map(|record| {
            let line = Line::from(vec![
                Span::styled(
                    format!("{:<20}", format_timestamp(record.retrieved_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(" "),
                Span::styled(&record.key, Style::default().fg(Color::White)),
                Span::raw("  "),
                Span::styled(record.id.to_string(), Style::default().fg(Color::Cyan)),
            ]);
            ListItem::new(line)
        })
        .collect();

    let list = List::new(list_items)
        .block(Block::default().title(" API Data ").borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

/// Render the selected record: key as title, payload as body, retrieval
/// time at the bottom.
fn draw_detail(app: &App, frame: &mut Frame, area: Rect) {
    let paragraph = match app.selected().map(DisplayModel::from) {
        Some(model) => {
            let mut lines: Vec<Line> = model
                .payload
                .lines()
                .map(|l| Line::raw(l.to_string()))
                .collect();
            lines.push(Line::raw(""));
            lines.push(Line::from(vec![
                Span::styled("Date Retrieved: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(model.retrieved_at),
            ]));
            Paragraph::new(lines).block(
                Block::default()
                    .title(format!(" {} ", model.key))
                    .borders(Borders::ALL),
            )
        }
        None => Paragraph::new(EMPTY_MESSAGE)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL)),
    };

    frame.render_widget(paragraph.wrap(Wrap { trim: false }), area);
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let next = app
        .next_run
        .map(|at| format!("next fetch {}", format_timestamp(at)))
        .unwrap_or_else(|| "not scheduled".into());

    let status = Paragraph::new(Line::from(vec![
        Span::styled(" ", Style::default()),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(
            format!("{} records", app.records.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(next, Style::default().fg(Color::Cyan)),
        Span::raw("  q: quit  f: fetch  r: reload  ↑/↓: scroll"),
    ]));
    frame.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::make_record;
    use chrono::{TimeZone, Utc};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn screen_text(app: &mut App) -> String {
        let backend = TestBackend::new(100, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(app, f)).unwrap();
        let buf = terminal.backend().buffer().clone();
        buf.content()
            .iter()
            .map(|c| c.symbol().chars().next().unwrap_or(' '))
            .collect()
    }

    #[test]
    fn draw_with_no_records_shows_empty_state() {
        let mut app = App::new();
        let text = screen_text(&mut app);
        assert!(text.contains("No data available."));
        assert!(text.contains("0 records"));
        assert!(text.contains("not scheduled"));
    }

    #[test]
    fn draw_with_records_shows_selected_payload() {
        let mut app = App::new();
        let mut record = make_record(1, "BPI", Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap());
        record.payload = "{\n    \"rate\": \"50000\"\n}".into();
        app.set_records(vec![record]);
        app.status = "OK".into();

        let text = screen_text(&mut app);
        assert!(text.contains(" BPI "), "detail title is the key");
        assert!(text.contains("\"rate\": \"50000\""));
        assert!(text.contains("Date Retrieved:"));
        assert!(text.contains("1 records"));
    }

    #[test]
    fn status_bar_shows_next_run() {
        let mut app = App::new();
        app.next_run = Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap());
        let text = screen_text(&mut app);
        assert!(text.contains("next fetch"));
    }
}
