use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Gauge, Paragraph, Row, Table},
    Frame,
};

use crate::results::{ParameterValue, Performance, Results, SurfaceResults};

fn performance_color(p: Performance) -> Color {
    match p {
        Performance::Better => Color::Green,
        Performance::Worse => Color::Red,
        Performance::Similar => Color::Yellow,
        Performance::Unknown => Color::DarkGray,
    }
}

fn pct(x: Option<f64>) -> String {
    x.map(|v| format!("{:.1}", v * 100.0))
        .unwrap_or_else(|| "-".into())
}

/// Win share of competitor A as a split gauge.
pub fn draw_win_split(f: &mut Frame, area: Rect, res: &Results, s: &SurfaceResults) {
    let label = format!(
        "{} {:.1}% ({} of {})  |  {} {:.1}% ({} of {})",
        res.competitor_a,
        s.win_pct_a * 100.0,
        s.wins_a,
        s.total_trials,
        res.competitor_b,
        s.win_pct_b * 100.0,
        s.wins_b,
        s.total_trials
    );
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Win probability"))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Blue))
        .ratio(s.win_pct_a.clamp(0.0, 1.0))
        .label(label);
    f.render_widget(g, area);
}

/// Set-score distribution, one bar per label in lexicographic order.
pub fn draw_histogram(f: &mut Frame, area: Rect, s: &SurfaceResults) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Set scores (matches)");
    if s.set_score_histogram.is_empty() {
        f.render_widget(Paragraph::new("No set-score data").block(block), area);
        return;
    }

    let n = s.set_score_histogram.len();
    let inner_width = area.width.saturating_sub(2) as usize;
    let bar_width = ((inner_width / n.max(1)).saturating_sub(1)).clamp(3, 12) as u16;
    let max = s.set_score_histogram.values().copied().max().unwrap_or(0).max(1);

    let bars: Vec<Bar> = s
        .set_score_histogram
        .iter()
        .map(|(label, count)| {
            let share = s.set_score_share(label).unwrap_or(0.0) * 100.0;
            Bar::default()
                .value(*count)
                .label(Line::from(label.clone()))
                .text_value(format!("{share:.0}%"))
                .style(Style::default().fg(Color::Cyan))
        })
        .collect();

    let chart = BarChart::default()
        .block(block)
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1)
        .max(max);
    f.render_widget(chart, area);
}

fn value_cells(v: &ParameterValue) -> [Cell<'static>; 3] {
    let color = performance_color(v.performance);
    let diff = v
        .diff
        .map(|d| format!("{:+.1}", d * 100.0))
        .unwrap_or_else(|| "-".into());
    [
        Cell::from(format!("{} / {}", pct(v.expected), pct(v.observed))),
        Cell::from(diff).style(Style::default().fg(color)),
        Cell::from(v.performance.label()).style(Style::default().fg(color)),
    ]
}

/// Expected vs observed parameters for both competitors.
pub fn draw_parameter_table(f: &mut Frame, area: Rect, res: &Results, s: &SurfaceResults) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Parameters: expected / observed (%)");
    if s.parameter_table.is_empty() {
        f.render_widget(
            Paragraph::new("No parameter data for this surface").block(block),
            area,
        );
        return;
    }

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let header = Row::new(vec![
        Cell::from("Parameter"),
        Cell::from(res.competitor_a.clone()),
        Cell::from("diff"),
        Cell::from(""),
        Cell::from(res.competitor_b.clone()),
        Cell::from("diff"),
        Cell::from(""),
    ])
    .style(bold);

    let rows = s.parameter_table.iter().map(|row| {
        let mut cells = vec![Cell::from(row.label.clone())];
        cells.extend(value_cells(&row.a));
        cells.extend(value_cells(&row.b));
        Row::new(cells)
    });

    let widths = [
        Constraint::Length(24),
        Constraint::Length(13),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(13),
        Constraint::Length(6),
        Constraint::Length(8),
    ];
    let table = Table::new(rows, widths).header(header).block(block);
    f.render_widget(table, area);
}

/// One surface of a completed run: split gauge, histogram and parameter table.
pub fn draw_surface(f: &mut Frame, area: Rect, res: &Results, s: &SurfaceResults) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(8)].as_ref())
        .split(area);
    draw_win_split(f, rows[0], res, s);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(rows[1]);
    draw_histogram(f, body[0], s);
    draw_parameter_table(f, body[1], res, s);
}

pub fn warning_lines(warnings: &[String]) -> Vec<Line<'_>> {
    warnings
        .iter()
        .map(|w| {
            Line::from(vec![
                Span::styled("! ", Style::default().fg(Color::Yellow)),
                Span::raw(w.as_str()),
            ])
        })
        .collect()
}
