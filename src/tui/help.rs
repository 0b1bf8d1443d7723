use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("q / Ctrl-C", "Quit"),
    ("tab", "Switch between player columns"),
    ("↑/↓ or j/k", "Choose player in the focused column"),
    ("f", "Toggle best-of-3 / best-of-5"),
    ("s", "Cycle surface (any, hard, clay, grass)"),
    ("+ / -", "More / fewer simulated matches"),
    ("enter", "Simulate match"),
    ("x", "Abandon running simulation"),
    ("r", "Reset after a finished or failed run"),
    ("l", "Retry loading players"),
    ("←/→", "Switch result surface"),
    ("?", "Toggle this help"),
];

fn key_line(key: &'static str, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYS.iter().map(|&(k, w)| key_line(k, w)));
    lines.push(Line::from(""));
    lines.push(Line::from(
        "The form stays locked while a simulation runs and until it is reset.",
    ));
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
