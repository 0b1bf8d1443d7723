mod charts;
mod help;
mod state;

use crate::channel::{self, ChannelTasks};
use crate::cli::{build_config, Cli};
use crate::config::ClientConfig;
use crate::error::FailureKind;
use crate::form::Reason;
use crate::model::{ClientEvent, ServerEvent};
use crate::roster::{RosterCache, RosterState};
use crate::session::{self, Effect, Session, SessionState, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{Focus, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

struct Link {
    inbound: UnboundedReceiver<ServerEvent>,
    outbound: UnboundedSender<ClientEvent>,
    tasks: Option<ChannelTasks>,
    status: String,
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (update_tx, update_rx) = mpsc::unbounded_channel::<Effect>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (roster_tx, roster_rx) = mpsc::unbounded_channel::<RosterState>();
    let (retry_tx, retry_rx) = mpsc::unbounded_channel::<()>();

    let roster_task = tokio::spawn(roster_service(cfg.clone(), retry_rx, roster_tx));
    let link = open_link(&cfg).await;

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let status = link.status;
    let ui_handle =
        std::thread::spawn(move || run_threaded(status, update_rx, roster_rx, cmd_tx, retry_tx));

    let res = session::run_controller(Session::new(), link.inbound, link.outbound, cmd_rx, update_tx)
        .await;

    roster_task.abort();
    if let Some(tasks) = link.tasks {
        tasks.shutdown();
    }

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res.map(|_| ())
}

/// Open the streaming channel. Without a server the UI still starts; the
/// controller then sees a closed channel and any submit fails.
async fn open_link(cfg: &ClientConfig) -> Link {
    match channel::connect(&cfg.stream_addr).await {
        Ok(handle) => {
            let (inbound, outbound, tasks) = handle.into_parts();
            Link {
                inbound,
                outbound,
                tasks: Some(tasks),
                status: format!("Channel open to {}", cfg.stream_addr),
            }
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "starting without a simulation channel");
            let (_, inbound) = mpsc::unbounded_channel::<ServerEvent>();
            let (outbound, _) = mpsc::unbounded_channel::<ClientEvent>();
            Link {
                inbound,
                outbound,
                tasks: None,
                status: format!("Not connected: {e:#}"),
            }
        }
    }
}

/// Owns the roster cache; loads once, then reloads only when asked.
async fn roster_service(
    cfg: ClientConfig,
    mut retry_rx: UnboundedReceiver<()>,
    tx: UnboundedSender<RosterState>,
) {
    let mut cache = RosterCache::new();
    let _ = cache.load(&cfg).await;
    if tx.send(cache.state().clone()).is_err() {
        return;
    }
    while retry_rx.recv().await.is_some() {
        if cache.is_ready() {
            continue;
        }
        let _ = tx.send(RosterState::Pending);
        let _ = cache.retry(&cfg).await;
        if tx.send(cache.state().clone()).is_err() {
            break;
        }
    }
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    connection: String,
    mut update_rx: UnboundedReceiver<Effect>,
    mut roster_rx: UnboundedReceiver<RosterState>,
    cmd_tx: UnboundedSender<UiCommand>,
    retry_tx: UnboundedSender<()>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState {
        connection,
        info: "Loading players...".into(),
        ..Default::default()
    };

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(rs) = roster_rx.try_recv() {
            state.apply_roster(rs);
        }
        while let Ok(ev) = update_rx.try_recv() {
            state.apply_update(ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = if state.tab == 1 { 0 } else { 1 };
                    }
                    (_, KeyCode::Tab) => state.toggle_focus(),
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.move_cursor(-1),
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.move_cursor(1),
                    (_, KeyCode::Char('f')) => state.toggle_format(),
                    (_, KeyCode::Char('s')) => state.cycle_surface(),
                    (_, KeyCode::Char('+')) | (_, KeyCode::Char('=')) => state.adjust_trials(true),
                    (_, KeyCode::Char('-')) => state.adjust_trials(false),
                    (_, KeyCode::Enter) => {
                        if let Some(cmd) = state.submit_command() {
                            let _ = cmd_tx.send(cmd);
                        }
                    }
                    (_, KeyCode::Char('x')) => {
                        if state.session_state == SessionState::Running {
                            let _ = cmd_tx.send(UiCommand::Abandon);
                        } else {
                            state.info = "No simulation is running".into();
                        }
                    }
                    (_, KeyCode::Char('r')) => {
                        if state.session_state.is_terminal() {
                            let _ = cmd_tx.send(UiCommand::Reset);
                        } else if state.session_state == SessionState::Running {
                            state.info = "Simulation still running (x to abandon)".into();
                        }
                    }
                    (_, KeyCode::Char('l')) => {
                        if state.roster.failure().is_some() {
                            let _ = retry_tx.send(());
                        } else if state.roster.is_ready() {
                            state.info = "Players already loaded".into();
                        }
                    }
                    (_, KeyCode::Left) => state.cycle_surface_tab(false),
                    (_, KeyCode::Right) => state.cycle_surface_tab(true),
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(4),
            ]
            .as_ref(),
        )
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Simulate"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("matchsim"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_main(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
    draw_status(chunks[2], f, state);
}

fn draw_main(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(38), Constraint::Percentage(62)].as_ref())
        .split(area);
    draw_form(cols[0], f, state);
    draw_session(cols[1], f, state);
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(7)].as_ref())
        .split(area);
    let lists = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(rows[0]);
    draw_player_list(lists[0], f, state, Focus::PlayerA);
    draw_player_list(lists[1], f, state, Focus::PlayerB);

    let form = &state.form;
    let dim = Style::default().fg(Color::DarkGray);
    let value_style = if state.form_locked {
        dim
    } else {
        Style::default().fg(Color::Cyan)
    };
    let surface = form.surface.map(|s| s.as_str()).unwrap_or("any");

    let reason = state.eligibility_reason();
    let button = if reason == Reason::None {
        Line::from(vec![
            Span::styled("[enter] ", Style::default().fg(Color::Magenta)),
            Span::styled(
                reason.message(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ])
    } else {
        Line::from(Span::styled(reason.message(), dim))
    };

    let lines = vec![
        Line::from(vec![
            Span::raw("Format:      "),
            Span::styled(form.format.label(), value_style),
        ]),
        Line::from(vec![
            Span::raw("Surface:     "),
            Span::styled(surface, value_style),
        ]),
        Line::from(vec![
            Span::raw("Simulations: "),
            Span::styled(form.trials().to_string(), value_style),
        ]),
        Line::from(""),
        button,
    ];
    let title = if state.form_locked {
        "Match (locked)"
    } else {
        "Match"
    };
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        rows[1],
    );
}

fn draw_player_list(area: Rect, f: &mut ratatui::Frame, state: &UiState, which: Focus) {
    let (label, selected, cursor) = match which {
        Focus::PlayerA => ("Player 1", state.form.player_a(), state.cursor_a),
        Focus::PlayerB => ("Player 2", state.form.player_b(), state.cursor_b),
    };
    let title = match selected {
        Some(name) => format!("{label}: {name}"),
        None => label.to_string(),
    };
    let border = if state.focus == which && !state.form_locked {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(title);

    if let Some(err) = state.roster.failure() {
        let p = Paragraph::new(vec![
            Line::from(Span::styled(err.to_string(), Style::default().fg(Color::Red))),
            Line::from(""),
            Line::from("Press l to retry"),
        ])
        .wrap(Wrap { trim: true })
        .block(block);
        f.render_widget(p, area);
        return;
    }
    if !state.roster.is_ready() {
        f.render_widget(Paragraph::new("Loading players...").block(block), area);
        return;
    }

    let items: Vec<ListItem> = state
        .roster
        .competitors()
        .iter()
        .map(|c| ListItem::new(format!("{:>3} {}", c.ranking, c.name)))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut ls = ListState::default();
    ls.select(cursor);
    f.render_stateful_widget(list, area, &mut ls);
}

fn draw_session(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let advisory_height = if state.advisories.is_empty() {
        0
    } else {
        (state.advisories.len() as u16 + 2).min(8)
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(advisory_height)].as_ref())
        .split(area);

    match state.session_state {
        SessionState::Idle => {
            let p = Paragraph::new(vec![
                Line::from("Pick two players and press enter to simulate."),
                Line::from(""),
                Line::from(Span::styled(
                    "Press ? for all keys.",
                    Style::default().fg(Color::DarkGray),
                )),
            ])
            .block(Block::default().borders(Borders::ALL).title("Results"));
            f.render_widget(p, rows[0]);
        }
        SessionState::Running => draw_progress(rows[0], f, state),
        SessionState::Completed => draw_results(rows[0], f, state),
        SessionState::Failed => draw_failure(rows[0], f, state),
    }

    if !state.advisories.is_empty() {
        let p = Paragraph::new(charts::warning_lines(&state.advisories))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Warnings"));
        f.render_widget(p, rows[1]);
    }
}

fn draw_progress(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let (ratio, label) = match &state.progress {
        Some(p) => (
            (p.percent / 100.0).clamp(0.0, 1.0),
            format!("{} ({:.1}%)", p.completed_of, p.percent),
        ),
        None => (0.0, "waiting for server".to_string()),
    };
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Simulating..."))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(label);
    f.render_widget(g, rows[0]);

    let mut lines = Vec::new();
    if let Some(p) = &state.progress {
        if let Some(tp) = p.throughput {
            lines.push(Line::from(vec![
                Span::raw("Throughput: "),
                Span::styled(format!("{tp:.1} matches/s"), Style::default().fg(Color::Cyan)),
            ]));
        }
        if let Some(eta) = p.eta_label.as_deref() {
            lines.push(Line::from(vec![
                Span::raw("Remaining:  "),
                Span::styled(eta.to_string(), Style::default().fg(Color::Cyan)),
            ]));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press x to abandon",
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL)),
        rows[1],
    );
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let Some(res) = state.result.as_ref() else {
        f.render_widget(
            Paragraph::new("Waiting for results...")
                .block(Block::default().borders(Borders::ALL).title("Results")),
            area,
        );
        return;
    };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let titles: Vec<Line> = res
        .surfaces
        .keys()
        .map(|k| Line::from(k.as_str().to_uppercase()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(state.surface_tab)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "{} vs {} ({})",
            res.competitor_a,
            res.competitor_b,
            res.format.label()
        )))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, rows[0]);

    if let Some((_, surface)) = state.selected_surface() {
        charts::draw_surface(f, rows[1], res, surface);
    }
}

fn draw_failure(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let (title, message) = match &state.failure {
        Some(failure) => (
            match failure.kind {
                FailureKind::RemoteSimulation => "Simulation failed",
                FailureKind::DataIntegrity => "Invalid results from server",
                FailureKind::Abandoned => "Abandoned",
            }
            .to_string(),
            failure.message.clone(),
        ),
        None => ("Failed".to_string(), String::new()),
    };
    let p = Paragraph::new(vec![
        Line::from(Span::styled(message, Style::default().fg(Color::Red))),
        Line::from(""),
        Line::from("Press r to reset"),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let p = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.info.as_str()),
        ]),
        Line::from(vec![
            Span::styled("Server: ", Style::default().fg(Color::Gray)),
            Span::raw(state.connection.as_str()),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}
