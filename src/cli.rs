use crate::channel;
use crate::config::{ClientConfig, DEFAULT_SERVER, DEFAULT_STREAM};
use crate::form::FormSelection;
use crate::logging::{self, LogTarget};
use crate::model::{MatchFormat, RunRequest, Surface, DEFAULT_TRIALS};
use crate::progress::DisplayProgress;
use crate::results::Results;
use crate::roster::RosterCache;
use crate::session::{run_controller, Effect, Session, SessionState, UiCommand};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "matchsim",
    version,
    about = "Client for a remote Monte-Carlo tennis match simulator, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the simulation server (roster endpoint)
    #[arg(long, env = "MATCHSIM_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Address of the streaming simulation channel
    #[arg(long, env = "MATCHSIM_STREAM", default_value = DEFAULT_STREAM)]
    pub stream: String,

    /// Timeout for the roster request
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// First player (headless modes)
    #[arg(long)]
    pub player1: Option<String>,

    /// Second player (headless modes)
    #[arg(long)]
    pub player2: Option<String>,

    /// Match format: best3 or best5
    #[arg(long, default_value = "best3")]
    pub format: MatchFormat,

    /// Restrict the run to one surface: hard, clay or grass
    #[arg(long)]
    pub surface: Option<Surface>,

    /// Number of simulated matches (1-10000)
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    pub trials: u32,

    /// Print JSON result and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Print the roster and exit
    #[arg(long, conflicts_with_all = ["json", "text"])]
    pub list_players: bool,

    /// Log level (e.g. debug) or a full filter directive; overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write logs to a file in TUI mode; without a value uses the cache directory
    #[arg(long, num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.json || self.text || self.list_players || !cfg!(feature = "tui")
    }

    fn log_target_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(Some(p)) => Some(p.clone()),
            Some(None) => logging::default_log_path(),
            None => None,
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let log_path = args.log_target_path();
    let target = if args.is_headless() {
        match log_path.as_deref() {
            Some(p) => LogTarget::File(p),
            None => LogTarget::Stderr,
        }
    } else {
        match log_path.as_deref() {
            Some(p) => LogTarget::File(p),
            None => LogTarget::Off,
        }
    };
    logging::init(args.log_level.as_deref(), target)?;

    if args.list_players {
        return list_players(&args).await;
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(args, false).await;
        }
    }

    let json = args.json;
    run_headless(args, json).await
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.server.clone(),
        stream_addr: args.stream.clone(),
        request_timeout: Duration::from(args.request_timeout),
        ..ClientConfig::default()
    }
}

/// Validate the command-line selection the same way the form does.
pub fn request_from_args(args: &Cli, roster: &RosterCache) -> Result<RunRequest> {
    let (Some(a), Some(b)) = (args.player1.as_deref(), args.player2.as_deref()) else {
        anyhow::bail!("--player1 and --player2 are required with --text or --json");
    };
    let mut form = FormSelection::default();
    form.select_a(roster, a)
        .with_context(|| format!("{a:?} (see --list-players)"))?;
    form.select_b(roster, b)
        .with_context(|| format!("{b:?} (see --list-players)"))?;
    form.set_format(args.format);
    form.set_surface(args.surface);
    form.set_trials(args.trials)?;
    if let Some(e) = form.eligibility(SessionState::Idle).reason.as_error() {
        return Err(e.into());
    }
    Ok(form.build_request()?)
}

async fn list_players(args: &Cli) -> Result<()> {
    let cfg = build_config(args);
    let mut roster = RosterCache::new();
    let players = roster
        .load(&cfg)
        .await
        .context("could not load the player roster")?;
    let (out_tx, out_handle) = spawn_output_writer();
    for p in players {
        let _ = out_tx.send(OutputLine::Stdout(format!("{:>4}. {}", p.ranking, p.name)));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Run one simulation without the TUI. `json` selects the output format.
async fn run_headless(args: Cli, json: bool) -> Result<()> {
    let cfg = build_config(&args);
    let mut roster = RosterCache::new();
    roster
        .load(&cfg)
        .await
        .context("could not load the player roster")?;
    let request = request_from_args(&args, &roster)?;

    let (out_tx, out_handle) = spawn_output_writer();
    let outcome = simulate(&cfg, request, (!json).then_some(&out_tx)).await;

    let result = match outcome {
        Ok(res) => res,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    if json {
        let out = serde_json::to_string_pretty(result.as_ref())?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&result);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Connect, submit one request and wait for its terminal effect.
async fn simulate(
    cfg: &ClientConfig,
    request: RunRequest,
    progress_out: Option<&mpsc::UnboundedSender<OutputLine>>,
) -> Result<Arc<Results>> {
    let (inbound, outbound, tasks) = channel::connect(&cfg.stream_addr).await?.into_parts();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (upd_tx, mut upd_rx) = mpsc::unbounded_channel::<Effect>();
    let ctrl = tokio::spawn(run_controller(Session::new(), inbound, outbound, cmd_rx, upd_tx));

    cmd_tx
        .send(UiCommand::Submit(request))
        .map_err(|_| anyhow::anyhow!("session controller is not running"))?;

    let say = |msg: String| {
        if let Some(tx) = progress_out {
            let _ = tx.send(OutputLine::Stderr(msg));
        }
    };

    let outcome = loop {
        tokio::select! {
            upd = upd_rx.recv() => match upd {
                Some(Effect::Progress(p)) => say(progress_line(&p)),
                Some(Effect::Info(msg)) => say(msg),
                Some(Effect::Completed(res)) => break Ok(res),
                Some(Effect::Failed(f)) => break Err(anyhow::anyhow!(f)),
                Some(Effect::Rejected(reason)) => break Err(anyhow::anyhow!(reason.message())),
                Some(_) => {}
                None => break Err(anyhow::anyhow!("session controller stopped unexpectedly")),
            },
            _ = tokio::signal::ctrl_c() => {
                say("Interrupted; abandoning simulation".to_string());
                let _ = cmd_tx.send(UiCommand::Abandon);
            }
        }
    };

    let _ = cmd_tx.send(UiCommand::Quit);
    match ctrl.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(error = %format!("{e:#}"), "session controller failed"),
        Err(e) => tracing::warn!(error = %e, "session controller task failed"),
    }
    tasks.shutdown();
    outcome
}

fn progress_line(p: &DisplayProgress) -> String {
    let mut line = format!("Simulating: {} ({:.1}%)", p.completed_of, p.percent);
    if let Some(tp) = p.throughput {
        line.push_str(&format!(", {tp:.1} matches/s"));
    }
    if let Some(eta) = p.eta_label.as_deref() {
        line.push_str(&format!(", ETA {eta}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::model::Competitor;

    fn roster() -> RosterCache {
        let mut r = RosterCache::new();
        r.set_loaded(vec![
            Competitor {
                name: "Sinner".into(),
                ranking: 1,
            },
            Competitor {
                name: "Alcaraz".into(),
                ranking: 2,
            },
        ]);
        r
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("matchsim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_run_flags() {
        let cli = parse(&[
            "--text",
            "--player1",
            "Sinner",
            "--player2",
            "Alcaraz",
            "--format",
            "best5",
            "--surface",
            "clay",
            "--trials",
            "500",
            "--request-timeout",
            "3s",
            "--server",
            "http://sim:9000",
        ]);
        assert!(cli.is_headless());
        let cfg = build_config(&cli);
        assert_eq!(cfg.base_url, "http://sim:9000");
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));

        let req = request_from_args(&cli, &roster()).unwrap();
        assert_eq!(req.format(), MatchFormat::BestOf5);
        assert_eq!(req.surface(), Some(Surface::Clay));
        assert_eq!(req.trials(), 500);
    }

    #[test]
    fn rejects_bad_selections() {
        let same = parse(&["--json", "--player1", "Sinner", "--player2", "Sinner"]);
        let err = request_from_args(&same, &roster()).unwrap_err();
        assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::SamePlayer));

        let unknown = parse(&["--json", "--player1", "Federer", "--player2", "Sinner"]);
        let err = request_from_args(&unknown, &roster()).unwrap_err();
        assert_eq!(err.root_cause().to_string(), ValidationError::UnknownPlayer.to_string());

        let too_many = parse(&["--json", "--player1", "Sinner", "--player2", "Alcaraz", "--trials", "10001"]);
        assert!(request_from_args(&too_many, &roster()).is_err());

        assert!(request_from_args(&parse(&["--json"]), &roster()).is_err());
    }

    #[test]
    fn output_modes_conflict() {
        assert!(Cli::try_parse_from(["matchsim", "--json", "--text"]).is_err());
        assert!(Cli::try_parse_from(["matchsim", "--list-players", "--json"]).is_err());
    }

    #[test]
    fn log_file_flag_accepts_optional_path() {
        assert_eq!(parse(&[]).log_target_path(), None);
        assert_eq!(
            parse(&["--log-file", "/tmp/m.log"]).log_target_path(),
            Some(PathBuf::from("/tmp/m.log"))
        );
        assert!(parse(&["--log-file"]).log_file == Some(None));
    }

    #[test]
    fn progress_line_omits_unknown_rates() {
        let p = DisplayProgress::waiting(1000);
        assert_eq!(progress_line(&p), "Simulating: 0/1000 (0.0%)");
    }
}
