//! Session controller.
//!
//! Serializes UI commands and channel events into one loop, feeds them to the
//! state machine, performs dispatches and emits effects for presentation layers.

use super::machine::{Effect, Session, SessionInput, SessionState};
use crate::model::{ClientEvent, RunRequest, ServerEvent};
use anyhow::Result;
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Submit(RunRequest),
    Abandon,
    Reset,
    Quit,
}

/// Run the session until `Quit` (or the command channel closes) and hand the session back.
pub async fn run_controller(
    mut session: Session,
    mut inbound: UnboundedReceiver<ServerEvent>,
    outbound: UnboundedSender<ClientEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
    update_tx: UnboundedSender<Effect>,
) -> Result<Session> {
    let mut channel_open = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let input = match cmd {
                    Some(UiCommand::Submit(req)) => SessionInput::Submit(req),
                    Some(UiCommand::Abandon) => SessionInput::Abandon,
                    Some(UiCommand::Reset) => SessionInput::Reset,
                    Some(UiCommand::Quit) | None => break,
                };
                let effects = session.apply(input, Instant::now());
                execute(&mut session, effects, &outbound, &update_tx);
            }
            ev = inbound.recv(), if channel_open => {
                match ev {
                    Some(ev) => {
                        let effects = session.apply(SessionInput::Server(ev), Instant::now());
                        execute(&mut session, effects, &outbound, &update_tx);
                    }
                    None => {
                        // Without the channel a running job can never finish.
                        channel_open = false;
                        tracing::warn!("simulation channel closed");
                        let _ = update_tx.send(Effect::Info("Disconnected from simulation server".into()));
                        if session.state() == SessionState::Running {
                            let effects = session.error_reported(
                                "Connection to the simulation server was lost".into(),
                            );
                            execute(&mut session, effects, &outbound, &update_tx);
                        }
                    }
                }
            }
        }
    }

    Ok(session)
}

/// Carry out effects in order. A failed dispatch fails the session and replaces
/// whatever was still queued for the run.
fn execute(
    session: &mut Session,
    effects: Vec<Effect>,
    outbound: &UnboundedSender<ClientEvent>,
    update_tx: &UnboundedSender<Effect>,
) {
    let mut queue = VecDeque::from(effects);
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::Dispatch(ev) => {
                if outbound.send(ev).is_err() {
                    tracing::warn!("could not dispatch request: channel closed");
                    queue.clear();
                    queue.extend(
                        session.error_reported("Simulation server is not connected".into()),
                    );
                }
            }
            Effect::Ignored { .. } => {}
            other => {
                let _ = update_tx.send(other);
            }
        }
    }
}
