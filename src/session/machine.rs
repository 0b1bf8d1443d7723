//! Pure state machine for one simulation session.
//!
//! Inputs come from the user (submit/abandon/reset) and from the untrusted
//! server channel. Each input returns the effects the adapter must carry out;
//! out-of-state inputs are dropped and logged instead of raising.

use crate::error::{FailureKind, SessionFailure};
use crate::form::{self, Reason};
use crate::model::{
    ClientEvent, CompletionPayload, JobId, ProgressSample, RunRequest, ServerEvent, StartSimulation,
};
use crate::progress::{DisplayProgress, ProgressEstimator};
use crate::results::{self, Results};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Something the adapter has to do (or show) after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StateChanged(SessionState),
    /// Send this event over the channel; fire and forget.
    Dispatch(ClientEvent),
    FormLocked(bool),
    Progress(DisplayProgress),
    Completed(Arc<Results>),
    Failed(SessionFailure),
    /// Non-blocking messages for the user.
    Advisory(Vec<String>),
    Info(String),
    Rejected(Reason),
    Ignored {
        event: &'static str,
        state: SessionState,
    },
}

#[derive(Debug, Clone)]
pub enum SessionInput {
    Submit(RunRequest),
    Server(ServerEvent),
    Abandon,
    Reset,
}

pub struct Session {
    state: SessionState,
    request: Option<RunRequest>,
    job_id: Option<JobId>,
    estimator: Option<ProgressEstimator>,
    last_progress: Option<DisplayProgress>,
    result: Option<Arc<Results>>,
    error: Option<SessionFailure>,
    warnings: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            request: None,
            job_id: None,
            estimator: None,
            last_progress: None,
            result: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Present only while running.
    pub fn request(&self) -> Option<&RunRequest> {
        self.request.as_ref()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.estimator.as_ref().map(|e| e.started_at())
    }

    pub fn last_sample(&self) -> Option<&ProgressSample> {
        self.estimator.as_ref().and_then(|e| e.last_sample())
    }

    pub fn last_progress(&self) -> Option<&DisplayProgress> {
        self.last_progress.as_ref()
    }

    /// Present only when completed.
    pub fn result(&self) -> Option<&Arc<Results>> {
        self.result.as_ref()
    }

    /// Present only when failed.
    pub fn error(&self) -> Option<&SessionFailure> {
        self.error.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn apply(&mut self, input: SessionInput, now: Instant) -> Vec<Effect> {
        match input {
            SessionInput::Submit(req) => self.submit(req, now),
            SessionInput::Server(ev) => self.on_server_event(ev, now),
            SessionInput::Abandon => self.abandon(),
            SessionInput::Reset => self.reset(),
        }
    }

    pub fn submit(&mut self, request: RunRequest, now: Instant) -> Vec<Effect> {
        let check = form::evaluate(
            Some(request.competitor_a()),
            Some(request.competitor_b()),
            self.state,
        );
        match check.reason {
            Reason::None => {}
            Reason::Busy => return self.ignore("submit"),
            reason => {
                tracing::debug!(?reason, "submit rejected");
                return vec![Effect::Rejected(reason)];
            }
        }

        let job_id = JobId::generate();
        tracing::info!(
            %job_id,
            player1 = request.competitor_a(),
            player2 = request.competitor_b(),
            format = %request.format(),
            trials = request.trials(),
            "starting simulation"
        );
        let dispatch = ClientEvent::StartSimulation(StartSimulation::new(&request, job_id.clone()));
        let waiting = DisplayProgress::waiting(u64::from(request.trials()));

        self.state = SessionState::Running;
        self.estimator = Some(ProgressEstimator::new(now));
        self.request = Some(request);
        self.job_id = Some(job_id);
        self.result = None;
        self.error = None;
        self.warnings.clear();
        self.last_progress = Some(waiting.clone());

        vec![
            Effect::StateChanged(SessionState::Running),
            Effect::Dispatch(dispatch),
            Effect::FormLocked(true),
            Effect::Progress(waiting),
        ]
    }

    pub fn on_server_event(&mut self, ev: ServerEvent, now: Instant) -> Vec<Effect> {
        if let Some(id) = ev.job_id() {
            if self.job_id.as_ref() != Some(id) {
                tracing::debug!(event = ev.name(), job_id = %id, "dropping event for another job");
                return vec![Effect::Ignored {
                    event: ev.name(),
                    state: self.state,
                }];
            }
        }
        match ev {
            ServerEvent::Connected { status } => {
                tracing::info!(%status, "connected to simulation server");
                vec![Effect::Info(status)]
            }
            ServerEvent::SimulationStarted { status, .. } => self.started(status, now),
            ServerEvent::SimulationProgress {
                completed,
                total,
                progress,
                ..
            } => self.progress(
                ProgressSample {
                    completed,
                    total,
                    percent: progress,
                },
                now,
            ),
            ServerEvent::SimulationComplete(payload) => self.complete(&payload),
            ServerEvent::SimulationError { error, .. } => self.error_reported(error),
        }
    }

    pub fn started(&mut self, status: String, now: Instant) -> Vec<Effect> {
        if self.state != SessionState::Running {
            return self.ignore("simulation_started");
        }
        if let Some(est) = self.estimator.as_mut() {
            est.restart_clock(now);
        }
        let msg = if status.is_empty() {
            "Simulation started".to_string()
        } else {
            status
        };
        vec![Effect::Info(msg)]
    }

    pub fn progress(&mut self, sample: ProgressSample, now: Instant) -> Vec<Effect> {
        if self.state != SessionState::Running {
            return self.ignore("simulation_progress");
        }
        let Some(est) = self.estimator.as_mut() else {
            return self.ignore("simulation_progress");
        };
        match est.observe(sample, now) {
            Some(display) => {
                self.last_progress = Some(display.clone());
                vec![Effect::Progress(display)]
            }
            None => {
                tracing::debug!(completed = sample.completed, "dropping stale progress sample");
                vec![Effect::Ignored {
                    event: "simulation_progress",
                    state: self.state,
                }]
            }
        }
    }

    pub fn complete(&mut self, payload: &CompletionPayload) -> Vec<Effect> {
        if self.state != SessionState::Running {
            return self.ignore("simulation_complete");
        }
        let Some(request) = self.request.take() else {
            return self.ignore("simulation_complete");
        };
        match results::normalize(payload, &request) {
            Ok(res) => {
                let res = Arc::new(res);
                tracing::info!(
                    job_id = %self.job_id.as_ref().map(JobId::as_str).unwrap_or("-"),
                    surfaces = res.surfaces.len(),
                    "simulation complete"
                );
                self.state = SessionState::Completed;
                self.warnings = res.warnings.clone();
                self.result = Some(res.clone());
                let mut out = vec![
                    Effect::StateChanged(SessionState::Completed),
                    Effect::Completed(res),
                ];
                if !self.warnings.is_empty() {
                    out.push(Effect::Advisory(self.warnings.clone()));
                }
                out
            }
            Err(e) => {
                tracing::error!(
                    target: "matchsim_cli::integrity",
                    error = %e,
                    "completion payload violates the protocol contract"
                );
                self.fail(FailureKind::DataIntegrity, format!("Invalid simulation results: {e}"))
            }
        }
    }

    pub fn error_reported(&mut self, message: String) -> Vec<Effect> {
        if self.state != SessionState::Running {
            return self.ignore("simulation_error");
        }
        tracing::warn!(error = %message, "simulation failed on the server");
        self.fail(FailureKind::RemoteSimulation, message)
    }

    /// Give up on a run that has not finished. No cancel is sent to the server.
    pub fn abandon(&mut self) -> Vec<Effect> {
        if self.state != SessionState::Running {
            return self.ignore("abandon");
        }
        tracing::info!("simulation abandoned by user");
        self.fail(
            FailureKind::Abandoned,
            "Simulation abandoned before it finished".to_string(),
        )
    }

    pub fn reset(&mut self) -> Vec<Effect> {
        if !self.state.is_terminal() {
            return self.ignore("reset");
        }
        self.state = SessionState::Idle;
        self.request = None;
        self.job_id = None;
        self.estimator = None;
        self.last_progress = None;
        self.result = None;
        self.error = None;
        self.warnings.clear();
        vec![
            Effect::StateChanged(SessionState::Idle),
            Effect::FormLocked(false),
        ]
    }

    fn fail(&mut self, kind: FailureKind, message: String) -> Vec<Effect> {
        let failure = SessionFailure { kind, message };
        self.state = SessionState::Failed;
        self.request = None;
        self.result = None;
        self.error = Some(failure.clone());
        vec![
            Effect::StateChanged(SessionState::Failed),
            Effect::Failed(failure),
        ]
    }

    fn ignore(&self, event: &'static str) -> Vec<Effect> {
        tracing::debug!(event, state = ?self.state, "ignoring event not valid in current state");
        vec![Effect::Ignored {
            event,
            state: self.state,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchFormat, Surface};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn request() -> RunRequest {
        RunRequest::new("Sinner", "Alcaraz", MatchFormat::BestOf3, Some(Surface::Hard), 1000).unwrap()
    }

    fn payload(wins_a: u32, wins_b: u32) -> CompletionPayload {
        serde_json::from_value(serde_json::json!({
            "player1_wins": wins_a,
            "player2_wins": wins_b,
            "total_simulations": wins_a + wins_b,
            "set_distributions": {"2-0": wins_a, "0-2": wins_b},
            "fallback_warnings": ["Alcaraz using hard court data for hard surface"]
        }))
        .unwrap()
    }

    fn progress(completed: u64) -> ServerEvent {
        ServerEvent::SimulationProgress {
            completed,
            total: 1000,
            progress: completed as f64 / 10.0,
            job_id: None,
        }
    }

    fn running(t0: Instant) -> Session {
        let mut s = Session::new();
        s.submit(request(), t0);
        s
    }

    #[test]
    fn submit_enters_running_once() {
        let t0 = Instant::now();
        let mut s = Session::new();
        let fx = s.submit(request(), t0);
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(fx[0], Effect::StateChanged(SessionState::Running));
        assert_matches!(&fx[1], Effect::Dispatch(ClientEvent::StartSimulation(st)) if st.player1 == "Sinner");
        assert!(fx.contains(&Effect::FormLocked(true)));
        assert_eq!(s.started_at(), Some(t0));
        let job = s.job_id().cloned();

        let other = RunRequest::new("Djokovic", "Medvedev", MatchFormat::BestOf5, None, 10).unwrap();
        let fx = s.submit(other, t0 + Duration::from_secs(1));
        assert_matches!(fx.as_slice(), [Effect::Ignored { event: "submit", .. }]);
        assert_eq!(s.request(), Some(&request()));
        assert_eq!(s.job_id().cloned(), job);
        assert_eq!(s.started_at(), Some(t0));
    }

    #[test]
    fn progress_updates_without_state_change() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let fx = s.on_server_event(progress(250), t0 + Duration::from_secs(10));
        assert_eq!(s.state(), SessionState::Running);
        let [Effect::Progress(d)] = fx.as_slice() else {
            panic!("expected a single progress effect, got {fx:?}");
        };
        assert_eq!(d.eta_label.as_deref(), Some("30s"));
        assert_eq!(s.last_sample().map(|x| x.completed), Some(250));
    }

    #[test]
    fn events_while_idle_are_dropped() {
        let t0 = Instant::now();
        let mut s = Session::new();
        for ev in [
            progress(100),
            ServerEvent::SimulationComplete(Box::new(payload(6, 4))),
            ServerEvent::SimulationError {
                error: "boom".into(),
                job_id: None,
            },
        ] {
            let fx = s.on_server_event(ev, t0);
            assert_matches!(fx.as_slice(), [Effect::Ignored { state: SessionState::Idle, .. }]);
            assert_eq!(s.state(), SessionState::Idle);
        }
        assert!(s.result().is_none());
        assert!(s.error().is_none());
        assert!(s.last_sample().is_none());
    }

    #[test]
    fn completion_stores_result_and_warnings() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let fx = s.on_server_event(ServerEvent::SimulationComplete(Box::new(payload(600, 400))), t0);
        assert_eq!(s.state(), SessionState::Completed);
        assert!(s.request().is_none());
        assert_matches!(fx.last(), Some(Effect::Advisory(w)) if w.len() == 1);
        let res = s.result().unwrap();
        let hard = res.surfaces.values().next().unwrap();
        assert_eq!(hard.wins_a, 600);

        // a second terminal event is ignored
        let fx = s.on_server_event(
            ServerEvent::SimulationError {
                error: "late".into(),
                job_id: None,
            },
            t0,
        );
        assert_matches!(fx.as_slice(), [Effect::Ignored { .. }]);
        assert_eq!(s.state(), SessionState::Completed);
    }

    #[test]
    fn bad_payload_fails_with_integrity_error() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let mut p = payload(6, 4);
        p.aggregate.total_simulations = Some(0);
        s.on_server_event(ServerEvent::SimulationComplete(Box::new(p)), t0);
        assert_eq!(s.state(), SessionState::Failed);
        assert_eq!(s.error().map(|e| e.kind), Some(FailureKind::DataIntegrity));
        assert!(s.result().is_none());
    }

    #[test]
    fn remote_error_then_reset_restores_eligibility() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let before = form::evaluate(Some("Sinner"), Some("Alcaraz"), SessionState::Idle);

        s.on_server_event(
            ServerEvent::SimulationError {
                error: "Player Sinner not found in data".into(),
                job_id: None,
            },
            t0,
        );
        assert_eq!(s.state(), SessionState::Failed);
        assert_eq!(
            s.error().map(|e| (e.kind, e.message.as_str())),
            Some((FailureKind::RemoteSimulation, "Player Sinner not found in data"))
        );
        assert!(!form::evaluate(Some("Sinner"), Some("Alcaraz"), s.state()).eligible);

        let fx = s.reset();
        assert_eq!(fx, vec![Effect::StateChanged(SessionState::Idle), Effect::FormLocked(false)]);
        assert!(s.error().is_none());
        assert!(s.last_sample().is_none());
        assert!(s.job_id().is_none());
        assert_eq!(form::evaluate(Some("Sinner"), Some("Alcaraz"), s.state()), before);
    }

    #[test]
    fn reset_is_only_valid_from_terminal_states() {
        let t0 = Instant::now();
        let mut s = Session::new();
        assert_matches!(s.reset().as_slice(), [Effect::Ignored { event: "reset", .. }]);
        let mut s = running(t0);
        assert_matches!(s.reset().as_slice(), [Effect::Ignored { event: "reset", .. }]);
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn abandon_fails_the_run() {
        let t0 = Instant::now();
        let mut s = running(t0);
        s.abandon();
        assert_eq!(s.state(), SessionState::Failed);
        assert_eq!(s.error().map(|e| e.kind), Some(FailureKind::Abandoned));
        assert_matches!(Session::new().abandon().as_slice(), [Effect::Ignored { .. }]);
    }

    #[test]
    fn events_for_another_job_are_dropped() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let fx = s.on_server_event(
            ServerEvent::SimulationError {
                error: "old run".into(),
                job_id: Some(JobId::from("not-this-one")),
            },
            t0,
        );
        assert_matches!(fx.as_slice(), [Effect::Ignored { event: "simulation_error", .. }]);
        assert_eq!(s.state(), SessionState::Running);

        let id = s.job_id().cloned();
        let fx = s.on_server_event(
            ServerEvent::SimulationError {
                error: "real failure".into(),
                job_id: id,
            },
            t0,
        );
        assert_matches!(fx.last(), Some(Effect::Failed(_)));
    }

    #[test]
    fn started_reanchors_clock_before_first_sample() {
        let t0 = Instant::now();
        let mut s = running(t0);
        let t1 = t0 + Duration::from_secs(3);
        s.on_server_event(
            ServerEvent::SimulationStarted {
                status: String::new(),
                job_id: None,
            },
            t1,
        );
        assert_eq!(s.started_at(), Some(t1));
    }
}
