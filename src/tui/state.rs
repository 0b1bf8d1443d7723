use crate::error::SessionFailure;
use crate::form::{FormSelection, Reason};
use crate::model::{Surface, TRIALS_MAX, TRIALS_MIN};
use crate::progress::DisplayProgress;
use crate::results::{Results, SurfaceKey, SurfaceResults};
use crate::roster::{RosterCache, RosterState};
use crate::session::{Effect, SessionState, UiCommand};
use std::sync::Arc;

pub const TRIALS_STEP: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    PlayerA,
    PlayerB,
}

/// Everything the UI thread renders. Owned by the UI thread only.
pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub connection: String,

    pub roster: RosterCache,
    pub form: FormSelection,
    pub focus: Focus,
    pub cursor_a: Option<usize>,
    pub cursor_b: Option<usize>,

    // Mirrors of the controller's session, fed by effects.
    pub session_state: SessionState,
    pub form_locked: bool,
    pub progress: Option<DisplayProgress>,
    pub result: Option<Arc<Results>>,
    pub failure: Option<SessionFailure>,
    pub advisories: Vec<String>,
    pub surface_tab: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            info: String::new(),
            connection: "Connecting...".into(),
            roster: RosterCache::new(),
            form: FormSelection::default(),
            focus: Focus::PlayerA,
            cursor_a: None,
            cursor_b: None,
            session_state: SessionState::Idle,
            form_locked: false,
            progress: None,
            result: None,
            failure: None,
            advisories: Vec::new(),
            surface_tab: 0,
        }
    }
}

impl UiState {
    pub fn apply_update(&mut self, effect: Effect) {
        match effect {
            Effect::StateChanged(s) => {
                self.session_state = s;
                match s {
                    SessionState::Running => {
                        self.result = None;
                        self.failure = None;
                        self.advisories.clear();
                        self.surface_tab = 0;
                        self.info = "Simulation requested".into();
                    }
                    SessionState::Idle => {
                        self.progress = None;
                        self.result = None;
                        self.failure = None;
                        self.advisories.clear();
                        self.info = "Ready".into();
                    }
                    SessionState::Completed | SessionState::Failed => {}
                }
            }
            Effect::FormLocked(locked) => self.form_locked = locked,
            Effect::Progress(p) => self.progress = Some(p),
            Effect::Completed(res) => {
                self.info = "Simulation complete (r to reset)".into();
                self.result = Some(res);
            }
            Effect::Failed(f) => {
                self.info = "Simulation failed (r to reset)".into();
                self.failure = Some(f);
            }
            Effect::Advisory(w) => self.advisories = w,
            Effect::Info(msg) => {
                if msg.starts_with("Disconnected") || msg.starts_with("Connected") {
                    self.connection = msg.clone();
                }
                self.info = msg;
            }
            Effect::Rejected(reason) => self.info = reason.message().into(),
            Effect::Dispatch(_) | Effect::Ignored { .. } => {}
        }
    }

    pub fn apply_roster(&mut self, state: RosterState) {
        match state {
            RosterState::Pending => {
                self.roster = RosterCache::new();
                self.info = "Loading players...".into();
            }
            RosterState::Ready(players) => {
                self.info = format!("Loaded {} players", players.len());
                self.roster.set_loaded(players);
            }
            RosterState::Failed(e) => {
                self.info = format!("{e} (l to retry)");
                self.roster.set_failed(e);
            }
        }
        self.form.clear();
        self.cursor_a = None;
        self.cursor_b = None;
    }

    pub fn eligibility_reason(&self) -> Reason {
        self.form.eligibility(self.session_state).reason
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::PlayerA => Focus::PlayerB,
            Focus::PlayerB => Focus::PlayerA,
        };
    }

    /// Move the focused cursor and select the player under it.
    pub fn move_cursor(&mut self, delta: isize) {
        if self.form_locked {
            return;
        }
        let len = self.roster.competitors().len();
        if len == 0 {
            return;
        }
        let cursor = match self.focus {
            Focus::PlayerA => &mut self.cursor_a,
            Focus::PlayerB => &mut self.cursor_b,
        };
        let next = match *cursor {
            None => 0,
            Some(i) => (i as isize + delta).clamp(0, len as isize - 1) as usize,
        };
        *cursor = Some(next);

        let name = self.roster.competitors()[next].name.clone();
        let res = match self.focus {
            Focus::PlayerA => self.form.select_a(&self.roster, &name),
            Focus::PlayerB => self.form.select_b(&self.roster, &name),
        };
        if let Err(e) = res {
            self.info = e.to_string();
        }
    }

    pub fn toggle_format(&mut self) {
        if !self.form_locked {
            self.form.set_format(self.form.format.toggled());
        }
    }

    /// Any surface, then each surface in turn.
    pub fn cycle_surface(&mut self) {
        if self.form_locked {
            return;
        }
        let next = match self.form.surface {
            None => Some(Surface::ALL[0]),
            Some(s) => Surface::ALL
                .iter()
                .position(|x| *x == s)
                .and_then(|i| Surface::ALL.get(i + 1))
                .copied(),
        };
        self.form.set_surface(next);
    }

    pub fn adjust_trials(&mut self, up: bool) {
        if self.form_locked {
            return;
        }
        let cur = self.form.trials();
        let next = if up {
            cur.saturating_add(TRIALS_STEP).min(TRIALS_MAX)
        } else if cur <= TRIALS_STEP {
            TRIALS_MIN
        } else {
            cur - TRIALS_STEP
        };
        let _ = self.form.set_trials(next);
    }

    /// The submit command for the current form, or `None` with a reason in `info`.
    pub fn submit_command(&mut self) -> Option<UiCommand> {
        let reason = self.eligibility_reason();
        if reason != Reason::None {
            self.info = reason.message().into();
            return None;
        }
        match self.form.build_request() {
            Ok(req) => Some(UiCommand::Submit(req)),
            Err(e) => {
                self.info = e.to_string();
                None
            }
        }
    }

    pub fn cycle_surface_tab(&mut self, forward: bool) {
        let n = self.result.as_ref().map_or(0, |r| r.surfaces.len());
        if n == 0 {
            return;
        }
        self.surface_tab = if forward {
            (self.surface_tab + 1) % n
        } else {
            (self.surface_tab + n - 1) % n
        };
    }

    pub fn selected_surface(&self) -> Option<(SurfaceKey, &SurfaceResults)> {
        let res = self.result.as_ref()?;
        res.surfaces
            .iter()
            .nth(self.surface_tab)
            .map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureKind, FetchError};
    use crate::model::{Competitor, MatchFormat};
    use assert_matches::assert_matches;

    fn ready() -> UiState {
        let mut s = UiState::default();
        s.apply_roster(RosterState::Ready(vec![
            Competitor {
                name: "Sinner".into(),
                ranking: 1,
            },
            Competitor {
                name: "Alcaraz".into(),
                ranking: 2,
            },
            Competitor {
                name: "Zverev".into(),
                ranking: 3,
            },
        ]));
        s
    }

    #[test]
    fn cursor_selects_players() {
        let mut s = ready();
        assert_eq!(s.eligibility_reason(), Reason::MissingSelection);
        s.move_cursor(1);
        assert_eq!(s.form.player_a(), Some("Sinner"));
        s.toggle_focus();
        s.move_cursor(1);
        assert_eq!(s.eligibility_reason(), Reason::SamePlayer);
        s.move_cursor(5);
        assert_eq!(s.form.player_b(), Some("Zverev"));
        assert_eq!(s.eligibility_reason(), Reason::None);
        assert_matches!(s.submit_command(), Some(UiCommand::Submit(r)) if r.competitor_b() == "Zverev");
    }

    #[test]
    fn failed_roster_blocks_submit() {
        let mut s = UiState::default();
        s.apply_roster(RosterState::Failed(FetchError::Status { status: 500 }));
        assert!(s.info.contains("retry"));
        s.move_cursor(1);
        assert!(s.form.player_a().is_none());
        assert!(s.submit_command().is_none());
        assert_eq!(s.info, Reason::MissingSelection.message());
    }

    #[test]
    fn locked_form_ignores_edits() {
        let mut s = ready();
        s.apply_update(Effect::FormLocked(true));
        s.toggle_format();
        s.cycle_surface();
        s.adjust_trials(true);
        s.move_cursor(1);
        assert_eq!(s.form.format, MatchFormat::BestOf3);
        assert_eq!(s.form.surface, None);
        assert_eq!(s.form.trials(), crate::model::DEFAULT_TRIALS);
        assert!(s.form.player_a().is_none());
    }

    #[test]
    fn surface_cycles_through_any() {
        let mut s = ready();
        let mut seen = Vec::new();
        for _ in 0..4 {
            s.cycle_surface();
            seen.push(s.form.surface);
        }
        assert_eq!(
            seen,
            vec![Some(Surface::Hard), Some(Surface::Clay), Some(Surface::Grass), None]
        );
    }

    #[test]
    fn trials_stay_in_bounds() {
        let mut s = ready();
        for _ in 0..200 {
            s.adjust_trials(true);
        }
        assert_eq!(s.form.trials(), TRIALS_MAX);
        for _ in 0..200 {
            s.adjust_trials(false);
        }
        assert_eq!(s.form.trials(), TRIALS_MIN);
    }

    #[test]
    fn running_then_failed_then_reset() {
        let mut s = ready();
        s.apply_update(Effect::StateChanged(SessionState::Running));
        s.apply_update(Effect::Progress(DisplayProgress::waiting(1000)));
        s.apply_update(Effect::StateChanged(SessionState::Failed));
        s.apply_update(Effect::Failed(SessionFailure {
            kind: FailureKind::RemoteSimulation,
            message: "boom".into(),
        }));
        assert!(s.failure.is_some());
        assert_eq!(s.eligibility_reason(), Reason::Busy);
        s.apply_update(Effect::StateChanged(SessionState::Idle));
        assert!(s.failure.is_none());
        assert!(s.progress.is_none());
    }
}
