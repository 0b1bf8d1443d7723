//! Submit eligibility for the match form.

use crate::error::ValidationError;
use crate::model::{MatchFormat, RunRequest, Surface, DEFAULT_TRIALS, TRIALS_MAX, TRIALS_MIN};
use crate::roster::RosterCache;
use crate::session::SessionState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reason {
    None,
    MissingSelection,
    SamePlayer,
    Busy,
}

impl Reason {
    pub fn message(self) -> &'static str {
        match self {
            Reason::None => "Simulate match",
            Reason::MissingSelection => "Select both players",
            Reason::SamePlayer => "Please select different players",
            Reason::Busy => "Simulating...",
        }
    }

    pub fn as_error(self) -> Option<ValidationError> {
        match self {
            Reason::None => None,
            Reason::MissingSelection => Some(ValidationError::MissingSelection),
            Reason::SamePlayer => Some(ValidationError::SamePlayer),
            Reason::Busy => Some(ValidationError::Busy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Reason,
}

/// Eligible iff both players are chosen, they differ, and no session is in flight.
pub fn evaluate(a: Option<&str>, b: Option<&str>, state: SessionState) -> Eligibility {
    let reason = match (a.filter(|s| !s.is_empty()), b.filter(|s| !s.is_empty())) {
        (Some(a), Some(b)) if a == b => Reason::SamePlayer,
        (Some(_), Some(_)) if state != SessionState::Idle => Reason::Busy,
        (Some(_), Some(_)) => Reason::None,
        _ => Reason::MissingSelection,
    };
    Eligibility {
        eligible: reason == Reason::None,
        reason,
    }
}

/// Current form inputs. Players can only be picked from a loaded roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSelection {
    player_a: Option<String>,
    player_b: Option<String>,
    pub format: MatchFormat,
    pub surface: Option<Surface>,
    trials: u32,
}

impl Default for FormSelection {
    fn default() -> Self {
        Self {
            player_a: None,
            player_b: None,
            format: MatchFormat::BestOf3,
            surface: None,
            trials: DEFAULT_TRIALS,
        }
    }
}

impl FormSelection {
    pub fn player_a(&self) -> Option<&str> {
        self.player_a.as_deref()
    }

    pub fn player_b(&self) -> Option<&str> {
        self.player_b.as_deref()
    }

    pub fn trials(&self) -> u32 {
        self.trials
    }

    pub fn select_a(&mut self, roster: &RosterCache, name: &str) -> Result<(), ValidationError> {
        self.player_a = Some(checked_name(roster, name)?);
        Ok(())
    }

    pub fn select_b(&mut self, roster: &RosterCache, name: &str) -> Result<(), ValidationError> {
        self.player_b = Some(checked_name(roster, name)?);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.player_a = None;
        self.player_b = None;
    }

    pub fn set_format(&mut self, format: MatchFormat) {
        self.format = format;
    }

    pub fn set_surface(&mut self, surface: Option<Surface>) {
        self.surface = surface;
    }

    pub fn set_trials(&mut self, trials: u32) -> Result<(), ValidationError> {
        if !(TRIALS_MIN..=TRIALS_MAX).contains(&trials) {
            return Err(ValidationError::TrialsOutOfRange {
                min: TRIALS_MIN,
                max: TRIALS_MAX,
            });
        }
        self.trials = trials;
        Ok(())
    }

    pub fn eligibility(&self, state: SessionState) -> Eligibility {
        evaluate(self.player_a(), self.player_b(), state)
    }

    /// Snapshot the form into a fresh request.
    pub fn build_request(&self) -> Result<RunRequest, ValidationError> {
        let (Some(a), Some(b)) = (self.player_a.as_deref(), self.player_b.as_deref()) else {
            return Err(ValidationError::MissingSelection);
        };
        RunRequest::new(a, b, self.format, self.surface, self.trials)
    }
}

fn checked_name(roster: &RosterCache, name: &str) -> Result<String, ValidationError> {
    roster
        .find(name)
        .map(|c| c.name.clone())
        .ok_or(ValidationError::UnknownPlayer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
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

    #[test]
    fn evaluate_reasons() {
        use SessionState::*;
        assert_eq!(evaluate(None, Some("B"), Idle).reason, Reason::MissingSelection);
        assert_eq!(evaluate(Some(""), Some("B"), Idle).reason, Reason::MissingSelection);
        assert_eq!(evaluate(Some("A"), Some("A"), Idle).reason, Reason::SamePlayer);
        assert_eq!(evaluate(Some("A"), Some("B"), Running).reason, Reason::Busy);
        assert_eq!(evaluate(Some("A"), Some("B"), Completed).reason, Reason::Busy);
        let ok = evaluate(Some("A"), Some("B"), Idle);
        assert!(ok.eligible);
        assert_eq!(ok.reason, Reason::None);
    }

    #[test]
    fn selections_must_come_from_roster() {
        let r = roster();
        let mut form = FormSelection::default();
        assert_eq!(form.select_a(&r, "Federer"), Err(ValidationError::UnknownPlayer));
        form.select_a(&r, "Sinner").unwrap();
        form.select_b(&r, "Alcaraz").unwrap();
        assert!(form.eligibility(SessionState::Idle).eligible);
        let req = form.build_request().unwrap();
        assert_eq!(req.competitor_a(), "Sinner");
        assert_eq!(req.trials(), DEFAULT_TRIALS);
    }

    #[test]
    fn failed_roster_keeps_form_ineligible() {
        let mut r = RosterCache::new();
        r.set_failed(FetchError::Server("data files missing".into()));
        let mut form = FormSelection::default();
        assert!(form.select_a(&r, "Sinner").is_err());
        assert!(form.select_b(&r, "Alcaraz").is_err());
        assert_eq!(
            form.eligibility(SessionState::Idle).reason,
            Reason::MissingSelection
        );
    }

    #[test]
    fn trials_are_bounded() {
        let mut form = FormSelection::default();
        assert!(form.set_trials(0).is_err());
        assert!(form.set_trials(TRIALS_MAX + 1).is_err());
        form.set_trials(TRIALS_MAX).unwrap();
        assert_eq!(form.trials(), TRIALS_MAX);
    }
}
