use crate::error::ValidationError;
use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const TRIALS_MIN: u32 = 1;
pub const TRIALS_MAX: u32 = 10_000;
pub const DEFAULT_TRIALS: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(deserialize_with = "de_ranking")]
    pub ranking: u32,
}

/// Rankings come out of a dataframe upstream and are often serialized as `3.0`.
fn de_ranking<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = f64::deserialize(d)?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) {
        Ok(v as u32)
    } else {
        Err(D::Error::custom(format!("invalid ranking {v}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    #[serde(rename = "best3")]
    BestOf3,
    #[serde(rename = "best5")]
    BestOf5,
}

impl MatchFormat {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            MatchFormat::BestOf3 => "best3",
            MatchFormat::BestOf5 => "best5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchFormat::BestOf3 => "Best of 3",
            MatchFormat::BestOf5 => "Best of 5",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            MatchFormat::BestOf3 => MatchFormat::BestOf5,
            MatchFormat::BestOf5 => MatchFormat::BestOf3,
        }
    }
}

impl fmt::Display for MatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl FromStr for MatchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best3" | "bo3" | "3" => Ok(MatchFormat::BestOf3),
            "best5" | "bo5" | "5" => Ok(MatchFormat::BestOf5),
            other => Err(format!("unknown format {other:?} (expected best3 or best5)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Hard,
    Clay,
    Grass,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Hard, Surface::Clay, Surface::Grass];

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Hard => "hard",
            Surface::Clay => "clay",
            Surface::Grass => "grass",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hard" => Ok(Surface::Hard),
            "clay" => Ok(Surface::Clay),
            "grass" => Ok(Surface::Grass),
            other => Err(format!("unknown surface {other:?}")),
        }
    }
}

/// One validated simulation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    competitor_a: String,
    competitor_b: String,
    format: MatchFormat,
    surface: Option<Surface>,
    trials: u32,
}

impl RunRequest {
    pub fn new(
        competitor_a: impl Into<String>,
        competitor_b: impl Into<String>,
        format: MatchFormat,
        surface: Option<Surface>,
        trials: u32,
    ) -> Result<Self, ValidationError> {
        let competitor_a = competitor_a.into();
        let competitor_b = competitor_b.into();
        if competitor_a.is_empty() || competitor_b.is_empty() {
            return Err(ValidationError::MissingSelection);
        }
        if competitor_a == competitor_b {
            return Err(ValidationError::SamePlayer);
        }
        if !(TRIALS_MIN..=TRIALS_MAX).contains(&trials) {
            return Err(ValidationError::TrialsOutOfRange {
                min: TRIALS_MIN,
                max: TRIALS_MAX,
            });
        }
        Ok(Self {
            competitor_a,
            competitor_b,
            format,
            surface,
            trials,
        })
    }

    pub fn competitor_a(&self) -> &str {
        &self.competitor_a
    }

    pub fn competitor_b(&self) -> &str {
        &self.competitor_b
    }

    pub fn format(&self) -> MatchFormat {
        self.format
    }

    /// `None` means every surface.
    pub fn surface(&self) -> Option<Surface> {
        self.surface
    }

    pub fn trials(&self) -> u32 {
        self.trials
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub completed: u64,
    pub total: u64,
    pub percent: f64,
}

/// Correlation id attached to a dispatched request and echoed back by servers that support it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        let mut b = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut b);
        JobId(format!("{:016x}", u64::from_le_bytes(b)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSimulation {
    pub player1: String,
    pub player2: String,
    pub format: MatchFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<Surface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    pub job_id: JobId,
}

impl StartSimulation {
    pub fn new(request: &RunRequest, job_id: JobId) -> Self {
        Self {
            player1: request.competitor_a().to_string(),
            player2: request.competitor_b().to_string(),
            format: request.format(),
            surface: request.surface(),
            num_simulations: Some(request.trials()),
            job_id,
        }
    }
}

/// Events sent from the client to the simulation server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    StartSimulation(StartSimulation),
}

/// Events pushed by the simulation server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        #[serde(default)]
        status: String,
    },
    SimulationStarted {
        #[serde(default)]
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    SimulationProgress {
        completed: u64,
        total: u64,
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    // Box to keep ServerEvent small; the completion payload carries maps per surface.
    SimulationComplete(Box<CompletionPayload>),
    SimulationError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::SimulationStarted { .. } => "simulation_started",
            ServerEvent::SimulationProgress { .. } => "simulation_progress",
            ServerEvent::SimulationComplete(_) => "simulation_complete",
            ServerEvent::SimulationError { .. } => "simulation_error",
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            ServerEvent::Connected { .. } => None,
            ServerEvent::SimulationStarted { job_id, .. }
            | ServerEvent::SimulationProgress { job_id, .. }
            | ServerEvent::SimulationError { job_id, .. } => job_id.as_ref(),
            ServerEvent::SimulationComplete(p) => p.job_id.as_ref(),
        }
    }
}

/// Per-player parameter values keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerParameters {
    #[serde(default)]
    pub player1: BTreeMap<String, f64>,
    #[serde(default)]
    pub player2: BTreeMap<String, f64>,
}

/// Raw results for one surface as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfacePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player1_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2_name: Option<String>,
    #[serde(default)]
    pub player1_wins: Option<u32>,
    #[serde(default)]
    pub player2_wins: Option<u32>,
    #[serde(default)]
    pub player1_win_pct: Option<f64>,
    #[serde(default)]
    pub player2_win_pct: Option<f64>,
    #[serde(default)]
    pub total_simulations: Option<u32>,
    #[serde(default)]
    pub set_distributions: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_parameters: Option<PlayerParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_stats: Option<PlayerParameters>,
}

/// `simulation_complete` body: either flat single-surface fields or a `surfaces` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player1_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surfaces: Option<BTreeMap<String, SurfacePayload>>,
    #[serde(flatten)]
    pub aggregate: SurfacePayload,
}
