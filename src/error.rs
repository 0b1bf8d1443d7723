//! Error kinds surfaced by the session core.
//!
//! Validation problems are local and non-blocking; fetch, remote and integrity
//! failures are shown to the user and require an explicit action to recover.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roster endpoint could not produce a competitor list.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("roster request failed: {0}")]
    Transport(String),
    #[error("roster endpoint returned HTTP {status}")]
    Status { status: u16 },
    #[error("roster endpoint reported an error: {0}")]
    Server(String),
    #[error("roster response could not be decoded: {0}")]
    Decode(String),
}

/// Why the current form cannot be submitted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("select both players")]
    MissingSelection,
    #[error("select two different players")]
    SamePlayer,
    #[error("a simulation is already running")]
    Busy,
    #[error("number of simulations must be between {min} and {max}")]
    TrialsOutOfRange { min: u32, max: u32 },
    #[error("player is not in the roster")]
    UnknownPlayer,
}

/// A completion payload that contradicts the request or its own totals.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataIntegrityError {
    #[error("payload names {found_a:?} vs {found_b:?}, expected {expected_a:?} vs {expected_b:?}")]
    CompetitorMismatch {
        expected_a: String,
        expected_b: String,
        found_a: String,
        found_b: String,
    },
    #[error("surface {surface}: completed run reported zero trials")]
    ZeroTrials { surface: String },
    #[error("surface {surface}: wins {wins_a} + {wins_b} do not add up to {total} trials")]
    WinsMismatch {
        surface: String,
        wins_a: u32,
        wins_b: u32,
        total: u32,
    },
    #[error("surface {surface}: set-score counts sum to {sum}, expected {total}")]
    HistogramMismatch { surface: String, sum: u64, total: u32 },
    #[error("surface {surface}: set-score counts overflow")]
    HistogramOverflow { surface: String },
    #[error("surface {surface}: missing field {field}")]
    MissingField { surface: String, field: &'static str },
    #[error("unknown surface {0:?} in payload")]
    UnknownSurface(String),
    #[error("payload carries no surface results")]
    Empty,
}

/// Terminal failure categories for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The server reported that the simulation failed.
    RemoteSimulation,
    /// The completion payload violated the protocol contract.
    DataIntegrity,
    /// The user gave up on a run that never finished.
    Abandoned,
}

/// Error message plus its category, stored on a FAILED session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
