//! Reshape a `simulation_complete` payload into per-surface comparison tables.

use crate::error::DataIntegrityError;
use crate::model::{CompletionPayload, MatchFormat, PlayerParameters, RunRequest, Surface, SurfacePayload};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Differences within this band (1 percentage point) count as unchanged.
pub const DEADBAND: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Performance {
    Better,
    Worse,
    Similar,
    Unknown,
}

impl Performance {
    pub fn label(self) -> &'static str {
        match self {
            Performance::Better => "better",
            Performance::Worse => "worse",
            Performance::Similar => "similar",
            Performance::Unknown => "n/a",
        }
    }
}

pub struct ParameterSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub direction: Direction,
}

/// Known simulation inputs, in display order.
pub const PARAMETER_CATALOG: &[ParameterSpec] = &[
    ParameterSpec {
        key: "first_serve_in_pct",
        label: "1st serve in",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "first_serve_win_pct",
        label: "1st serve points won",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "second_serve_in_pct",
        label: "2nd serve in",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "second_serve_win_pct",
        label: "2nd serve points won",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "vs_first_serve_win_pct",
        label: "Return vs 1st serve",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "vs_second_serve_win_pct",
        label: "Return vs 2nd serve",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "break_point_save_pct",
        label: "Break points saved",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "break_point_conversion_pct",
        label: "Break points converted",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "ace_pct",
        label: "Aces",
        direction: Direction::HigherIsBetter,
    },
    ParameterSpec {
        key: "double_fault_pct",
        label: "Double faults",
        direction: Direction::LowerIsBetter,
    },
];

pub fn lookup_parameter(key: &str) -> Option<&'static ParameterSpec> {
    PARAMETER_CATALOG.iter().find(|p| p.key == key)
}

/// Classify `observed` against `expected`; missing or non-finite values are `Unknown`.
pub fn classify(expected: Option<f64>, observed: Option<f64>, direction: Direction) -> Performance {
    match diff(expected, observed) {
        None => Performance::Unknown,
        Some(d) if d.abs() <= DEADBAND => Performance::Similar,
        Some(d) => {
            let improved = match direction {
                Direction::HigherIsBetter => d > 0.0,
                Direction::LowerIsBetter => d < 0.0,
            };
            if improved {
                Performance::Better
            } else {
                Performance::Worse
            }
        }
    }
}

fn diff(expected: Option<f64>, observed: Option<f64>) -> Option<f64> {
    let (e, o) = (expected?, observed?);
    (e.is_finite() && o.is_finite()).then(|| o - e)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterValue {
    pub expected: Option<f64>,
    pub observed: Option<f64>,
    pub diff: Option<f64>,
    pub performance: Performance,
}

impl ParameterValue {
    fn new(expected: Option<f64>, observed: Option<f64>, direction: Direction) -> Self {
        Self {
            expected,
            observed,
            diff: diff(expected, observed),
            performance: classify(expected, observed, direction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    pub key: String,
    pub label: String,
    pub direction: Direction,
    pub a: ParameterValue,
    pub b: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceResults {
    pub wins_a: u32,
    pub wins_b: u32,
    pub total_trials: u32,
    pub win_pct_a: f64,
    pub win_pct_b: f64,
    /// Set-score label ("2-1") to match count; iteration order is lexicographic.
    pub set_score_histogram: BTreeMap<String, u64>,
    pub parameter_table: Vec<ParameterRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SurfaceResults {
    /// Fraction of all trials that ended with `label`.
    pub fn set_score_share(&self, label: &str) -> Option<f64> {
        let count = *self.set_score_histogram.get(label)?;
        Some(count as f64 / f64::from(self.total_trials))
    }
}

/// Key for one entry of the results map. `Aggregate` covers an unscoped single-result run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SurfaceKey {
    Surface(Surface),
    Aggregate,
}

impl SurfaceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceKey::Surface(s) => s.as_str(),
            SurfaceKey::Aggregate => "all",
        }
    }
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SurfaceKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    pub competitor_a: String,
    pub competitor_b: String,
    pub format: MatchFormat,
    pub surfaces: BTreeMap<SurfaceKey, SurfaceResults>,
    /// Advisory messages (e.g. surface data substituted); never blocking.
    pub warnings: Vec<String>,
    pub completed_at_utc: String,
}

/// Build the normalized results for `request` from a completion payload.
pub fn normalize(payload: &CompletionPayload, request: &RunRequest) -> Result<Results, DataIntegrityError> {
    check_identity(
        request,
        payload.player1_name.as_deref(),
        payload.player2_name.as_deref(),
    )?;

    if let Some(n) = payload.num_simulations {
        if n != request.trials() {
            tracing::warn!(
                requested = request.trials(),
                reported = n,
                "server ran a different number of simulations than requested"
            );
        }
    }

    let mut warnings = Vec::new();
    push_unique(&mut warnings, &payload.fallback_warnings);

    let mut surfaces = BTreeMap::new();
    match payload.surfaces.as_ref().filter(|m| !m.is_empty()) {
        Some(per_surface) => {
            for (name, sp) in per_surface {
                let surface: Surface = name
                    .parse()
                    .map_err(|_| DataIntegrityError::UnknownSurface(name.clone()))?;
                check_identity(request, sp.player1_name.as_deref(), sp.player2_name.as_deref())?;
                let key = SurfaceKey::Surface(surface);
                let built = build_surface(key, sp)?;
                push_unique(&mut warnings, &built.warnings);
                surfaces.insert(key, built);
            }
        }
        None => {
            let sp = &payload.aggregate;
            if sp.player1_wins.is_none() && sp.player2_wins.is_none() {
                return Err(DataIntegrityError::Empty);
            }
            check_identity(request, sp.player1_name.as_deref(), sp.player2_name.as_deref())?;
            let key = request
                .surface()
                .map(SurfaceKey::Surface)
                .unwrap_or(SurfaceKey::Aggregate);
            let built = build_surface(key, sp)?;
            push_unique(&mut warnings, &built.warnings);
            surfaces.insert(key, built);
        }
    }

    Ok(Results {
        competitor_a: request.competitor_a().to_string(),
        competitor_b: request.competitor_b().to_string(),
        format: request.format(),
        surfaces,
        warnings,
        completed_at_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
    })
}

fn check_identity(
    request: &RunRequest,
    name_a: Option<&str>,
    name_b: Option<&str>,
) -> Result<(), DataIntegrityError> {
    let a_ok = name_a.map_or(true, |n| n == request.competitor_a());
    let b_ok = name_b.map_or(true, |n| n == request.competitor_b());
    if a_ok && b_ok {
        return Ok(());
    }
    Err(DataIntegrityError::CompetitorMismatch {
        expected_a: request.competitor_a().to_string(),
        expected_b: request.competitor_b().to_string(),
        found_a: name_a.unwrap_or("-").to_string(),
        found_b: name_b.unwrap_or("-").to_string(),
    })
}

fn build_surface(key: SurfaceKey, sp: &SurfacePayload) -> Result<SurfaceResults, DataIntegrityError> {
    let surface = key.as_str().to_string();
    let wins_a = sp.player1_wins.ok_or_else(|| DataIntegrityError::MissingField {
        surface: surface.clone(),
        field: "player1_wins",
    })?;
    let wins_b = sp.player2_wins.ok_or_else(|| DataIntegrityError::MissingField {
        surface: surface.clone(),
        field: "player2_wins",
    })?;
    let total = match sp.total_simulations {
        Some(t) => t,
        None => wins_a.saturating_add(wins_b),
    };
    if total == 0 {
        return Err(DataIntegrityError::ZeroTrials { surface });
    }
    if u64::from(wins_a) + u64::from(wins_b) != u64::from(total) {
        return Err(DataIntegrityError::WinsMismatch {
            surface,
            wins_a,
            wins_b,
            total,
        });
    }

    let histogram = sp
        .set_distributions
        .clone()
        .ok_or_else(|| DataIntegrityError::MissingField {
            surface: surface.clone(),
            field: "set_distributions",
        })?;
    let sum = histogram
        .values()
        .try_fold(0u64, |acc, &c| acc.checked_add(c))
        .ok_or_else(|| DataIntegrityError::HistogramOverflow {
            surface: surface.clone(),
        })?;
    if sum != u64::from(total) {
        return Err(DataIntegrityError::HistogramMismatch { surface, sum, total });
    }

    let total_f = f64::from(total);
    Ok(SurfaceResults {
        wins_a,
        wins_b,
        total_trials: total,
        win_pct_a: f64::from(wins_a) / total_f,
        win_pct_b: f64::from(wins_b) / total_f,
        set_score_histogram: histogram,
        parameter_table: parameter_table(sp.input_parameters.as_ref(), sp.observed_stats.as_ref()),
        warnings: sp.fallback_warnings.clone(),
    })
}

fn parameter_table(
    expected: Option<&PlayerParameters>,
    observed: Option<&PlayerParameters>,
) -> Vec<ParameterRow> {
    let mut keys = BTreeSet::new();
    for params in expected.into_iter().chain(observed) {
        keys.extend(params.player1.keys().map(String::as_str));
        keys.extend(params.player2.keys().map(String::as_str));
    }

    let value = |src: Option<&PlayerParameters>, player_a: bool, key: &str| {
        src.and_then(|p| {
            let side = if player_a { &p.player1 } else { &p.player2 };
            side.get(key).copied()
        })
    };
    let row = |key: &str, label: &str, direction: Direction| ParameterRow {
        key: key.to_string(),
        label: label.to_string(),
        direction,
        a: ParameterValue::new(value(expected, true, key), value(observed, true, key), direction),
        b: ParameterValue::new(value(expected, false, key), value(observed, false, key), direction),
    };

    let mut rows: Vec<ParameterRow> = PARAMETER_CATALOG
        .iter()
        .filter(|spec| keys.contains(spec.key))
        .map(|spec| row(spec.key, spec.label, spec.direction))
        .collect();
    rows.extend(
        keys.iter()
            .filter(|k| lookup_parameter(k).is_none())
            .map(|k| row(*k, *k, Direction::HigherIsBetter)),
    );
    rows
}

fn push_unique(out: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !item.trim().is_empty() && !out.contains(item) {
            out.push(item.clone());
        }
    }
}
