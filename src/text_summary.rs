//! Text summary builder for CLI output.

use crate::results::{ParameterValue, Results, SurfaceResults};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

pub fn build_text_summary(res: &Results) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} vs {} ({})",
        res.competitor_a,
        res.competitor_b,
        res.format.label()
    ));
    lines.push(format!("Completed: {}", res.completed_at_utc));

    for (key, surface) in &res.surfaces {
        lines.push(String::new());
        lines.push(format!("== {} ==", key.as_str().to_uppercase()));
        surface_lines(&mut lines, res, surface);
    }

    if !res.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        for w in &res.warnings {
            lines.push(format!("  ! {w}"));
        }
    }

    TextSummary { lines }
}

fn surface_lines(lines: &mut Vec<String>, res: &Results, s: &SurfaceResults) {
    let width = res.competitor_a.len().max(res.competitor_b.len());
    lines.push(format!(
        "{:<width$}  {:>5.1}%  ({} wins out of {})",
        res.competitor_a,
        s.win_pct_a * 100.0,
        s.wins_a,
        s.total_trials
    ));
    lines.push(format!(
        "{:<width$}  {:>5.1}%  ({} wins out of {})",
        res.competitor_b,
        s.win_pct_b * 100.0,
        s.wins_b,
        s.total_trials
    ));

    if !s.set_score_histogram.is_empty() {
        lines.push("Set scores:".to_string());
        for (label, count) in &s.set_score_histogram {
            let share = s.set_score_share(label).unwrap_or(0.0);
            lines.push(format!("  {label:<5} {count:>6} matches ({:.1}%)", share * 100.0));
        }
    }

    if !s.parameter_table.is_empty() {
        lines.push(format!(
            "Parameters (expected -> observed): {} | {}",
            res.competitor_a, res.competitor_b
        ));
        for row in &s.parameter_table {
            lines.push(format!(
                "  {:<24} {} | {}",
                row.label,
                value_cell(&row.a),
                value_cell(&row.b)
            ));
        }
    }
}

fn value_cell(v: &ParameterValue) -> String {
    let pct = |x: Option<f64>| match x {
        Some(x) => format!("{:.1}", x * 100.0),
        None => "-".to_string(),
    };
    let diff = match v.diff {
        Some(d) => format!(" ({:+.1})", d * 100.0),
        None => String::new(),
    };
    format!(
        "{} -> {}{} {}",
        pct(v.expected),
        pct(v.observed),
        diff,
        v.performance.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompletionPayload, MatchFormat, RunRequest, Surface};

    fn results() -> Results {
        let payload: CompletionPayload = serde_json::from_value(serde_json::json!({
            "player1_name": "Sinner",
            "player2_name": "Alcaraz",
            "fallback_warnings": ["Alcaraz using hard court data for grass surface"],
            "surfaces": {
                "grass": {
                    "player1_wins": 550,
                    "player2_wins": 450,
                    "total_simulations": 1000,
                    "set_distributions": {"2-0": 300, "2-1": 250, "1-2": 200, "0-2": 250},
                    "input_parameters": {
                        "player1": {"first_serve_in_pct": 0.65},
                        "player2": {"first_serve_in_pct": 0.6}
                    },
                    "observed_stats": {
                        "player1": {"first_serve_in_pct": 0.68},
                        "player2": {}
                    }
                }
            }
        }))
        .unwrap();
        let req = RunRequest::new("Sinner", "Alcaraz", MatchFormat::BestOf3, Some(Surface::Grass), 1000).unwrap();
        crate::results::normalize(&payload, &req).unwrap()
    }

    #[test]
    fn summary_lists_record_histogram_and_warnings() {
        let text = build_text_summary(&results()).lines.join("\n");
        assert!(text.contains("== GRASS =="));
        assert!(text.contains("550 wins out of 1000"));
        assert!(text.contains(" 55.0%"));
        assert!(text.contains("2-1      250 matches (25.0%)"));
        assert!(text.contains("65.0 -> 68.0 (+3.0) better"));
        assert!(text.contains("60.0 -> - n/a"));
        assert!(text.contains("! Alcaraz using hard court data for grass surface"));
    }
}
