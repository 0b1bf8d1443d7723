//! Live progress, throughput and ETA for a running simulation.
//!
//! The ETA is recomputed from scratch on every sample with no smoothing, so it
//! jumps around when the server delivers progress in bursts. That is accepted.

use crate::model::ProgressSample;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Read-only view of the latest sample, ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayProgress {
    pub percent: f64,
    pub completed: u64,
    pub total: u64,
    pub completed_of: String,
    /// Matches per second; `None` when it cannot be computed.
    pub throughput: Option<f64>,
    #[serde(with = "humantime_serde")]
    pub eta: Option<Duration>,
    pub eta_label: Option<String>,
}

impl DisplayProgress {
    /// Placeholder shown before the first sample arrives.
    pub fn waiting(total: u64) -> Self {
        Self {
            percent: 0.0,
            completed: 0,
            total,
            completed_of: format!("0/{total}"),
            throughput: None,
            eta: None,
            eta_label: None,
        }
    }
}

pub struct ProgressEstimator {
    started_at: Instant,
    last: Option<ProgressSample>,
}

impl ProgressEstimator {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            last: None,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn last_sample(&self) -> Option<&ProgressSample> {
        self.last.as_ref()
    }

    /// Move the clock origin, e.g. when the server confirms the job actually started.
    /// Ignored once a sample has been seen so throughput stays consistent.
    pub fn restart_clock(&mut self, now: Instant) -> bool {
        if self.last.is_some() {
            return false;
        }
        self.started_at = now;
        true
    }

    /// Fold a new sample in. Returns `None` for a sample whose `completed` went
    /// backwards, which can only be a stale event. A malformed sample is shown
    /// but never becomes the baseline for that check.
    pub fn observe(&mut self, sample: ProgressSample, now: Instant) -> Option<DisplayProgress> {
        if let Some(prev) = self.last.as_ref() {
            if sample.completed < prev.completed {
                return None;
            }
        }
        if !is_malformed(&sample) {
            self.last = Some(sample);
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        Some(estimate(&sample, elapsed))
    }
}

fn is_malformed(sample: &ProgressSample) -> bool {
    sample.total == 0 || sample.completed > sample.total
}

/// Pure estimate for one sample at a given elapsed time.
pub fn estimate(sample: &ProgressSample, elapsed: Duration) -> DisplayProgress {
    let percent = if sample.percent.is_finite() {
        sample.percent.clamp(0.0, 100.0)
    } else {
        0.0
    };

    let malformed = is_malformed(sample);
    let completed = sample.completed.min(sample.total);
    let secs = elapsed.as_secs_f64();
    let throughput = if malformed || sample.completed == 0 || secs <= 0.0 {
        None
    } else {
        Some(sample.completed as f64 / secs)
    };

    let eta = throughput.and_then(|tp| {
        let remaining = sample.total.saturating_sub(sample.completed) as f64;
        Duration::try_from_secs_f64(remaining / tp).ok()
    });

    DisplayProgress {
        percent,
        completed,
        total: sample.total,
        completed_of: format!("{completed}/{}", sample.total),
        throughput,
        eta,
        eta_label: eta.map(format_eta),
    }
}

/// `"42s"` under a minute, otherwise `"3m 7s"` (whole minutes, rounded seconds).
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs_f64();
    if secs < 60.0 {
        return format!("{}s", secs.round() as u64);
    }
    let mut minutes = (secs / 60.0).floor() as u64;
    let mut rest = (secs - minutes as f64 * 60.0).round() as u64;
    if rest == 60 {
        minutes += 1;
        rest = 0;
    }
    format!("{minutes}m {rest}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(completed: u64, total: u64, percent: f64) -> ProgressSample {
        ProgressSample {
            completed,
            total,
            percent,
        }
    }

    #[test]
    fn quarter_done_after_ten_seconds() {
        let d = estimate(&sample(250, 1000, 25.0), Duration::from_secs(10));
        assert_eq!(d.percent, 25.0);
        assert_eq!(d.completed_of, "250/1000");
        assert!((d.throughput.unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(d.eta, Some(Duration::from_secs(30)));
        assert_eq!(d.eta_label.as_deref(), Some("30s"));
    }

    #[test]
    fn nothing_completed_means_no_eta() {
        let d = estimate(&sample(0, 1000, 0.0), Duration::from_secs(5));
        assert!(d.throughput.is_none());
        assert!(d.eta.is_none());
        assert!(d.eta_label.is_none());
    }

    #[test]
    fn zero_elapsed_means_no_throughput() {
        let d = estimate(&sample(100, 1000, 10.0), Duration::ZERO);
        assert!(d.throughput.is_none());
        assert!(d.eta.is_none());
    }

    #[test]
    fn percent_comes_from_server_not_ratio() {
        let d = estimate(&sample(100, 1000, 17.5), Duration::from_secs(1));
        assert_eq!(d.percent, 17.5);
    }

    #[test]
    fn malformed_samples_are_clamped() {
        let d = estimate(&sample(10, 0, 140.0), Duration::from_secs(1));
        assert_eq!(d.percent, 100.0);
        assert!(d.throughput.is_none());
        assert!(d.eta.is_none());

        let d = estimate(&sample(1200, 1000, -3.0), Duration::from_secs(1));
        assert_eq!(d.percent, 0.0);
        assert!(d.throughput.is_none());
        assert_eq!(d.completed, 1000);
        assert_eq!(d.completed_of, "1000/1000");

        let d = estimate(&sample(5, 10, f64::NAN), Duration::from_secs(1));
        assert_eq!(d.percent, 0.0);
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(Duration::from_secs_f64(4.4)), "4s");
        assert_eq!(format_eta(Duration::from_secs(59)), "59s");
        assert_eq!(format_eta(Duration::from_secs(60)), "1m 0s");
        assert_eq!(format_eta(Duration::from_secs_f64(187.4)), "3m 7s");
        assert_eq!(format_eta(Duration::from_secs_f64(119.6)), "2m 0s");
    }

    #[test]
    fn regressing_sample_is_dropped() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(t0);
        assert!(est
            .observe(sample(300, 1000, 30.0), t0 + Duration::from_secs(3))
            .is_some());
        assert!(est
            .observe(sample(200, 1000, 20.0), t0 + Duration::from_secs(4))
            .is_none());
        assert_eq!(est.last_sample().map(|s| s.completed), Some(300));
    }

    #[test]
    fn bogus_sample_does_not_block_later_ones() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(t0);
        assert!(est
            .observe(sample(100, 1000, 10.0), t0 + Duration::from_secs(1))
            .is_some());
        let d = est
            .observe(sample(5000, 1000, 100.0), t0 + Duration::from_secs(2))
            .unwrap();
        assert_eq!(d.completed_of, "1000/1000");
        assert!(d.eta.is_none());
        assert_eq!(est.last_sample().map(|s| s.completed), Some(100));

        let d = est
            .observe(sample(300, 1000, 30.0), t0 + Duration::from_secs(4))
            .unwrap();
        assert_eq!(d.completed_of, "300/1000");
        assert_eq!(est.last_sample().map(|s| s.completed), Some(300));
    }

    #[test]
    fn clock_restart_only_before_first_sample() {
        let t0 = Instant::now();
        let mut est = ProgressEstimator::new(t0);
        let t1 = t0 + Duration::from_secs(2);
        assert!(est.restart_clock(t1));
        assert_eq!(est.started_at(), t1);
        let d = est
            .observe(sample(100, 1000, 10.0), t1 + Duration::from_secs(4))
            .unwrap();
        assert!((d.throughput.unwrap() - 25.0).abs() < 1e-9);
        assert!(!est.restart_clock(t1 + Duration::from_secs(5)));
    }
}
