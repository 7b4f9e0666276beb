use crate::metrics::GENERAL_METRICS;
use itertools::Itertools;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, Instant};

/// Tracks what a linear multi-stage operation spends its time on.
///
/// Each recorded stage is also observed in `GENERAL_METRICS.stage_latency`
/// under the operation's name. `Display` renders the breakdown, slowest stage last:
/// `total: 1.2s (Build: 1.1ms (0.09%); Reduce: 1.19s (99.91%); )`
#[derive(Debug)]
pub struct LatencyDistributionTracker<S> {
    operation: &'static str,
    last_stage_started_at: Instant,
    past_stages: Vec<(S, Duration)>,
}

impl<S: Debug> LatencyDistributionTracker<S> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            last_stage_started_at: Instant::now(),
            past_stages: vec![],
        }
    }

    /// Closes the current stage as `stage`.
    pub fn record_stage(&mut self, stage: S, stage_label: &'static str) -> Duration {
        let duration = self.last_stage_started_at.elapsed();
        self.last_stage_started_at = Instant::now();
        GENERAL_METRICS.stage_latency[&(self.operation, stage_label)].observe(duration);
        self.past_stages.push((stage, duration));
        duration
    }

    pub fn current_stage_age(&self) -> Duration {
        self.last_stage_started_at.elapsed()
    }

    pub fn total(&self) -> Duration {
        self.past_stages.iter().map(|(_, d)| d).sum()
    }
}

impl<S: Debug> Display for LatencyDistributionTracker<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let total = self.total();
        write!(f, "total: {total:?} (")?;
        for (stage, duration) in self.past_stages.iter().sorted_by_key(|(_, d)| *d) {
            let percentage = if total.is_zero() {
                0.0
            } else {
                duration.div_duration_f32(total) * 100f32
            };
            write!(f, "{stage:?}: {duration:?} ({percentage:.2}%); ")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum Stage {
        Slow,
        Fast,
    }

    #[test]
    fn breakdown_lists_slowest_stage_last() {
        let mut tracker = LatencyDistributionTracker::new("tracker_test");
        std::thread::sleep(Duration::from_millis(30));
        tracker.record_stage(Stage::Slow, "slow");
        tracker.record_stage(Stage::Fast, "fast");

        let rendered = tracker.to_string();
        let fast = rendered.find("Fast").unwrap();
        let slow = rendered.find("Slow").unwrap();
        assert!(fast < slow, "{rendered}");
        assert!(tracker.total() >= Duration::from_millis(30));
    }
}
