use crate::GenericComponentState;
use std::time::Duration;
use vise::{Buckets, Counter, Gauge, Histogram, LabeledFamily, Metrics, Unit};

const LATENCIES_FAST: Buckets = Buckets::exponential(0.000001..=10.0, 2.0);

#[derive(Debug, Metrics)]
pub struct GeneralMetrics {
    /// Seconds spent by components in each state.
    /// `specific_state` is component-defined, the set of values differs per component.
    #[metrics(labels = ["component", "generic_state", "specific_state"])]
    pub component_time_spent_in_state:
        LabeledFamily<(&'static str, GenericComponentState, &'static str), Counter<f64>, 3>,

    /// Duration of the stages of a tracked operation, see `LatencyDistributionTracker`.
    #[metrics(unit = Unit::Seconds, labels = ["operation", "stage"], buckets = LATENCIES_FAST)]
    pub stage_latency: LabeledFamily<(&'static str, &'static str), Histogram<Duration>, 2>,

    /// Unix timestamp for when the process was started, labelled by version.
    #[metrics(labels = ["version"])]
    pub process_started_at: LabeledFamily<&'static str, Gauge<i64>>,
}

#[vise::register]
pub static GENERAL_METRICS: vise::Global<GeneralMetrics> = vise::Global::new();
