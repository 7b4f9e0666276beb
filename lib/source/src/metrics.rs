use vise::{Counter, Gauge, LabeledFamily, Metrics};

#[derive(Debug, Metrics)]
#[metrics(prefix = "rill_source")]
pub struct SourceMetrics {
    /// Number of tasks forked by concurrent combinators (zip, choose, broadcast pump).
    #[metrics(labels = ["combinator"])]
    pub forked_tasks: LabeledFamily<&'static str, Counter>,

    /// Forked tasks that have not yet terminated.
    /// Returns to zero once every reduction has returned.
    #[metrics(labels = ["combinator"])]
    pub active_tasks: LabeledFamily<&'static str, Gauge<i64>>,

    /// Items handed to a downstream reducer by concurrent combinators.
    #[metrics(labels = ["combinator"])]
    pub items: LabeledFamily<&'static str, Counter>,

    /// Producer faults observed by concurrent combinators.
    #[metrics(labels = ["combinator"])]
    pub faults: LabeledFamily<&'static str, Counter>,

    /// Subscribers currently attached to broadcast hubs.
    pub broadcast_subscribers: Gauge<i64>,

    /// How many times a broadcast pump has been (re)started.
    pub pump_starts: Counter,
}

#[vise::register]
pub static SOURCE_METRICS: vise::Global<SourceMetrics> = vise::Global::new();
