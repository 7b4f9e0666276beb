pub use component_state_tracker::ComponentStateTracker;
pub use generic_component_state::{GenericComponentState, StateLabel};
pub use latency_distribution_tracker::LatencyDistributionTracker;
pub use metrics::GENERAL_METRICS;
pub use prometheus::PrometheusExporterConfig;

pub mod component_state_tracker;
mod generic_component_state;
pub mod latency_distribution_tracker;
mod metrics;
pub mod prometheus;
