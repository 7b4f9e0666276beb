use rill_tracing::LogConfig;
use smart_config::{ConfigRepository, ConfigSchema, DescribeConfig, DeserializeConfig, Environment};

#[derive(Debug)]
pub struct Config {
    pub bench_config: BenchConfig,
    pub log_config: LogConfig,
}

/// Scenario sizes, loaded from `BENCH_*` environment variables.
#[derive(Clone, Debug, DescribeConfig, DeserializeConfig)]
#[config(derive(Default))]
pub struct BenchConfig {
    /// Items produced by every input of a scenario.
    #[config(default_t = 100_000)]
    pub items: u64,

    /// Inputs merged by `choose` and concatenated by `combine`; subscribers of `broadcast`.
    #[config(default_t = 4)]
    pub fan_out: usize,

    /// Prometheus port to listen on. The exporter is not started if unset.
    pub prometheus_port: Option<u16>,
}

pub fn build_configs() -> Config {
    let mut schema = ConfigSchema::default();
    schema
        .insert(&BenchConfig::DESCRIPTION, "bench")
        .expect("Failed to insert bench config");
    schema
        .insert(&LogConfig::DESCRIPTION, "log")
        .expect("Failed to insert log config");

    let repo = ConfigRepository::new(&schema).with(Environment::prefixed(""));

    let bench_config = repo
        .single::<BenchConfig>()
        .expect("Failed to load bench config")
        .parse()
        .expect("Failed to parse bench config");

    let log_config = repo
        .single::<LogConfig>()
        .expect("Failed to load log config")
        .parse()
        .expect("Failed to parse log config");

    Config {
        bench_config,
        log_config,
    }
}
