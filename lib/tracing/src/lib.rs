//! Global tracing setup shared by the rill binaries.

mod formatter;
pub use formatter::LogFormat;

use smart_config::{DescribeConfig, DeserializeConfig, Serde};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging configuration, loaded from `LOG_*` environment variables.
#[derive(Clone, Debug, DescribeConfig, DeserializeConfig)]
#[config(derive(Default))]
pub struct LogConfig {
    /// Output format: `json`, `logfmt` or `terminal`.
    #[config(default_t = LogFormat::Terminal)]
    #[config(with = Serde![str])]
    pub format: LogFormat,

    /// Whether to emit ANSI colors.
    #[config(default_t = true)]
    pub use_color: bool,
}

/// Global tracer of a process.
///
/// The level filter is read from `RUST_LOG` and defaults to `INFO`.
#[derive(Debug, Clone)]
pub struct Tracer {
    format: LogFormat,
    use_color: bool,
}

impl Tracer {
    pub const fn new(format: LogFormat, use_color: bool) -> Self {
        Self { format, use_color }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.format, config.use_color)
    }

    pub fn init(self) {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        let layer = self.format.apply(filter, self.use_color);

        // fails only if a global subscriber is already installed, which is fine
        let _ = tracing_subscriber::registry().with(layer).try_init();
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(LogFormat::Terminal, true)
    }
}
