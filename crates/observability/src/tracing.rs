//! Subscriber initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`). The output format comes
//! from `HEMOBANK_LOG_FORMAT` (`json`, the default, or `pretty`).

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "HEMOBANK_LOG_FORMAT";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl LogFormat {
    /// Read from the environment; unknown values fall back to JSON.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing for the process using the format from the environment.
pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    // A subscriber may already be installed (tests, embedding binaries).
    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.with_target(true).try_init(),
    };
}

/// Human-readable output captured by the test harness. Defaults to `debug` so
/// per-lot deductions show up in failing test output.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("debug"))
        .with_test_writer()
        .try_init();
}
