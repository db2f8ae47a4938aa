//! Tracing setup for the `nqmp` binary.
//!
//! Logs go to stderr so stdout carries only command output (summaries, paths).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// HTTP stack targets kept at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

fn filter(level: Level) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    QUIET_TARGETS
        .iter()
        .filter_map(|target| format!("{target}=warn").parse().ok())
        .fold(EnvFilter::new(level.as_str()), EnvFilter::add_directive)
}

/// Install the global subscriber: `RUST_LOG` if set, else `level`; JSON
/// lines when `json`. Only the first call in a process has any effect.
pub fn init_tracing(json: bool, level: Level) {
    let output: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter(level))
        .try_init()
        .ok();
}
