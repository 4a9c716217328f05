pub mod config;
pub mod models;
pub mod db;
pub mod profiles; // builtin case profile registry
pub mod detect; // multi-signal parse-case detection
pub mod mapping; // raw tree -> canonical record
pub mod keywords; // vocabulary, extraction, relevance
pub mod queue; // approval queue state machine
pub mod ingest; // pipeline facade + batch runner

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins when set;
/// otherwise the crate logs at info.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
