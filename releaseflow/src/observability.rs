//! Tracing setup helpers.

use tracing_subscriber::EnvFilter;

/// Initializes a tracing subscriber with an env-filter.
///
/// `filter` overrides `RUST_LOG`; with `None`, `RUST_LOG` applies and
/// defaults to `info`. Safe to call more than once; later calls are
/// no-ops.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}
