//! Log sink setup.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to the application.
//! [`init`] installs a formatting subscriber filtered by `RUST_LOG`, falling back to `info`:
//!
//! ```rust,ignore
//! river::logging::init();
//!
//! // or with additional directives
//! river::logging::try_init_with(&["river::request=warn"])?;
//! ```

use tracing_subscriber::{prelude::*, util::TryInitError, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

fn build_filter(directives: &[&str]) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    for directive in directives {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    filter
}

/// Installs the global subscriber. Does nothing if one is already installed.
pub fn init() {
    let _ = try_init_with(&[]);
}

/// Installs the global subscriber with extra filter directives on top of `RUST_LOG`.
/// Directives that fail to parse are skipped.
pub fn try_init_with(directives: &[&str]) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(build_filter(directives))
        .try_init()
}
