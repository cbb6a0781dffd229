//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "AUDIT_LOG";

const DEFAULT_FILTER: &str = "policy_audit=info,policy_audit_core=info";

/// Install the global subscriber. Safe to call more than once.
///
/// `AUDIT_LOG` takes `EnvFilter` directives, e.g.
/// `AUDIT_LOG=policy_audit_core::rotation=debug,policy_audit=info`.
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}
