//! Tracing for tests.

use std::sync::Once;

use deepfly_telemetry::{LogConfig, LogTarget, setup_logging};

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness's captured writer.
///
/// Safe to call from every test; only the first call installs anything. The
/// level comes from `RUST_LOG` when set, `debug` otherwise.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned());
        let config = LogConfig::new(level)
            .with_target(LogTarget::Test)
            .without_timestamps();
        // Another subscriber may already be installed by the test binary.
        let _ = setup_logging(&config);
    });
}
