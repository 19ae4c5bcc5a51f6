//! Shared test bootstrap.
//!
//! Call [`init`] at the top of every test so failures come with readable
//! reports and `tracing` output lands in the test harness's capture buffer.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize global test state: a tracing subscriber writing into the test
/// capture buffer, and color-eyre panic/error reports.
///
/// Idempotent, so every test can call it unconditionally.
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
        let _ = color_eyre::install();
    });
}
