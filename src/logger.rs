use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Install the global logger. Safe to call more than once; `RUST_LOG`
/// overrides the default levels.
pub fn initialize_logger() {
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();

        builder
            .filter_level(LevelFilter::Info)
            .filter_module("heapdb::storage", LevelFilter::Info)
            .filter_module("heapdb::catalog", LevelFilter::Info)
            .format_timestamp_millis()
            .parse_default_env();

        let _ = builder.try_init();
    });
}

/// Verbose logger for unit tests; output is captured by the test harness
pub fn init_test_logger() {
    let _ = Builder::new()
        .filter_level(LevelFilter::Trace)
        .is_test(true)
        .try_init();
}
