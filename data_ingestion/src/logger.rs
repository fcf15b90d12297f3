use env_logger::Env;

/// Installs the process-wide logger. `RUST_LOG` overrides the default `info` filter.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
