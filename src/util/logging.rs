use log::LevelFilter;

/// Maps the number of `-v` flags to a level: none is warnings only, then
/// info, debug and trace.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// `RUST_LOG` still applies for per-module filters; `-v` sets the base level.
pub fn setup_logging(verbose: u8) {
    env_logger::Builder::from_default_env()
        .filter_level(level_for_verbosity(verbose))
        .format_timestamp_millis()
        .init();
}
