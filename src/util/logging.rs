// util/logging.rs
//
// Structured logging with runtime-selectable verbosity.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --verbose (sets RUST_LOG=debug), --quiet (sets RUST_LOG=warn)
//   - Config file: [logging] level = "debug"
//
// Output: stderr. Never logs mod-list content above `debug`.

use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem.
///
/// `verbose` is true when the user passed --verbose on the CLI; `quiet` when
/// --quiet was passed (verbose wins if both are set). `config_level` is the
/// level from config.toml, if present.
///
/// Priority: RUST_LOG env var > CLI flag > config level > default "info".
pub fn init(verbose: bool, quiet: bool, config_level: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("warn")
    } else if let Some(level) = config_level {
        EnvFilter::new(level.to_string())
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .init();

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        "Logging initialised"
    );
}
