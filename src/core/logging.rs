use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FAILSAFE_LOG";
const DEFAULT_LEVEL: &str = "warn";

/// Install the stderr fmt subscriber. Safe to call more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LEVEL))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
