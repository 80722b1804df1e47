use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// `--log-level` wins over `RUST_LOG`, which wins over [`DEFAULT_FILTER`].
pub fn filter(log_level: Option<&str>) -> crate::Result<EnvFilter> {
    match log_level {
        Some(directives) => {
            EnvFilter::try_new(directives).map_err(|e| crate::Error::LogInit(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Installs the global fmt subscriber. Logs go to stderr so stdout only
/// carries the report.
pub fn init(log_level: Option<&str>) -> crate::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| crate::Error::LogInit(e.to_string()))
}
