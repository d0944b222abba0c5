use mangaconfig::Config;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so that
/// command results on stdout stay machine readable.
pub fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config
            .get_log_min_level()
            .unwrap_or_else(|_| "INFO".to_string())
            .to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    let subscriber = Registry::default().with(filter);

    if enable_console || verbose {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}
