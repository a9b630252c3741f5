use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber
///
/// Writes to stdout and to daily rotating files per level under `log_dir`,
/// e.g. logs/info.log.2024-12-22, logs/error.log.2024-12-22. Everything is
/// filtered by `RUST_LOG` first (default `info`).
pub fn init(log_dir: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let file_layer = |name: &str, level: LevelFilter| -> BoxedLayer {
        tracing_subscriber::fmt::layer()
            .with_writer(tracing_appender::rolling::daily(log_dir, name))
            .with_ansi(false)
            .with_filter(level)
            .boxed()
    };

    let layers: Vec<BoxedLayer> = vec![
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .boxed(),
        file_layer("info.log", LevelFilter::INFO),
        file_layer("warn.log", LevelFilter::WARN),
        file_layer("error.log", LevelFilter::ERROR),
        file_layer("debug.log", LevelFilter::DEBUG),
    ];

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
