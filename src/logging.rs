use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt, EnvFilter, Layer};

///
/// Initializes coloured, levelled log lines on stdout as the global subscriber.
/// `RUST_LOG` directives are added on top of the `info` default.
///
pub fn init_tracing_subscriber() {
    let directive = format!("info,{}", std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default());
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true)
        .compact();

    // A second initialization (e.g. from tests) leaves the first in place
    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(EnvFilter::new(directive)))
        .try_init();
    tracing::debug!("initialized global tracing subscriber");
}
