use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber: `RUST_LOG`-style filtering with a
/// sane default, JSON-formatted output.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,highs=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
