use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    // LOG_LEVEL applies to this crate, RUST_LOG overrides everything
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("social_feed_engine={}", log_level))
            // Per-collection load/save lines are only useful when chasing storage issues
            .add_directive("social_feed_engine::store=warn".parse().unwrap())
            .add_directive("social_feed_engine::story_viewer=info".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    tracing::info!("Logging initialized");
}
