//metrics.rs
use lazy_static::lazy_static;
use prometheus::{register_counter, register_histogram, Counter, Histogram, HistogramOpts, Opts};

lazy_static! {
    // Notification metrics
    pub static ref NOTIFICATIONS_ADDED: Counter = register_counter!(Opts::new(
        "notifications_added_total",
        "Total number of notifications recorded"
    ))
    .unwrap();

    pub static ref NOTIFICATIONS_REMOVED: Counter = register_counter!(Opts::new(
        "notifications_removed_total",
        "Total number of notifications removed by a reversed action"
    ))
    .unwrap();

    pub static ref NOTIFICATION_GROUPS_BUILT: Counter = register_counter!(Opts::new(
        "notification_groups_built_total",
        "Total number of notification groups served by grouped reads"
    ))
    .unwrap();

    pub static ref NOTIFICATION_GROUP_SIZE: Histogram = register_histogram!(
        HistogramOpts::new(
            "notification_group_size",
            "Number of notifications folded into one group"
        )
        .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0])
    )
    .unwrap();

    // Story metrics
    pub static ref STORIES_VIEWED: Counter = register_counter!(Opts::new(
        "stories_viewed_total",
        "Total number of first-time story views recorded"
    ))
    .unwrap();

    pub static ref STORY_AUTO_ADVANCES: Counter = register_counter!(Opts::new(
        "story_auto_advances_total",
        "Total number of story transitions triggered by the playback timer"
    ))
    .unwrap();

    // Storage metrics
    pub static ref STORAGE_FAILURES: Counter = register_counter!(Opts::new(
        "storage_failures_total",
        "Total number of swallowed record store failures"
    ))
    .unwrap();
}

pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
