pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod seed;
pub mod store;
pub mod stories;
pub mod story_viewer;
pub mod users;
