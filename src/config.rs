use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::seed::DEFAULT_USERNAME;
use crate::story_viewer::DEFAULT_STORY_DURATION;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_url: String,
    pub login_username: String,
    pub story_duration: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let story_duration = match env::var("STORY_DURATION_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse::<u64>()
                    .context("STORY_DURATION_MS must be a whole number of milliseconds")?,
            ),
            Err(_) => DEFAULT_STORY_DURATION,
        };

        Ok(Self {
            storage_url: env::var("STORAGE_URL")
                .unwrap_or_else(|_| "sqlite://social_feed.db?mode=rwc".to_string()),
            login_username: env::var("LOGIN_USERNAME")
                .unwrap_or_else(|_| DEFAULT_USERNAME.to_string()),
            story_duration,
        })
    }
}
