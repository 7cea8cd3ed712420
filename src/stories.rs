use std::collections::HashSet;
use tracing::{debug, info};

use crate::metrics;
use crate::models::{MiniUser, Story};
use crate::store::{RecordStore, STORIES_KEY};

#[derive(Clone)]
pub struct StoryService {
    store: RecordStore,
}

impl StoryService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn get_stories(&self) -> Vec<Story> {
        self.store.load(STORIES_KEY).await
    }

    async fn save_stories(&self, stories: &[Story]) {
        self.store.save(STORIES_KEY, stories).await
    }

    pub async fn seed_if_needed(&self, seed: Vec<Story>) {
        if !self.get_stories().await.is_empty() {
            return;
        }
        info!(count = seed.len(), "Seeding stories");
        self.save_stories(&seed).await;
    }

    /// Stories by followed accounts and the user's own, newest first.
    pub async fn home_stories(&self, following_ids: &[String], own_id: &str) -> Vec<Story> {
        let ids: HashSet<&str> = following_ids
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(own_id))
            .collect();
        let mut stories: Vec<Story> = self
            .get_stories()
            .await
            .into_iter()
            .filter(|s| ids.contains(s.by.id.as_str()))
            .collect();
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        stories
    }

    /// Record `user_id` as a viewer of `story_id`. Returns `true` only for a
    /// first view; unknown stories and repeat views leave the store untouched.
    pub async fn mark_story_viewed(&self, story_id: &str, user_id: &str) -> bool {
        let mut stories = self.get_stories().await;
        let Some(story) = stories.iter_mut().find(|s| s.id == story_id) else {
            debug!(story_id = %story_id, "Story not found, view not recorded");
            return false;
        };

        if story.viewed_by.iter().any(|id| id == user_id) {
            return false;
        }

        story.viewed_by.push(user_id.to_string());
        self.save_stories(&stories).await;
        metrics::STORIES_VIEWED.inc();
        debug!(story_id = %story_id, user_id = %user_id, "Recorded story view");
        true
    }
}

/// Distinct authors in order of first appearance, the order the stories row
/// presents them and the order a viewer session walks them.
pub fn author_order(stories: &[Story]) -> Vec<MiniUser> {
    let mut seen = HashSet::new();
    stories
        .iter()
        .filter(|s| seen.insert(s.by.id.as_str()))
        .map(|s| s.by.clone())
        .collect()
}
