use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::models::{MiniUser, NewNotification, NotificationType, User};
use crate::notifications::NotificationService;
use crate::store::{RecordStore, RECENT_SEARCHES_KEY, USERS_KEY};

const MAX_RECENT_SEARCHES: usize = 10;

#[derive(Clone)]
pub struct UserDirectory {
    store: RecordStore,
    notifications: NotificationService,
}

impl UserDirectory {
    pub fn new(store: RecordStore, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn get_users(&self) -> Vec<User> {
        self.store.load(USERS_KEY).await
    }

    async fn save_users(&self, users: &[User]) {
        self.store.save(USERS_KEY, users).await
    }

    pub async fn seed_if_needed(&self, seed: Vec<User>) {
        if !self.get_users().await.is_empty() {
            return;
        }
        info!(count = seed.len(), "Seeding users");
        self.save_users(&seed).await;
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Option<User> {
        self.get_users().await.into_iter().find(|u| u.id == user_id)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.get_users()
            .await
            .into_iter()
            .find(|u| u.username == username)
    }

    /// Everyone except the current user and the accounts they follow.
    pub async fn suggested_users(&self, current_user_id: &str) -> Vec<MiniUser> {
        let users = self.get_users().await;
        let Some(current) = users.iter().find(|u| u.id == current_user_id) else {
            return Vec::new();
        };

        let following: HashSet<&str> = current.following.iter().map(|u| u.id.as_str()).collect();
        users
            .iter()
            .filter(|u| u.id != current_user_id && !following.contains(u.id.as_str()))
            .map(User::to_mini)
            .collect()
    }

    /// Case-insensitive substring match on username or fullname, in stored
    /// order. A blank query matches nobody.
    pub async fn search_users(&self, query: &str) -> Vec<MiniUser> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let results: Vec<MiniUser> = self
            .get_users()
            .await
            .iter()
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.fullname.to_lowercase().contains(&needle)
            })
            .map(User::to_mini)
            .collect();

        debug!(query = %needle, matches = results.len(), "Searched users");
        results
    }

    pub async fn get_recent_searches(&self) -> Vec<MiniUser> {
        self.store.load(RECENT_SEARCHES_KEY).await
    }

    /// Put `user` at the front of the recent list, dropping any older entry
    /// for the same id and anything past the cap.
    pub async fn add_recent_search(&self, user: MiniUser) {
        let mut recent = self.get_recent_searches().await;
        recent.retain(|u| u.id != user.id);
        recent.insert(0, user);
        recent.truncate(MAX_RECENT_SEARCHES);
        self.store.save(RECENT_SEARCHES_KEY, &recent).await;
    }

    pub async fn remove_recent_search(&self, user_id: &str) {
        let mut recent = self.get_recent_searches().await;
        let before = recent.len();
        recent.retain(|u| u.id != user_id);
        if recent.len() != before {
            self.store.save(RECENT_SEARCHES_KEY, &recent).await;
        }
    }

    pub async fn clear_recent_searches(&self) {
        self.store.clear(RECENT_SEARCHES_KEY).await;
        info!("Cleared recent searches");
    }

    /// Follow or unfollow `target_id` on behalf of `follower_id`, keeping both
    /// sides' lists and counters in step. Returns whether the follower now
    /// follows the target, or `None` if either user is unknown.
    pub async fn toggle_follow(&self, follower_id: &str, target_id: &str) -> Option<bool> {
        if follower_id == target_id {
            return None;
        }

        let mut users = self.get_users().await;
        let follower_idx = users.iter().position(|u| u.id == follower_id)?;
        let target_idx = users.iter().position(|u| u.id == target_id)?;

        let follower_mini = users[follower_idx].to_mini();
        let target_mini = users[target_idx].to_mini();

        let now_following = {
            let follower = &mut users[follower_idx];
            match follower.following.iter().position(|u| u.id == target_id) {
                Some(idx) => {
                    follower.following.remove(idx);
                    false
                }
                None => {
                    follower.following.push(target_mini);
                    true
                }
            }
        };
        users[follower_idx].following_count = users[follower_idx].following.len() as u32;

        let target = &mut users[target_idx];
        if now_following {
            if !target.followers.iter().any(|u| u.id == follower_id) {
                target.followers.push(follower_mini.clone());
            }
        } else {
            target.followers.retain(|u| u.id != follower_id);
        }
        target.followers_count = target.followers.len() as u32;

        self.save_users(&users).await;
        info!(follower = %follower_id, target = %target_id, now_following, "Toggled follow");

        if now_following {
            self.notifications
                .add_notification(NewNotification {
                    kind: NotificationType::Follow,
                    by: follower_mini,
                    target_user_id: target_id.to_string(),
                    post_id: None,
                    post_img_url: None,
                    comment_txt: None,
                })
                .await;
        } else {
            self.notifications
                .remove_notification(NotificationType::Follow, follower_id, Some(target_id), None)
                .await;
        }

        Some(now_following)
    }
}

/// The logged-in user, passed explicitly to whatever needs it. Created at
/// start-up and cleared on logout.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn login(&mut self, directory: &UserDirectory, username: &str) -> Option<&User> {
        match directory.get_user_by_username(username).await {
            Some(user) => {
                info!(user_id = %user.id, username = %username, "Logged in");
                self.user = Some(user);
                self.user.as_ref()
            }
            None => {
                warn!(username = %username, "Login failed, unknown user");
                None
            }
        }
    }

    /// Reload the logged-in user after follow changes.
    pub async fn refresh(&mut self, directory: &UserDirectory) {
        let Some(id) = self.user.as_ref().map(|u| u.id.clone()) else {
            return;
        };
        if let Some(user) = directory.get_user_by_id(&id).await {
            self.user = Some(user);
        }
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            info!(user_id = %user.id, "Logged out");
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn mini_user(&self) -> Option<MiniUser> {
        self.user.as_ref().map(User::to_mini)
    }
}
