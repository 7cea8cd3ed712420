use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::models::{make_id, Comment, MiniUser, NewNotification, NotificationType, Post};
use crate::notifications::NotificationService;
use crate::store::{RecordStore, POSTS_KEY};

#[derive(Clone)]
pub struct FeedService {
    store: RecordStore,
    notifications: NotificationService,
}

impl FeedService {
    pub fn new(store: RecordStore, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn get_posts(&self) -> Vec<Post> {
        self.store.load(POSTS_KEY).await
    }

    async fn save_posts(&self, posts: &[Post]) {
        self.store.save(POSTS_KEY, posts).await
    }

    pub async fn seed_if_needed(&self, seed: Vec<Post>) {
        if !self.get_posts().await.is_empty() {
            return;
        }
        info!(count = seed.len(), "Seeding posts");
        self.save_posts(&seed).await;
    }

    pub async fn home_feed(&self, following_ids: &[String]) -> Vec<Post> {
        let ids: HashSet<&str> = following_ids.iter().map(String::as_str).collect();
        let mut posts: Vec<Post> = self
            .get_posts()
            .await
            .into_iter()
            .filter(|p| ids.contains(p.by.id.as_str()))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }

    pub async fn user_posts(&self, user_id: &str) -> Vec<Post> {
        let mut posts: Vec<Post> = self
            .get_posts()
            .await
            .into_iter()
            .filter(|p| p.by.id == user_id)
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }

    /// Like or unlike `post_id` as `user`. The post owner is notified of a
    /// like and the notification is withdrawn on unlike.
    pub async fn toggle_like(&self, post_id: &str, user: &MiniUser) -> Option<Post> {
        let mut posts = self.get_posts().await;
        let post = posts.iter_mut().find(|p| p.id == post_id)?;

        let liked = match post.likes.liked_by.iter().position(|u| u.id == user.id) {
            Some(idx) => {
                post.likes.liked_by.remove(idx);
                post.likes.count = post.likes.count.saturating_sub(1);
                false
            }
            None => {
                post.likes.liked_by.push(user.clone());
                post.likes.count += 1;
                true
            }
        };
        let updated = post.clone();
        self.save_posts(&posts).await;

        debug!(post_id = %post_id, user_id = %user.id, liked, "Toggled like");

        if updated.by.id != user.id {
            if liked {
                self.notifications
                    .add_notification(NewNotification {
                        kind: NotificationType::Like,
                        by: user.clone(),
                        target_user_id: updated.by.id.clone(),
                        post_id: Some(updated.id.clone()),
                        post_img_url: Some(updated.img_url.clone()),
                        comment_txt: None,
                    })
                    .await;
            } else {
                self.notifications
                    .remove_notification(
                        NotificationType::Like,
                        &user.id,
                        Some(&updated.by.id),
                        Some(&updated.id),
                    )
                    .await;
            }
        }

        Some(updated)
    }

    pub async fn add_comment(&self, post_id: &str, txt: &str, by: &MiniUser) -> Option<Comment> {
        let mut posts = self.get_posts().await;
        let post = posts.iter_mut().find(|p| p.id == post_id)?;

        let comment = Comment {
            id: make_id('c'),
            txt: txt.to_string(),
            by: by.clone(),
            created_at: Utc::now(),
            liked_by: None,
        };
        post.comments.list.push(comment.clone());
        post.comments.count += 1;
        let owner_id = post.by.id.clone();
        let img_url = post.img_url.clone();
        self.save_posts(&posts).await;

        if owner_id != by.id {
            self.notifications
                .add_notification(NewNotification {
                    kind: NotificationType::Comment,
                    by: by.clone(),
                    target_user_id: owner_id,
                    post_id: Some(post_id.to_string()),
                    post_img_url: Some(img_url),
                    comment_txt: Some(comment.txt.clone()),
                })
                .await;
        }

        Some(comment)
    }

    /// Returns whether the post is saved by `user_id` afterwards; `false`
    /// when the post does not exist.
    pub async fn toggle_save(&self, post_id: &str, user_id: &str) -> bool {
        let mut posts = self.get_posts().await;
        let Some(post) = posts.iter_mut().find(|p| p.id == post_id) else {
            return false;
        };

        let saved = match post.saved_by.iter().position(|id| id == user_id) {
            Some(idx) => {
                post.saved_by.remove(idx);
                false
            }
            None => {
                post.saved_by.push(user_id.to_string());
                true
            }
        };
        self.save_posts(&posts).await;
        saved
    }

    /// `post.id` is replaced with a generated one.
    pub async fn create_post(&self, mut post: Post) -> Post {
        let mut posts = self.get_posts().await;
        post.id = make_id('p');
        posts.insert(0, post.clone());
        self.save_posts(&posts).await;
        info!(post_id = %post.id, by = %post.by.id, "Created post");
        post
    }
}
