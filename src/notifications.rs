use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::metrics;
use crate::models::{
    make_id, GroupedNotification, MiniUser, NewNotification, Notification, NotificationType, Post,
    User,
};
use crate::store::{RecordStore, NOTIFICATIONS_KEY};

/// Fold a user's notifications into display groups, newest group first.
///
/// Likes and comments on the same post collapse into one group; follows never
/// collapse. A group keeps the timestamp of its newest member, which relies on
/// the descending sort done here before grouping.
pub fn group_notifications(
    notifications: &[Notification],
    target_user_id: &str,
) -> Vec<GroupedNotification> {
    let mut relevant: Vec<&Notification> = notifications
        .iter()
        .filter(|n| n.target_user_id == target_user_id)
        .collect();
    // sort_by is stable, ties keep stored order
    relevant.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut groups: Vec<GroupedNotification> = Vec::new();
    let mut group_index: HashMap<(NotificationType, Option<&str>), usize> = HashMap::new();

    for n in relevant {
        if n.kind == NotificationType::Follow {
            groups.push(new_group(n));
            continue;
        }

        let key = (n.kind, n.post_id.as_deref());
        match group_index.get(&key) {
            Some(&idx) => {
                let group = &mut groups[idx];
                if !group.users.iter().any(|u| u.id == n.by.id) {
                    group.users.push(n.by.clone());
                }
                group.ids.push(n.id.clone());
                if !n.is_read {
                    group.is_read = false;
                }
            }
            None => {
                group_index.insert(key, groups.len());
                groups.push(new_group(n));
            }
        }
    }

    groups
}

fn new_group(n: &Notification) -> GroupedNotification {
    GroupedNotification {
        kind: n.kind,
        post_id: n.post_id.clone(),
        post_img_url: n.post_img_url.clone(),
        comment_txt: n.comment_txt.clone(),
        users: vec![n.by.clone()],
        latest_at: n.created_at,
        is_read: n.is_read,
        ids: vec![n.id.clone()],
    }
}

#[derive(Clone)]
pub struct NotificationService {
    store: RecordStore,
}

impl NotificationService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub async fn get_notifications(&self) -> Vec<Notification> {
        self.store.load(NOTIFICATIONS_KEY).await
    }

    async fn save_notifications(&self, notifications: &[Notification]) {
        self.store.save(NOTIFICATIONS_KEY, notifications).await
    }

    pub async fn add_notification(&self, new: NewNotification) -> Notification {
        let mut notifications = self.get_notifications().await;
        let notification = Notification {
            id: make_id('n'),
            kind: new.kind,
            by: new.by,
            target_user_id: new.target_user_id,
            post_id: new.post_id,
            post_img_url: new.post_img_url,
            comment_txt: new.comment_txt,
            created_at: Utc::now(),
            is_read: false,
        };

        notifications.insert(0, notification.clone());
        self.save_notifications(&notifications).await;
        metrics::NOTIFICATIONS_ADDED.inc();

        debug!(
            notification_type = ?notification.kind,
            by = %notification.by.id,
            target = %notification.target_user_id,
            "Recorded notification"
        );
        notification
    }

    /// Drop the notifications an undone action produced.
    ///
    /// Follows match on actor alone and ignore `post_id`; likes and comments
    /// also need an equal post id. `target_user_id` narrows the match when
    /// given.
    pub async fn remove_notification(
        &self,
        kind: NotificationType,
        by_user_id: &str,
        target_user_id: Option<&str>,
        post_id: Option<&str>,
    ) -> usize {
        let notifications = self.get_notifications().await;
        let before = notifications.len();

        let kept: Vec<Notification> = notifications
            .into_iter()
            .filter(|n| {
                if n.kind != kind || n.by.id != by_user_id {
                    return true;
                }
                if let Some(target) = target_user_id {
                    if n.target_user_id != target {
                        return true;
                    }
                }
                if kind == NotificationType::Follow {
                    return false;
                }
                n.post_id.as_deref() != post_id
            })
            .collect();

        let removed = before - kept.len();
        self.save_notifications(&kept).await;
        metrics::NOTIFICATIONS_REMOVED.inc_by(removed as f64);

        debug!(
            notification_type = ?kind,
            by = %by_user_id,
            removed,
            "Removed notifications"
        );
        removed
    }

    pub async fn get_grouped_notifications(&self, user_id: &str) -> Vec<GroupedNotification> {
        let notifications = self.get_notifications().await;
        let groups = group_notifications(&notifications, user_id);

        metrics::NOTIFICATION_GROUPS_BUILT.inc_by(groups.len() as f64);
        for group in &groups {
            metrics::NOTIFICATION_GROUP_SIZE.observe(group.ids.len() as f64);
        }
        groups
    }

    pub async fn mark_all_as_read(&self, user_id: &str) {
        let mut notifications = self.get_notifications().await;
        let mut changed = 0usize;
        for n in notifications
            .iter_mut()
            .filter(|n| n.target_user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            changed += 1;
        }

        if changed > 0 {
            self.save_notifications(&notifications).await;
            info!(user_id = %user_id, changed, "Marked notifications as read");
        }
    }

    pub async fn has_unread(&self, user_id: &str) -> bool {
        self.get_notifications()
            .await
            .iter()
            .any(|n| n.target_user_id == user_id && !n.is_read)
    }

    /// Populate a first-run inbox for `target_user_id` from existing users and
    /// that user's posts. Does nothing once any notification exists.
    pub async fn seed_if_needed(&self, target_user_id: &str, users: &[User], posts: &[Post]) {
        if !self.get_notifications().await.is_empty() {
            return;
        }

        let own_posts: Vec<&Post> = posts.iter().filter(|p| p.by.id == target_user_id).collect();
        let others: Vec<MiniUser> = users
            .iter()
            .filter(|u| u.id != target_user_id)
            .map(User::to_mini)
            .collect();

        if others.is_empty() || own_posts.is_empty() {
            return;
        }

        let now = Utc::now();
        let mut seed = Vec::new();
        let seeded = |kind, by: &MiniUser, post: Option<&Post>, txt: Option<&str>, at| Notification {
            id: make_id('n'),
            kind,
            by: by.clone(),
            target_user_id: target_user_id.to_string(),
            post_id: post.map(|p| p.id.clone()),
            post_img_url: post.map(|p| p.img_url.clone()),
            comment_txt: txt.map(str::to_string),
            created_at: at,
            is_read: false,
        };

        for (i, post) in own_posts.iter().take(3).enumerate() {
            for (j, by) in others.iter().take(2).enumerate() {
                let at = now - Duration::hours((i * 2 + j) as i64);
                seed.push(seeded(NotificationType::Like, by, Some(*post), None, at));
            }
        }

        seed.push(seeded(
            NotificationType::Comment,
            &others[0],
            Some(own_posts[0]),
            Some("This is amazing! 🔥"),
            now - Duration::minutes(30),
        ));

        for (i, by) in others.iter().take(2).enumerate() {
            let at = now - Duration::hours(2 * (i as i64 + 1));
            seed.push(seeded(NotificationType::Follow, by, None, None, at));
        }

        info!(target = %target_user_id, count = seed.len(), "Seeding notifications");
        self.save_notifications(&seed).await;
    }
}
