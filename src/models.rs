use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Field names follow the JSON payloads the web client keeps in local storage

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiniUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(rename = "imgUrl")]
    pub img_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub fullname: String,
    // Client-side demo credential; never read here, only carried through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub img_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default)]
    pub followers: Vec<MiniUser>,
    #[serde(default)]
    pub following: Vec<MiniUser>,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub followers_count: u32,
    #[serde(default)]
    pub following_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_post_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_post_ids: Option<Vec<String>>,
}

impl User {
    pub fn to_mini(&self) -> MiniUser {
        MiniUser {
            id: self.id.clone(),
            username: self.username.clone(),
            fullname: Some(self.fullname.clone()),
            img_url: self.img_url.clone(),
        }
    }

    pub fn following_ids(&self) -> Vec<String> {
        self.following.iter().map(|u| u.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Like,
    Comment,
    Follow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub by: MiniUser,
    pub target_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_img_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_txt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Everything a caller supplies when recording a notification; the store
/// fills in the id, timestamp and read flag.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationType,
    pub by: MiniUser,
    pub target_user_id: String,
    pub post_id: Option<String>,
    pub post_img_url: Option<String>,
    pub comment_txt: Option<String>,
}

/// Display projection over one or more notifications. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedNotification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub post_id: Option<String>,
    pub post_img_url: Option<String>,
    pub comment_txt: Option<String>,
    pub users: Vec<MiniUser>,
    pub latest_at: DateTime<Utc>,
    pub is_read: bool,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub txt: String,
    pub by: MiniUser,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_by: Option<Vec<MiniUser>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLikes {
    pub count: u32,
    pub liked_by: Vec<MiniUser>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostComments {
    pub count: u32,
    pub list: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostLocation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub img_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub by: MiniUser,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: PostLikes,
    #[serde(default)]
    pub comments: PostComments,
    #[serde(default)]
    pub saved_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PostLocation>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    #[serde(rename = "_id")]
    pub id: String,
    pub img_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txt: Option<String>,
    pub by: MiniUser,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub viewed_by: Vec<String>,
    // Stored for the client; nothing enforces it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// Short random id with a one-letter kind prefix, e.g. "nA1b2C3"
pub fn make_id(prefix: char) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &raw[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_uses_client_field_names() {
        let json = r#"{
            "_id": "nabc123",
            "type": "like",
            "by": {"_id": "u1", "username": "ana", "imgUrl": "a.png"},
            "targetUserId": "u2",
            "postId": "p7",
            "createdAt": "2024-05-01T10:00:00Z",
            "isRead": false
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationType::Like);
        assert_eq!(n.post_id.as_deref(), Some("p7"));
        assert_eq!(n.by.fullname, None);

        let back = serde_json::to_value(&n).unwrap();
        assert_eq!(back["targetUserId"], "u2");
        assert_eq!(back["type"], "like");
        assert!(back.get("commentTxt").is_none());
    }

    #[test]
    fn test_user_keeps_client_owned_fields() {
        let json = r#"{
            "_id": "u1",
            "username": "ana",
            "fullname": "Ana Bell",
            "password": "demo",
            "imgUrl": "a.png",
            "followers": [],
            "following": [],
            "postsCount": 2,
            "followersCount": 0,
            "followingCount": 0,
            "likedPostIds": ["p1"],
            "savedPostIds": ["p2"]
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.liked_post_ids, Some(vec!["p1".to_string()]));

        let back = serde_json::to_value(&user).unwrap();
        assert_eq!(back["password"], "demo");
        assert_eq!(back["likedPostIds"], serde_json::json!(["p1"]));
        assert_eq!(back["savedPostIds"], serde_json::json!(["p2"]));
        assert_eq!(back["postsCount"], 2);

        let bare: User = serde_json::from_str(
            r#"{"_id": "u2", "username": "bo", "fullname": "Bo", "imgUrl": "b.png"}"#,
        )
        .unwrap();
        let back = serde_json::to_value(&bare).unwrap();
        assert!(back.get("password").is_none());
        assert!(back.get("likedPostIds").is_none());
        assert!(back.get("savedPostIds").is_none());
    }

    #[test]
    fn test_make_id_shape() {
        let id = make_id('n');
        assert_eq!(id.len(), 7);
        assert!(id.starts_with('n'));
        assert_ne!(make_id('n'), make_id('n'));
    }
}
