// First-run demo data, timestamps relative to now
use chrono::{Duration, Utc};

use crate::models::{MiniUser, Post, PostComments, PostLikes, PostLocation, Story, User};

pub const DEFAULT_USERNAME: &str = "moshik_dev";

fn mini(id: &str, username: &str, fullname: &str) -> MiniUser {
    MiniUser {
        id: id.to_string(),
        username: username.to_string(),
        fullname: Some(fullname.to_string()),
        img_url: format!("https://i.pravatar.cc/150?u={}", username),
    }
}

fn roster() -> Vec<MiniUser> {
    vec![
        mini("u101", DEFAULT_USERNAME, "Moshik Dev"),
        mini("u102", "noa.travels", "Noa Levi"),
        mini("u103", "dan_cooks", "Dan Cohen"),
        mini("u104", "maya.lens", "Maya Shapiro"),
        mini("u105", "itay_runs", "Itay Mizrahi"),
    ]
}

pub fn users() -> Vec<User> {
    let roster = roster();
    // following lists by roster index
    let follows: [&[usize]; 5] = [&[1, 2], &[0, 2, 3], &[0], &[1], &[0, 1]];

    roster
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let following: Vec<MiniUser> = follows[i].iter().map(|&j| roster[j].clone()).collect();
            let followers: Vec<MiniUser> = (0..roster.len())
                .filter(|&j| follows[j].contains(&i))
                .map(|j| roster[j].clone())
                .collect();

            User {
                id: m.id.clone(),
                username: m.username.clone(),
                fullname: m.fullname.clone().unwrap_or_default(),
                password: None,
                img_url: m.img_url.clone(),
                bio: Some(format!("Hi, I'm {}", m.username)),
                website: None,
                posts_count: posts().iter().filter(|p| p.by.id == m.id).count() as u32,
                followers_count: followers.len() as u32,
                following_count: following.len() as u32,
                followers,
                following,
                liked_post_ids: None,
                saved_post_ids: None,
            }
        })
        .collect()
}

pub fn posts() -> Vec<Post> {
    let roster = roster();
    let now = Utc::now();
    let entries: &[(&str, usize, &str, i64, Option<&str>)] = &[
        ("p201", 0, "Shipping on a Friday, wish me luck", 3, Some("Tel Aviv")),
        ("p202", 1, "Sunrise over the Dead Sea", 5, Some("Ein Bokek")),
        ("p203", 2, "Shakshuka, round three", 8, None),
        ("p204", 0, "New desk setup", 26, None),
        ("p205", 3, "Golden hour in Jaffa", 30, Some("Jaffa Port")),
        ("p206", 0, "Weekend hike", 50, Some("Mount Carmel")),
    ];

    entries
        .iter()
        .map(|&(id, author, caption, hours_ago, place)| Post {
            id: id.to_string(),
            img_url: format!("https://picsum.photos/seed/{}/600/600", id),
            caption: Some(caption.to_string()),
            by: roster[author].clone(),
            created_at: now - Duration::hours(hours_ago),
            likes: PostLikes::default(),
            comments: PostComments::default(),
            saved_by: Vec::new(),
            location: place.map(|name| PostLocation {
                name: name.to_string(),
                lat: None,
                lng: None,
            }),
            tags: Vec::new(),
        })
        .collect()
}

pub fn stories() -> Vec<Story> {
    let roster = roster();
    let now = Utc::now();
    let entries: &[(&str, usize, Option<&str>, i64)] = &[
        ("s301", 1, Some("Good morning!"), 240),
        ("s302", 1, None, 120),
        ("s303", 2, Some("Dinner prep"), 90),
        ("s304", 0, None, 45),
        ("s305", 3, Some("Not followed, not shown"), 30),
        ("s306", 2, None, 15),
    ];

    entries
        .iter()
        .map(|&(id, author, txt, minutes_ago)| {
            let created_at = now - Duration::minutes(minutes_ago);
            Story {
                id: id.to_string(),
                img_url: format!("https://picsum.photos/seed/{}/540/960", id),
                txt: txt.map(str::to_string),
                by: roster[author].clone(),
                created_at,
                viewed_by: Vec::new(),
                expires_at: Some(created_at + Duration::hours(24)),
            }
        })
        .collect()
}
