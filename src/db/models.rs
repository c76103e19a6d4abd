//! Database Models - rows and the expanded views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;
pub type PostId = i64;
pub type TagId = i64;

/// Registered account, including the credential hash. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// New user for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// User as shown to other users
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Instructor {
    pub id: i64,
    pub name: String,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub popularity: i64,
}

/// Tag attached to a post
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TagRef {
    pub id: TagId,
    pub name: String,
}

/// Post expanded with its owner, instructor and tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
    pub instructor: Instructor,
    pub tags: Vec<TagRef>,
}

impl Post {
    pub fn has_any_tag(&self, tag_ids: &[TagId]) -> bool {
        self.tags.iter().any(|tag| tag_ids.contains(&tag.id))
    }
}

/// New post for creation
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    /// Already normalized (trimmed, upper-case).
    pub instructor_name: String,
    /// Distinct tag ids.
    pub tag_ids: Vec<TagId>,
}

/// Post update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub instructor_name: Option<String>,
}

/// Restricts the base set of posts before ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    All,
    OwnedBy(UserId),
    BookmarkedBy(UserId),
}

/// Stored vote; `value` is always +1 or -1.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: UserId,
    pub post_id: PostId,
    pub value: i16,
}

/// A user's vote as reported to that user
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVote {
    pub post_id: PostId,
    pub value: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Bookmark {
    pub user_id: UserId,
    pub post_id: PostId,
}

/// Bookmark with the post it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub user_id: UserId,
    pub post_id: PostId,
    pub post: Post,
}
