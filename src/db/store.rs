use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use super::models::{
    Bookmark, BookmarkEntry, Instructor, NewPost, NewUser, Post, PostChanges, PostId, PostScope,
    Tag, User, UserId, UserVote, Vote,
};
use crate::vote::VoteValue;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record already exists")]
    Conflict,

    /// The operation referenced a user, post or tag that does not exist.
    #[error("{0}")]
    InvalidReference(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for users, posts, tags, bookmarks and votes.
///
/// Every method is a single transaction: either all of its writes land or
/// none do. Uniqueness of (user, post) pairs is enforced here, not by callers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip latency of a trivial query.
    async fn health_check(&self) -> StoreResult<std::time::Duration>;

    // Users

    /// Fails with `Conflict` when the username or email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    // Catalog

    /// Returns the instructor with `name`, creating it if needed. Concurrent
    /// callers with the same name observe the same row.
    async fn find_or_create_instructor(&self, name: &str) -> StoreResult<Instructor>;
    /// All tags, ordered by name ascending.
    async fn list_tags(&self) -> StoreResult<Vec<Tag>>;
    /// Fails with `Conflict` when the name exists.
    async fn create_tag(&self, name: &str) -> StoreResult<Tag>;

    // Posts

    /// Creates the post, links its tags and bumps each tag's popularity.
    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;
    async fn update_post(&self, id: PostId, changes: PostChanges) -> StoreResult<Post>;
    /// Removes the post with its tag links, bookmarks and votes.
    async fn delete_post(&self, id: PostId) -> StoreResult<()>;
    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>>;
    /// Posts in `scope`, in ascending id order.
    async fn list_posts(&self, scope: PostScope) -> StoreResult<Vec<Post>>;

    // Vote ledger

    /// Upserts the (user, post) vote; `VoteValue::None` deletes it instead
    /// and returns `None`, whether or not a row existed.
    async fn cast_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        value: VoteValue,
    ) -> StoreResult<Option<Vote>>;
    /// Applies `vote::toggle` to the stored vote and writes the outcome,
    /// reading and writing under one lock or transaction.
    async fn toggle_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        clicked: VoteValue,
    ) -> StoreResult<Option<Vote>>;
    /// Fails with `NotFound` when the user has no vote on the post.
    async fn retract_vote(&self, user_id: UserId, post_id: PostId) -> StoreResult<()>;
    async fn user_votes(&self, user_id: UserId) -> StoreResult<Vec<UserVote>>;
    /// Sum of the post's vote values, 0 when it has none.
    async fn post_score(&self, post_id: PostId) -> StoreResult<i64>;
    /// Scores of every post that has at least one vote.
    async fn post_scores(&self) -> StoreResult<HashMap<PostId, i64>>;

    // Bookmark ledger

    /// Fails with `Conflict` when the pair is already bookmarked.
    async fn add_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<Bookmark>;
    /// Fails with `NotFound` when the pair is not bookmarked.
    async fn remove_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<()>;
    async fn list_bookmarks(&self, user_id: UserId) -> StoreResult<Vec<BookmarkEntry>>;
    async fn bookmarked_post_ids(&self, user_id: UserId) -> StoreResult<Vec<PostId>>;
}

/// Upper-cases and trims an instructor name before lookup.
pub fn normalize_instructor_name(name: &str) -> String {
    name.trim().to_uppercase()
}
