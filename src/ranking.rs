//! Query/ranking engine: filters a candidate set of posts by tag, orders it
//! and annotates it with the viewer's vote and bookmark state.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{Post, PostId, PostScope, TagId, UserId, UserVote};
use crate::db::{Store, StoreResult};
use crate::video::normalize_video_url;
use crate::vote::VoteValue;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid sort option '{0}'. Use newest, oldest or popular.")]
    UnknownSort(String),

    #[error("Invalid tag id '{0}'")]
    InvalidTagId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Most recent first
    #[default]
    Newest,
    Oldest,
    /// Highest live vote score first
    Popular,
}

impl FromStr for SortOrder {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "popular" => Ok(SortOrder::Popular),
            _ => Err(QueryError::UnknownSort(s.to_string())),
        }
    }
}

/// Parses the comma-separated `tags` query value. Blank entries are skipped.
pub fn parse_tag_filter(raw: Option<&str>) -> Result<Vec<TagId>, QueryError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<TagId>()
                .map_err(|_| QueryError::InvalidTagId(part.to_string()))
        })
        .collect()
}

/// What the requesting user has done to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerState {
    pub vote: VoteValue,
    pub bookmarked: bool,
}

/// A viewer's votes and bookmarks, loaded once per request.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    votes: HashMap<PostId, VoteValue>,
    bookmarks: HashSet<PostId>,
}

impl Viewer {
    pub fn new(votes: Vec<UserVote>, bookmarks: Vec<PostId>) -> Self {
        Self {
            votes: votes
                .into_iter()
                .map(|v| (v.post_id, VoteValue::from_stored(v.value)))
                .collect(),
            bookmarks: bookmarks.into_iter().collect(),
        }
    }

    pub async fn load(store: &dyn Store, user_id: UserId) -> StoreResult<Self> {
        let votes = store.user_votes(user_id).await?;
        let bookmarks = store.bookmarked_post_ids(user_id).await?;
        Ok(Self::new(votes, bookmarks))
    }

    pub fn state_for(&self, post_id: PostId) -> ViewerState {
        ViewerState {
            vote: self.votes.get(&post_id).copied().unwrap_or_default(),
            bookmarked: self.bookmarks.contains(&post_id),
        }
    }
}

/// A post as listed: expanded, scored and optionally annotated.
#[derive(Debug, Clone, Serialize)]
pub struct RankedPost {
    #[serde(flatten)]
    pub post: Post,
    pub embed_url: String,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

impl RankedPost {
    pub fn new(post: Post, score: i64, viewer: Option<&Viewer>) -> Self {
        Self {
            embed_url: normalize_video_url(&post.video_url),
            viewer: viewer.map(|v| v.state_for(post.id)),
            score,
            post,
        }
    }
}

/// Keeps posts carrying at least one of `tag_ids` (all posts when empty),
/// then orders them. Ties keep their incoming order.
pub fn rank(
    posts: Vec<Post>,
    tag_ids: &[TagId],
    sort: SortOrder,
    scores: &HashMap<PostId, i64>,
    viewer: Option<&Viewer>,
) -> Vec<RankedPost> {
    let mut ranked: Vec<RankedPost> = posts
        .into_iter()
        .filter(|post| tag_ids.is_empty() || post.has_any_tag(tag_ids))
        .map(|post| {
            let score = scores.get(&post.id).copied().unwrap_or(0);
            RankedPost::new(post, score, viewer)
        })
        .collect();

    match sort {
        SortOrder::Newest => ranked.sort_by(|a, b| b.post.created_at.cmp(&a.post.created_at)),
        SortOrder::Oldest => ranked.sort_by(|a, b| a.post.created_at.cmp(&b.post.created_at)),
        SortOrder::Popular => ranked.sort_by(|a, b| b.score.cmp(&a.score)),
    }

    ranked
}

/// Fetches the posts in `scope` and ranks them for `viewer_id` (anonymous
/// when `None`).
pub async fn list_posts(
    store: &dyn Store,
    scope: PostScope,
    tag_ids: &[TagId],
    sort: SortOrder,
    viewer_id: Option<UserId>,
) -> StoreResult<Vec<RankedPost>> {
    let posts = store.list_posts(scope).await?;
    let scores = store.post_scores().await?;
    let viewer = match viewer_id {
        Some(user_id) => Some(Viewer::load(store, user_id).await?),
        None => None,
    };
    Ok(rank(posts, tag_ids, sort, &scores, viewer.as_ref()))
}
