//! In-memory store used when no database is configured, and by the tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::models::{
    Bookmark, BookmarkEntry, Instructor, NewPost, NewUser, Post, PostChanges, PostId, PostScope,
    Tag, TagId, TagRef, User, UserId, UserSummary, UserVote, Vote,
};
use super::store::{Store, StoreError, StoreResult};
use crate::vote::{toggle, VoteValue};

#[derive(Debug, Clone)]
struct PostRecord {
    id: PostId,
    title: String,
    description: Option<String>,
    video_url: String,
    created_at: DateTime<Utc>,
    user_id: UserId,
    instructor_id: i64,
}

#[derive(Debug, Default)]
struct Data {
    next_id: i64,
    last_created_at: Option<DateTime<Utc>>,
    users: BTreeMap<UserId, User>,
    instructors: BTreeMap<i64, Instructor>,
    tags: BTreeMap<TagId, Tag>,
    posts: BTreeMap<PostId, PostRecord>,
    post_tags: BTreeSet<(PostId, TagId)>,
    bookmarks: BTreeSet<(UserId, PostId)>,
    votes: BTreeMap<(UserId, PostId), i16>,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Creation timestamps are strictly increasing so ordering by time
    /// matches insertion order.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn instructor_for(&mut self, name: &str) -> Instructor {
        if let Some(existing) = self.instructors.values().find(|i| i.name == name) {
            return existing.clone();
        }
        let instructor = Instructor {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.instructors.insert(instructor.id, instructor.clone());
        instructor
    }

    fn expand(&self, record: &PostRecord) -> Post {
        let user = self
            .users
            .get(&record.user_id)
            .map(|u| UserSummary {
                id: u.id,
                username: u.username.clone(),
            })
            .unwrap_or_else(|| UserSummary {
                id: record.user_id,
                username: String::new(),
            });
        let instructor = self
            .instructors
            .get(&record.instructor_id)
            .cloned()
            .unwrap_or_else(|| Instructor {
                id: record.instructor_id,
                name: String::new(),
            });
        let mut tags: Vec<TagRef> = self
            .post_tags
            .range((record.id, TagId::MIN)..=(record.id, TagId::MAX))
            .filter_map(|(_, tag_id)| self.tags.get(tag_id))
            .map(|t| TagRef {
                id: t.id,
                name: t.name.clone(),
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Post {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            video_url: record.video_url.clone(),
            created_at: record.created_at,
            user,
            instructor,
            tags,
        }
    }

    fn post(&self, id: PostId) -> Option<Post> {
        self.posts.get(&id).map(|record| self.expand(record))
    }

    fn set_vote(&mut self, user_id: UserId, post_id: PostId, value: VoteValue) -> Option<Vote> {
        if value == VoteValue::None {
            self.votes.remove(&(user_id, post_id));
            return None;
        }
        self.votes.insert((user_id, post_id), value.as_i16());
        Some(Vote {
            user_id,
            post_id,
            value: value.as_i16(),
        })
    }

    fn check_vote_target(&self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        if self.users.contains_key(&user_id) && self.posts.contains_key(&post_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> StoreResult<std::time::Duration> {
        let start = std::time::Instant::now();
        let _ = self.data.read().await;
        Ok(start.elapsed())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut data = self.data.write().await;
        if data
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(StoreError::Conflict);
        }
        let created = User {
            id: data.next_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
        };
        data.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let data = self.data.read().await;
        Ok(data.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let data = self.data.read().await;
        Ok(data.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.data.read().await.users.get(&id).cloned())
    }

    async fn find_or_create_instructor(&self, name: &str) -> StoreResult<Instructor> {
        Ok(self.data.write().await.instructor_for(name))
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let data = self.data.read().await;
        let mut tags: Vec<Tag> = data.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create_tag(&self, name: &str) -> StoreResult<Tag> {
        let mut data = self.data.write().await;
        if data.tags.values().any(|t| t.name == name) {
            return Err(StoreError::Conflict);
        }
        let tag = Tag {
            id: data.next_id(),
            name: name.to_string(),
            popularity: 0,
        };
        data.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut data = self.data.write().await;

        if !data.users.contains_key(&post.user_id) {
            return Err(StoreError::InvalidReference(format!(
                "Unknown user id {}",
                post.user_id
            )));
        }
        if let Some(missing) = post.tag_ids.iter().find(|id| !data.tags.contains_key(*id)) {
            return Err(StoreError::InvalidReference(format!(
                "Unknown tag id {missing}"
            )));
        }

        let instructor = data.instructor_for(&post.instructor_name);
        let record = PostRecord {
            id: data.next_id(),
            title: post.title,
            description: post.description,
            video_url: post.video_url,
            created_at: data.next_timestamp(),
            user_id: post.user_id,
            instructor_id: instructor.id,
        };
        for tag_id in &post.tag_ids {
            if data.post_tags.insert((record.id, *tag_id)) {
                if let Some(tag) = data.tags.get_mut(tag_id) {
                    tag.popularity += 1;
                }
            }
        }
        let id = record.id;
        data.posts.insert(id, record);
        data.post(id).ok_or(StoreError::NotFound)
    }

    async fn update_post(&self, id: PostId, changes: PostChanges) -> StoreResult<Post> {
        let mut data = self.data.write().await;
        if !data.posts.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let instructor = changes
            .instructor_name
            .as_deref()
            .map(|name| data.instructor_for(name));

        let record = data.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(title) = changes.title {
            record.title = title;
        }
        if let Some(description) = changes.description {
            record.description = Some(description);
        }
        if let Some(video_url) = changes.video_url {
            record.video_url = video_url;
        }
        if let Some(instructor) = instructor {
            record.instructor_id = instructor.id;
        }
        data.post(id).ok_or(StoreError::NotFound)
    }

    async fn delete_post(&self, id: PostId) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.posts.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        data.post_tags.retain(|(post_id, _)| *post_id != id);
        data.bookmarks.retain(|(_, post_id)| *post_id != id);
        data.votes.retain(|(_, post_id), _| *post_id != id);
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.data.read().await.post(id))
    }

    async fn list_posts(&self, scope: PostScope) -> StoreResult<Vec<Post>> {
        let data = self.data.read().await;
        Ok(data
            .posts
            .values()
            .filter(|record| match scope {
                PostScope::All => true,
                PostScope::OwnedBy(user_id) => record.user_id == user_id,
                PostScope::BookmarkedBy(user_id) => data.bookmarks.contains(&(user_id, record.id)),
            })
            .map(|record| data.expand(record))
            .collect())
    }

    async fn cast_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        value: VoteValue,
    ) -> StoreResult<Option<Vote>> {
        let mut data = self.data.write().await;
        data.check_vote_target(user_id, post_id)?;
        Ok(data.set_vote(user_id, post_id, value))
    }

    async fn toggle_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        clicked: VoteValue,
    ) -> StoreResult<Option<Vote>> {
        let mut data = self.data.write().await;
        data.check_vote_target(user_id, post_id)?;
        let current = data
            .votes
            .get(&(user_id, post_id))
            .map_or(VoteValue::None, |v| VoteValue::from_stored(*v));
        Ok(data.set_vote(user_id, post_id, toggle(current, clicked)))
    }

    async fn retract_vote(&self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.votes
            .remove(&(user_id, post_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn user_votes(&self, user_id: UserId) -> StoreResult<Vec<UserVote>> {
        let data = self.data.read().await;
        Ok(data
            .votes
            .iter()
            .filter(|((voter, _), _)| *voter == user_id)
            .map(|((_, post_id), value)| UserVote {
                post_id: *post_id,
                value: *value,
            })
            .collect())
    }

    async fn post_score(&self, post_id: PostId) -> StoreResult<i64> {
        let data = self.data.read().await;
        Ok(data
            .votes
            .iter()
            .filter(|((_, post), _)| *post == post_id)
            .map(|(_, value)| i64::from(*value))
            .sum())
    }

    async fn post_scores(&self) -> StoreResult<HashMap<PostId, i64>> {
        let data = self.data.read().await;
        let mut scores = HashMap::new();
        for ((_, post_id), value) in &data.votes {
            *scores.entry(*post_id).or_insert(0) += i64::from(*value);
        }
        Ok(scores)
    }

    async fn add_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<Bookmark> {
        let mut data = self.data.write().await;
        data.check_vote_target(user_id, post_id)?;
        if !data.bookmarks.insert((user_id, post_id)) {
            return Err(StoreError::Conflict);
        }
        Ok(Bookmark { user_id, post_id })
    }

    async fn remove_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        let mut data = self.data.write().await;
        if data.bookmarks.remove(&(user_id, post_id)) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn list_bookmarks(&self, user_id: UserId) -> StoreResult<Vec<BookmarkEntry>> {
        let data = self.data.read().await;
        Ok(data
            .bookmarks
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .filter_map(|(_, post_id)| {
                data.post(*post_id).map(|post| BookmarkEntry {
                    user_id,
                    post_id: *post_id,
                    post,
                })
            })
            .collect())
    }

    async fn bookmarked_post_ids(&self, user_id: UserId) -> StoreResult<Vec<PostId>> {
        let data = self.data.read().await;
        Ok(data
            .bookmarks
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, post_id)| *post_id)
            .collect())
    }
}
