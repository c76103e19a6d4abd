//! Postgres-backed store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};

use super::models::{
    Bookmark, BookmarkEntry, Instructor, NewPost, NewUser, Post, PostChanges, PostId, PostScope,
    Tag, TagId, TagRef, User, UserId, UserSummary, UserVote, Vote,
};
use super::store::{Store, StoreError, StoreResult};
use crate::vote::{toggle, VoteValue};

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.video_url, p.created_at,
           u.id AS user_id, u.username,
           i.id AS instructor_id, i.name AS instructor_name
    FROM posts p
    JOIN users u ON u.id = p.user_id
    JOIN instructors i ON i.id = p.instructor_id
"#;

#[derive(Debug, FromRow)]
struct PostRow {
    id: PostId,
    title: String,
    description: Option<String>,
    video_url: String,
    created_at: DateTime<Utc>,
    user_id: UserId,
    username: String,
    instructor_id: i64,
    instructor_name: String,
}

impl PostRow {
    fn into_post(self, tags: Vec<TagRef>) -> Post {
        Post {
            id: self.id,
            title: self.title,
            description: self.description,
            video_url: self.video_url,
            created_at: self.created_at,
            user: UserSummary {
                id: self.user_id,
                username: self.username,
            },
            instructor: Instructor {
                id: self.instructor_id,
                name: self.instructor_name,
            },
            tags,
        }
    }
}

/// Unique violations become `Conflict`, foreign key violations `NotFound`.
fn map_constraint(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict;
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound;
        }
    }
    StoreError::Database(err)
}

async fn attach_tags(conn: &mut PgConnection, rows: Vec<PostRow>) -> Result<Vec<Post>, sqlx::Error> {
    let ids: Vec<PostId> = rows.iter().map(|row| row.id).collect();
    let links: Vec<(PostId, TagId, String)> = sqlx::query_as(
        r#"
        SELECT pt.post_id, t.id, t.name
        FROM post_tags pt
        JOIN tags t ON t.id = pt.tag_id
        WHERE pt.post_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_post: HashMap<PostId, Vec<TagRef>> = HashMap::new();
    for (post_id, id, name) in links {
        by_post.entry(post_id).or_default().push(TagRef { id, name });
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = by_post.remove(&row.id).unwrap_or_default();
            row.into_post(tags)
        })
        .collect())
}

async fn fetch_post(conn: &mut PgConnection, id: PostId) -> Result<Option<Post>, sqlx::Error> {
    let row = sqlx::query_as::<_, PostRow>(&format!("{POST_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => Ok(attach_tags(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Insert-or-lookup keyed on the unique instructor name. A concurrent
/// insert of the same name makes ours a no-op and the lookup sees theirs.
async fn instructor_for(conn: &mut PgConnection, name: &str) -> Result<Instructor, sqlx::Error> {
    let inserted = sqlx::query_as::<_, Instructor>(
        "INSERT INTO instructors (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id, name",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    match inserted {
        Some(instructor) => Ok(instructor),
        None => {
            sqlx::query_as::<_, Instructor>("SELECT id, name FROM instructors WHERE name = $1")
                .bind(name)
                .fetch_one(&mut *conn)
                .await
        }
    }
}

/// Upserts a ±1 vote, or deletes the row for `VoteValue::None`.
async fn write_vote(
    conn: &mut PgConnection,
    user_id: UserId,
    post_id: PostId,
    value: VoteValue,
) -> StoreResult<Option<Vote>> {
    if value == VoteValue::None {
        sqlx::query("DELETE FROM votes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *conn)
            .await?;
        return Ok(None);
    }

    let vote = sqlx::query_as::<_, Vote>(
        r#"
        INSERT INTO votes (user_id, post_id, value)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, post_id) DO UPDATE SET value = EXCLUDED.value
        RETURNING user_id, post_id, value
        "#,
    )
    .bind(user_id)
    .bind(post_id)
    .bind(value.as_i16())
    .fetch_one(&mut *conn)
    .await
    .map_err(map_constraint)?;

    Ok(Some(vote))
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> StoreResult<std::time::Duration> {
        let start = std::time::Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, username, email, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_or_create_instructor(&self, name: &str) -> StoreResult<Instructor> {
        let mut conn = self.pool.acquire().await?;
        Ok(instructor_for(&mut conn, name).await?)
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(
            sqlx::query_as::<_, Tag>("SELECT id, name, popularity FROM tags ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_tag(&self, name: &str) -> StoreResult<Tag> {
        sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (name) VALUES ($1) RETURNING id, name, popularity",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let instructor = instructor_for(&mut tx, &post.instructor_name).await?;

        let (post_id,): (PostId,) = sqlx::query_as(
            r#"
            INSERT INTO posts (title, description, video_url, user_id, instructor_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.video_url)
        .bind(post.user_id)
        .bind(instructor.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match map_constraint(e) {
            StoreError::NotFound => {
                StoreError::InvalidReference(format!("Unknown user id {}", post.user_id))
            }
            other => other,
        })?;

        for tag_id in &post.tag_ids {
            let bumped = sqlx::query("UPDATE tags SET popularity = popularity + 1 WHERE id = $1")
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
            if bumped.rows_affected() == 0 {
                return Err(StoreError::InvalidReference(format!("Unknown tag id {tag_id}")));
            }

            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2)")
                .bind(post_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }

        let created = fetch_post(&mut tx, post_id).await?;
        tx.commit().await?;

        created.ok_or(StoreError::NotFound)
    }

    async fn update_post(&self, id: PostId, changes: PostChanges) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let instructor_id = match changes.instructor_name.as_deref() {
            Some(name) => Some(instructor_for(&mut tx, name).await?.id),
            None => None,
        };

        let updated = sqlx::query(
            r#"
            UPDATE posts
            SET title = COALESCE($1, title),
                description = COALESCE($2, description),
                video_url = COALESCE($3, video_url),
                instructor_id = COALESCE($4, instructor_id)
            WHERE id = $5
            "#,
        )
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(&changes.video_url)
        .bind(instructor_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let post = fetch_post(&mut tx, id).await?;
        tx.commit().await?;

        post.ok_or(StoreError::NotFound)
    }

    async fn delete_post(&self, id: PostId) -> StoreResult<()> {
        // post_tags, bookmarks and votes go with it (ON DELETE CASCADE)
        let deleted = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_post(&mut conn, id).await?)
    }

    async fn list_posts(&self, scope: PostScope) -> StoreResult<Vec<Post>> {
        let (owner, bookmarked_by) = match scope {
            PostScope::All => (None, None),
            PostScope::OwnedBy(user_id) => (Some(user_id), None),
            PostScope::BookmarkedBy(user_id) => (None, Some(user_id)),
        };

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            r#"{POST_SELECT}
            WHERE ($1::BIGINT IS NULL OR p.user_id = $1)
              AND ($2::BIGINT IS NULL OR EXISTS (
                    SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = $2))
            ORDER BY p.id ASC
            "#
        ))
        .bind(owner)
        .bind(bookmarked_by)
        .fetch_all(&mut *conn)
        .await?;

        Ok(attach_tags(&mut conn, rows).await?)
    }

    async fn cast_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        value: VoteValue,
    ) -> StoreResult<Option<Vote>> {
        let mut conn = self.pool.acquire().await?;
        let written = write_vote(&mut conn, user_id, post_id, value).await?;

        if written.is_none() {
            let (exists,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)")
                    .bind(post_id)
                    .fetch_one(&mut *conn)
                    .await?;
            if !exists {
                return Err(StoreError::NotFound);
            }
        }
        Ok(written)
    }

    async fn toggle_vote(
        &self,
        user_id: UserId,
        post_id: PostId,
        clicked: VoteValue,
    ) -> StoreResult<Option<Vote>> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the post serializes concurrent toggles on it.
        let locked: Option<(PostId,)> =
            sqlx::query_as("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound);
        }

        let current: Option<(i16,)> =
            sqlx::query_as("SELECT value FROM votes WHERE user_id = $1 AND post_id = $2")
                .bind(user_id)
                .bind(post_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.map_or(VoteValue::None, |(v,)| VoteValue::from_stored(v));

        let written = write_vote(&mut tx, user_id, post_id, toggle(current, clicked)).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn retract_vote(&self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM votes WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn user_votes(&self, user_id: UserId) -> StoreResult<Vec<UserVote>> {
        Ok(sqlx::query_as::<_, UserVote>(
            "SELECT post_id, value FROM votes WHERE user_id = $1 ORDER BY post_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn post_score(&self, post_id: PostId) -> StoreResult<i64> {
        let (score,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(value), 0)::BIGINT FROM votes WHERE post_id = $1")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(score)
    }

    async fn post_scores(&self) -> StoreResult<HashMap<PostId, i64>> {
        let rows: Vec<(PostId, i64)> =
            sqlx::query_as("SELECT post_id, SUM(value)::BIGINT FROM votes GROUP BY post_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn add_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<Bookmark> {
        sqlx::query_as::<_, Bookmark>(
            r#"
            INSERT INTO bookmarks (user_id, post_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, post_id) DO NOTHING
            RETURNING user_id, post_id
            "#,
        )
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_constraint)?
        .ok_or(StoreError::Conflict)
    }

    async fn remove_bookmark(&self, user_id: UserId, post_id: PostId) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND post_id = $2")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_bookmarks(&self, user_id: UserId) -> StoreResult<Vec<BookmarkEntry>> {
        let posts = self.list_posts(PostScope::BookmarkedBy(user_id)).await?;
        Ok(posts
            .into_iter()
            .map(|post| BookmarkEntry {
                user_id,
                post_id: post.id,
                post,
            })
            .collect())
    }

    async fn bookmarked_post_ids(&self, user_id: UserId) -> StoreResult<Vec<PostId>> {
        let rows: Vec<(PostId,)> =
            sqlx::query_as("SELECT post_id FROM bookmarks WHERE user_id = $1 ORDER BY post_id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
