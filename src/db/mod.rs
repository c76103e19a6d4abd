pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{normalize_instructor_name, Store, StoreError, StoreResult};

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::config::DbConfig;

/// Schema, one statement per entry. Every child row cascades with its post
/// or user, and each (user, post) ledger pair is unique.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT UNIQUE NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS instructors (
        id BIGSERIAL PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id BIGSERIAL PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        popularity BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        video_url TEXT NOT NULL,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        instructor_id BIGINT NOT NULL REFERENCES instructors(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS post_tags (
        post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        tag_id BIGINT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (post_id, tag_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id)",
    r#"
    CREATE TABLE IF NOT EXISTS bookmarks (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, post_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_bookmarks_post_id ON bookmarks(post_id)",
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        post_id BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        value SMALLINT NOT NULL CHECK (value IN (-1, 1)),
        PRIMARY KEY (user_id, post_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_votes_post_id ON votes(post_id)",
];

pub async fn init_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Initializing database connection pool...");
    tracing::debug!(
        "Database URL: {}",
        config.url.replace(
            |c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '@' && c != '.',
            "*"
        )
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }

    tracing::info!(statements = SCHEMA.len(), "Database migrations completed successfully");

    Ok(())
}
