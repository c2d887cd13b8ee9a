//! Shared fixtures for the async database tests. Each test gets its own
//! in-memory SQLite pool with the migrations applied; a single connection
//! keeps the database alive for the life of the pool.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::database::{event_repo, user_repo, volunteer_repo};
use crate::models::UserRow;

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub struct UserSpec<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email_validated: Option<DateTime<Utc>>,
    pub approved: Option<DateTime<Utc>>,
    pub suspended: Option<DateTime<Utc>>,
    pub cancelled: Option<DateTime<Utc>>,
}

impl Default for UserSpec<'_> {
    fn default() -> Self {
        UserSpec {
            email: "someone@autoperry.test",
            first_name: "Some",
            last_name: "One",
            email_validated: None,
            approved: None,
            suspended: None,
            cancelled: None,
        }
    }
}

pub async fn create_user(pool: &SqlitePool, spec: UserSpec<'_>) -> UserRow {
    let id = user_repo::insert_user(
        pool,
        spec.email,
        "$argon2-test-hash",
        spec.first_name,
        spec.last_name,
        Some("Little Shelford"),
        None,
        Utc::now(),
    )
    .await
    .expect("insert user");
    sqlx::query(
        "UPDATE users SET email_validated = ?2, approved = ?3, suspended = ?4, cancelled = ?5
         WHERE id = ?1",
    )
    .bind(id)
    .bind(spec.email_validated)
    .bind(spec.approved)
    .bind(spec.suspended)
    .bind(spec.cancelled)
    .execute(pool)
    .await
    .expect("stamp user");
    user_repo::find_by_id(pool, id)
        .await
        .expect("reload user")
        .expect("user exists")
}

pub async fn live_user(pool: &SqlitePool, email: &str) -> UserRow {
    let now = Utc::now();
    create_user(
        pool,
        UserSpec {
            email,
            email_validated: Some(now),
            approved: Some(now),
            ..Default::default()
        },
    )
    .await
}

pub async fn create_event(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &str,
    helpers_required: i64,
    owner_id: i64,
) -> i64 {
    event_repo::insert_event(
        pool,
        start,
        end,
        location,
        helpers_required,
        owner_id,
        start,
        None,
        None,
    )
    .await
    .expect("insert event")
}

pub async fn cancel_event(pool: &SqlitePool, event_id: i64, at: DateTime<Utc>) {
    event_repo::set_cancelled(pool, event_id, at)
        .await
        .expect("cancel event");
}

pub async fn add_helper(pool: &SqlitePool, event_id: i64, person_id: i64) -> i64 {
    volunteer_repo::insert(pool, event_id, person_id, Utc::now())
        .await
        .expect("insert volunteer")
}
