use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::UserRow;

pub const SQL_INSERT_USER: &str = r#"
INSERT INTO users (email, password_hash, first_name, last_name, tower, phone_number, created)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

#[allow(clippy::too_many_arguments)]
pub async fn insert_user(
    pool: &SqlitePool,
    email: &str,
    password_hash: &str,
    first_name: &str,
    last_name: &str,
    tower: Option<&str>,
    phone_number: Option<&str>,
    created: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let result = sqlx::query(SQL_INSERT_USER)
        .bind(email)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(tower)
        .bind(phone_number)
        .bind(created)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?1")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn update_details(
    pool: &SqlitePool,
    id: i64,
    email: &str,
    first_name: &str,
    last_name: &str,
    tower: Option<&str>,
    phone_number: Option<&str>,
    send_notifications: bool,
    send_other: bool,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
UPDATE users
SET email = ?2, first_name = ?3, last_name = ?4, tower = ?5, phone_number = ?6,
    send_notifications = ?7, send_other = ?8
WHERE id = ?1
"#,
    )
    .bind(id)
    .bind(email)
    .bind(first_name)
    .bind(last_name)
    .bind(tower)
    .bind(phone_number)
    .bind(send_notifications)
    .bind(send_other)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_email_validated(
    pool: &SqlitePool,
    id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET email_validated = ?2 WHERE id = ?1 AND email_validated IS NULL")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// A changed address has to be confirmed all over again.
pub async fn clear_email_validated(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET email_validated = NULL WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_approved(pool: &SqlitePool, id: i64, at: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET approved = ?2 WHERE id = ?1 AND approved IS NULL")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_suspended(
    pool: &SqlitePool,
    id: i64,
    at: Option<DateTime<Utc>>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET suspended = ?2 WHERE id = ?1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Terminal: marks the account cancelled, removes personal data and leaves
/// an unusable password hash so the login can never succeed again.
pub const SQL_CANCEL_USER: &str = r#"
UPDATE users
SET cancelled = ?2,
    email = 'cancelled_' || id,
    first_name = '',
    last_name = 'Cancelled user #' || id,
    tower = NULL,
    phone_number = NULL,
    password_hash = ''
WHERE id = ?1 AND cancelled IS NULL
"#;

pub async fn cancel_and_scrub<'a>(
    executor: impl SqliteExecutor<'a>,
    id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(SQL_CANCEL_USER)
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list_all(pool: &SqlitePool) -> sqlx::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY last_name, first_name")
        .fetch_all(pool)
        .await
}

/// Accounts still waiting for an administrator, oldest first.
pub const SQL_AWAITING_APPROVAL: &str = r#"
SELECT * FROM users
WHERE approved IS NULL AND cancelled IS NULL AND suspended IS NULL
  AND created <= ?1
ORDER BY created
"#;

pub async fn list_awaiting_approval(
    pool: &SqlitePool,
    joined_before: DateTime<Utc>,
) -> sqlx::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>(SQL_AWAITING_APPROVAL)
        .bind(joined_before)
        .fetch_all(pool)
        .await
}

/// Live users who opted into emails beyond their own events.
pub const SQL_ADVERT_RECIPIENTS: &str = r#"
SELECT * FROM users
WHERE send_other = 1
  AND cancelled IS NULL AND suspended IS NULL AND email_blocked IS NULL
  AND email_validated IS NOT NULL AND approved IS NOT NULL
ORDER BY email
"#;

pub async fn list_advert_recipients(pool: &SqlitePool) -> sqlx::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>(SQL_ADVERT_RECIPIENTS)
        .fetch_all(pool)
        .await
}

/// Candidates for the weekly helper digest.
pub const SQL_DIGEST_RECIPIENTS: &str = r#"
SELECT * FROM users
WHERE send_notifications = 1
  AND cancelled IS NULL AND suspended IS NULL AND email_blocked IS NULL
  AND email_validated IS NOT NULL AND approved IS NOT NULL
ORDER BY id
"#;

pub async fn list_digest_recipients(pool: &SqlitePool) -> sqlx::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>(SQL_DIGEST_RECIPIENTS)
        .fetch_all(pool)
        .await
}

pub async fn set_reminded_upto(
    pool: &SqlitePool,
    id: i64,
    upto: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET reminded_upto = ?2 WHERE id = ?1")
        .bind(id)
        .bind(upto)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_admins(pool: &SqlitePool) -> sqlx::Result<Vec<UserRow>> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE is_admin = 1 AND cancelled IS NULL")
        .fetch_all(pool)
        .await
}
