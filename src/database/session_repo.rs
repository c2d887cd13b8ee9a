use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::UserRow;

pub async fn create(
    pool: &SqlitePool,
    id: &str,
    user_id: i64,
    created: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO sessions (id, user_id, created) VALUES (?1, ?2, ?3)")
        .bind(id)
        .bind(user_id)
        .bind(created)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolve a session cookie straight to its user row.
pub const SQL_USER_FOR_SESSION: &str = r#"
SELECT u.* FROM users u
JOIN sessions s ON s.user_id = u.id
WHERE s.id = ?1
"#;

pub async fn find_user(pool: &SqlitePool, session_id: &str) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(SQL_USER_FOR_SESSION)
        .bind(session_id)
        .fetch_optional(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, session_id: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE id = ?1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Used on account cancellation so no live session survives the scrub.
pub async fn delete_for_user<'a>(executor: impl SqliteExecutor<'a>, user_id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}
