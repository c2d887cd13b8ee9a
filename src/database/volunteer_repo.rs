use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::{VolunteerRow, VolunteerWithPersonRow};

pub async fn insert<'a>(
    executor: impl SqliteExecutor<'a>,
    event_id: i64,
    person_id: i64,
    created: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO volunteers (event_id, person_id, created) VALUES (?1, ?2, ?3)")
            .bind(event_id)
            .bind(person_id)
            .bind(created)
            .execute(executor)
            .await?;
    Ok(result.last_insert_rowid())
}

/// Insert an offer only while the event still has room. The capacity check
/// and the insert are one statement, so concurrent offers can't overshoot
/// `helpers_required` between a count and an insert.
pub const SQL_INSERT_IF_CAPACITY: &str = r#"
INSERT INTO volunteers (event_id, person_id, created)
SELECT ?1, ?2, ?3
WHERE (SELECT COUNT(*) FROM volunteers
       WHERE event_id = ?1 AND withdrawn IS NULL AND declined IS NULL) < ?4
"#;

/// Returns `None` when the event was already full.
pub async fn insert_if_capacity(
    pool: &SqlitePool,
    event_id: i64,
    person_id: i64,
    created: DateTime<Utc>,
    helpers_required: i64,
) -> sqlx::Result<Option<i64>> {
    let result = sqlx::query(SQL_INSERT_IF_CAPACITY)
        .bind(event_id)
        .bind(person_id)
        .bind(created)
        .bind(helpers_required)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(result.last_insert_rowid()))
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<VolunteerRow>> {
    sqlx::query_as::<_, VolunteerRow>("SELECT * FROM volunteers WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_current(
    pool: &SqlitePool,
    event_id: i64,
    person_id: i64,
) -> sqlx::Result<Option<VolunteerRow>> {
    sqlx::query_as::<_, VolunteerRow>(
        r#"
SELECT * FROM volunteers
WHERE event_id = ?1 AND person_id = ?2 AND withdrawn IS NULL AND declined IS NULL
"#,
    )
    .bind(event_id)
    .bind(person_id)
    .fetch_optional(pool)
    .await
}

pub async fn count_current(pool: &SqlitePool, event_id: i64) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
SELECT COUNT(*) FROM volunteers
WHERE event_id = ?1 AND withdrawn IS NULL AND declined IS NULL
"#,
    )
    .bind(event_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn set_withdrawn<'a>(
    executor: impl SqliteExecutor<'a>,
    id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result =
        sqlx::query("UPDATE volunteers SET withdrawn = ?2 WHERE id = ?1 AND withdrawn IS NULL")
            .bind(id)
            .bind(at)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}

pub async fn set_declined<'a>(
    executor: impl SqliteExecutor<'a>,
    id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result =
        sqlx::query("UPDATE volunteers SET declined = ?2 WHERE id = ?1 AND declined IS NULL")
            .bind(id)
            .bind(at)
            .execute(executor)
            .await?;
    Ok(result.rows_affected())
}

/// Current helpers for an event together with who they are, in the order
/// they volunteered.
pub const SQL_CURRENT_WITH_PERSON: &str = r#"
SELECT v.*, u.first_name, u.last_name, u.email
FROM volunteers v
JOIN users u ON u.id = v.person_id
WHERE v.event_id = ?1 AND v.withdrawn IS NULL AND v.declined IS NULL
ORDER BY v.created
"#;

pub async fn list_current_with_person(
    pool: &SqlitePool,
    event_id: i64,
) -> sqlx::Result<Vec<VolunteerWithPersonRow>> {
    sqlx::query_as::<_, VolunteerWithPersonRow>(SQL_CURRENT_WITH_PERSON)
        .bind(event_id)
        .fetch_all(pool)
        .await
}
