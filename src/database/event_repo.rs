use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};

use crate::models::{EventRow, EventWithHelpersRow};

const HELPERS_AVAILABLE: &str = r#"
(SELECT COUNT(*) FROM volunteers v
 WHERE v.event_id = e.id AND v.withdrawn IS NULL AND v.declined IS NULL)
"#;

pub const SQL_INSERT_EVENT: &str = r#"
INSERT INTO events (start, "end", location, helpers_required, owner_id, created, contact_address, notes)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

#[allow(clippy::too_many_arguments)]
pub async fn insert_event(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &str,
    helpers_required: i64,
    owner_id: i64,
    created: DateTime<Utc>,
    contact_address: Option<&str>,
    notes: Option<&str>,
) -> sqlx::Result<i64> {
    let result = sqlx::query(SQL_INSERT_EVENT)
        .bind(start)
        .bind(end)
        .bind(location)
        .bind(helpers_required)
        .bind(owner_id)
        .bind(created)
        .bind(contact_address)
        .bind(notes)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<EventRow>> {
    sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn update_event(
    pool: &SqlitePool,
    id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: &str,
    helpers_required: i64,
    contact_address: Option<&str>,
    notes: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
UPDATE events
SET start = ?2, "end" = ?3, location = ?4, helpers_required = ?5,
    contact_address = ?6, notes = ?7
WHERE id = ?1
"#,
    )
    .bind(id)
    .bind(start)
    .bind(end)
    .bind(location)
    .bind(helpers_required)
    .bind(contact_address)
    .bind(notes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_cancelled<'a>(
    executor: impl SqliteExecutor<'a>,
    id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result = sqlx::query("UPDATE events SET cancelled = ?2 WHERE id = ?1 AND cancelled IS NULL")
        .bind(id)
        .bind(at)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Upcoming events that still need helpers, for the front page and the
/// advert job.
pub async fn list_needing_helpers(
    pool: &SqlitePool,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> sqlx::Result<Vec<EventWithHelpersRow>> {
    let sql = format!(
        r#"
SELECT e.*, {HELPERS_AVAILABLE} AS helpers_available
FROM events e
WHERE e.cancelled IS NULL
  AND e.start >= ?1 AND e.start <= ?2
  AND e.helpers_required > {HELPERS_AVAILABLE}
ORDER BY e.start, e.location
"#
    );
    sqlx::query_as::<_, EventWithHelpersRow>(&sql)
        .bind(from)
        .bind(until)
        .fetch_all(pool)
        .await
}

/// Filters for the events listing. These arrive as query parameters - the
/// page carries no hidden state.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilters {
    pub include_past: bool,
    pub include_cancelled: bool,
    pub sort_by_location: bool,
}

fn push_filters<'a>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    filters: &EventFilters,
    now: DateTime<Utc>,
) {
    builder.push(" WHERE 1 = 1");
    if !filters.include_past {
        builder.push(" AND e.start >= ").push_bind(now);
    }
    if !filters.include_cancelled {
        builder.push(" AND e.cancelled IS NULL");
    }
}

pub async fn list_page(
    pool: &SqlitePool,
    filters: &EventFilters,
    now: DateTime<Utc>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<EventWithHelpersRow>> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT e.*, {HELPERS_AVAILABLE} AS helpers_available FROM events e"
    ));
    push_filters(&mut builder, filters, now);
    if filters.sort_by_location {
        builder.push(" ORDER BY e.location, e.start");
    } else {
        builder.push(" ORDER BY e.start");
    }
    builder.push(" LIMIT ").push_bind(limit);
    builder.push(" OFFSET ").push_bind(offset);
    builder.build_query_as().fetch_all(pool).await
}

pub async fn count_matching(
    pool: &SqlitePool,
    filters: &EventFilters,
    now: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM events e");
    push_filters(&mut builder, filters, now);
    let (count,): (i64,) = builder.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

pub async fn list_owned(
    pool: &SqlitePool,
    filters: &EventFilters,
    now: DateTime<Utc>,
    owner_id: i64,
) -> sqlx::Result<Vec<EventWithHelpersRow>> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT e.*, {HELPERS_AVAILABLE} AS helpers_available FROM events e"
    ));
    push_filters(&mut builder, filters, now);
    builder.push(" AND e.owner_id = ").push_bind(owner_id);
    builder.push(" ORDER BY e.start");
    builder.build_query_as().fetch_all(pool).await
}

pub async fn list_volunteered(
    pool: &SqlitePool,
    filters: &EventFilters,
    now: DateTime<Utc>,
    person_id: i64,
) -> sqlx::Result<Vec<EventWithHelpersRow>> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT e.*, {HELPERS_AVAILABLE} AS helpers_available FROM events e"
    ));
    push_filters(&mut builder, filters, now);
    builder
        .push(
            " AND e.id IN (SELECT event_id FROM volunteers
               WHERE withdrawn IS NULL AND declined IS NULL AND person_id = ",
        )
        .push_bind(person_id)
        .push(")");
    builder.push(" ORDER BY e.start");
    builder.build_query_as().fetch_all(pool).await
}

/// Known locations, for the datalist on the event form.
pub async fn list_locations(pool: &SqlitePool) -> sqlx::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT location FROM events WHERE cancelled IS NULL ORDER BY location",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(l,)| l).collect())
}

/// Non-cancelled events at the same location overlapping [start, end).
/// The half-open interval test: existing.start < end AND existing.end > start.
pub const SQL_CLASHES_AT_LOCATION: &str = r#"
SELECT * FROM events
WHERE cancelled IS NULL
  AND location = ?1
  AND start < ?3 AND "end" > ?2
  AND id != ?4
ORDER BY start
"#;

pub async fn clashes_at_location(
    pool: &SqlitePool,
    location: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: i64,
) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(SQL_CLASHES_AT_LOCATION)
        .bind(location)
        .bind(start)
        .bind(end)
        .bind(exclude_id)
        .fetch_all(pool)
        .await
}

pub async fn future_owned_by(
    pool: &SqlitePool,
    owner_id: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(
        r#"
SELECT * FROM events
WHERE owner_id = ?1 AND cancelled IS NULL AND start >= ?2
ORDER BY start
"#,
    )
    .bind(owner_id)
    .bind(now)
    .fetch_all(pool)
    .await
}

/// Future non-cancelled events the person currently volunteers for.
pub const SQL_FUTURE_VOLUNTEERED: &str = r#"
SELECT e.* FROM events e
JOIN volunteers v ON v.event_id = e.id
WHERE v.person_id = ?1 AND v.withdrawn IS NULL AND v.declined IS NULL
  AND e.cancelled IS NULL AND e.start >= ?2
ORDER BY e.start
"#;

pub async fn future_volunteered_by(
    pool: &SqlitePool,
    person_id: i64,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(SQL_FUTURE_VOLUNTEERED)
        .bind(person_id)
        .bind(now)
        .fetch_all(pool)
        .await
}

/// Every non-cancelled event the person currently volunteers for,
/// regardless of when it happens. The clash check filters these in memory.
pub async fn all_volunteered_by(pool: &SqlitePool, person_id: i64) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(
        r#"
SELECT e.* FROM events e
JOIN volunteers v ON v.event_id = e.id
WHERE v.person_id = ?1 AND v.withdrawn IS NULL AND v.declined IS NULL
  AND e.cancelled IS NULL
ORDER BY e.start
"#,
    )
    .bind(person_id)
    .fetch_all(pool)
    .await
}

/// Current commitments for the helper digest window.
pub async fn volunteered_between(
    pool: &SqlitePool,
    person_id: i64,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(
        r#"
SELECT e.* FROM events e
JOIN volunteers v ON v.event_id = e.id
WHERE v.person_id = ?1 AND v.withdrawn IS NULL AND v.declined IS NULL
  AND e.cancelled IS NULL AND e.start > ?2 AND e.start < ?3
ORDER BY e.start
"#,
    )
    .bind(person_id)
    .bind(from)
    .bind(until)
    .fetch_all(pool)
    .await
}

/// Events whose owner still has to be reminded: starting soon, not
/// cancelled, reminder not yet stamped, owner has notifications on.
pub const SQL_OWNER_REMINDER_CANDIDATES: &str = r#"
SELECT e.* FROM events e
JOIN users u ON u.id = e.owner_id
WHERE e.cancelled IS NULL
  AND e.owner_reminded IS NULL
  AND e.start > ?1 AND e.start <= ?2
  AND u.send_notifications = 1
ORDER BY e.start
"#;

pub async fn owner_reminder_candidates(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> sqlx::Result<Vec<EventRow>> {
    sqlx::query_as::<_, EventRow>(SQL_OWNER_REMINDER_CANDIDATES)
        .bind(now)
        .bind(cutoff)
        .fetch_all(pool)
        .await
}

pub async fn set_owner_reminded(pool: &SqlitePool, id: i64, at: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE events SET owner_reminded = ?2 WHERE id = ?1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}
