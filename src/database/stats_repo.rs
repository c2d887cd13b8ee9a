use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PeopleTotalsRow {
    pub live: i64,
    pub pending: i64,
    pub suspended: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MonthEventsRow {
    pub month: String,
    pub events: i64,
    pub cancelled_events: i64,
    pub owners: i64,
    pub locations: i64,
    pub helpers_wanted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MonthHelpersRow {
    pub month: String,
    pub helpers_provided: i64,
    pub distinct_helpers: i64,
    pub helpers_cancelled: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EventTotalsRow {
    pub events: i64,
    pub cancelled_events: i64,
    pub owners: i64,
    pub locations: i64,
    pub helpers_wanted: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct HelperTotalsRow {
    pub helpers_provided: i64,
    pub distinct_helpers: i64,
    pub helpers_cancelled: i64,
}

pub const SQL_PEOPLE_TOTALS: &str = r#"
SELECT
    COUNT(*) FILTER (WHERE email_validated IS NOT NULL AND approved IS NOT NULL
                       AND suspended IS NULL AND cancelled IS NULL) AS live,
    COUNT(*) FILTER (WHERE (email_validated IS NULL OR approved IS NULL)
                       AND suspended IS NULL AND cancelled IS NULL) AS pending,
    COUNT(*) FILTER (WHERE suspended IS NOT NULL AND cancelled IS NULL) AS suspended,
    COUNT(*) FILTER (WHERE cancelled IS NOT NULL) AS cancelled
FROM users
"#;

pub async fn people_totals(pool: &SqlitePool) -> sqlx::Result<PeopleTotalsRow> {
    sqlx::query_as::<_, PeopleTotalsRow>(SQL_PEOPLE_TOTALS)
        .fetch_one(pool)
        .await
}

// The events side and the helpers side are grouped separately: joining
// volunteers onto the event aggregation would fan out the helpers_wanted
// sums. Both queries order by month so the caller can zip them up.

pub const SQL_EVENTS_BY_MONTH: &str = r#"
SELECT strftime('%Y-%m', e.start) AS month,
    COUNT(*) FILTER (WHERE e.cancelled IS NULL) AS events,
    COUNT(*) FILTER (WHERE e.cancelled IS NOT NULL) AS cancelled_events,
    COUNT(DISTINCT e.owner_id) AS owners,
    COUNT(DISTINCT e.location) AS locations,
    COALESCE(SUM(CASE WHEN e.cancelled IS NULL THEN e.helpers_required ELSE 0 END), 0)
        AS helpers_wanted
FROM events e
WHERE e.start < ?1
GROUP BY month
ORDER BY month
"#;

pub async fn events_by_month(
    pool: &SqlitePool,
    as_of: DateTime<Utc>,
) -> sqlx::Result<Vec<MonthEventsRow>> {
    sqlx::query_as::<_, MonthEventsRow>(SQL_EVENTS_BY_MONTH)
        .bind(as_of)
        .fetch_all(pool)
        .await
}

pub const SQL_HELPERS_BY_MONTH: &str = r#"
SELECT strftime('%Y-%m', e.start) AS month,
    COUNT(*) FILTER (WHERE e.cancelled IS NULL
                       AND v.withdrawn IS NULL AND v.declined IS NULL) AS helpers_provided,
    COUNT(DISTINCT CASE WHEN v.withdrawn IS NULL AND v.declined IS NULL
                        THEN v.person_id END) AS distinct_helpers,
    COUNT(*) FILTER (WHERE e.cancelled IS NOT NULL
                       AND v.withdrawn IS NULL AND v.declined IS NULL) AS helpers_cancelled
FROM volunteers v
JOIN events e ON e.id = v.event_id
WHERE e.start < ?1
GROUP BY month
ORDER BY month
"#;

pub async fn helpers_by_month(
    pool: &SqlitePool,
    as_of: DateTime<Utc>,
) -> sqlx::Result<Vec<MonthHelpersRow>> {
    sqlx::query_as::<_, MonthHelpersRow>(SQL_HELPERS_BY_MONTH)
        .bind(as_of)
        .fetch_all(pool)
        .await
}

pub const SQL_EVENT_TOTALS: &str = r#"
SELECT
    COUNT(*) FILTER (WHERE e.cancelled IS NULL) AS events,
    COUNT(*) FILTER (WHERE e.cancelled IS NOT NULL) AS cancelled_events,
    COUNT(DISTINCT e.owner_id) AS owners,
    COUNT(DISTINCT e.location) AS locations,
    COALESCE(SUM(CASE WHEN e.cancelled IS NULL THEN e.helpers_required ELSE 0 END), 0)
        AS helpers_wanted
FROM events e
WHERE e.start < ?1
"#;

pub async fn event_totals(pool: &SqlitePool, as_of: DateTime<Utc>) -> sqlx::Result<EventTotalsRow> {
    sqlx::query_as::<_, EventTotalsRow>(SQL_EVENT_TOTALS)
        .bind(as_of)
        .fetch_one(pool)
        .await
}

pub const SQL_HELPER_TOTALS: &str = r#"
SELECT
    COUNT(*) FILTER (WHERE e.cancelled IS NULL
                       AND v.withdrawn IS NULL AND v.declined IS NULL) AS helpers_provided,
    COUNT(DISTINCT CASE WHEN v.withdrawn IS NULL AND v.declined IS NULL
                        THEN v.person_id END) AS distinct_helpers,
    COUNT(*) FILTER (WHERE e.cancelled IS NOT NULL
                       AND v.withdrawn IS NULL AND v.declined IS NULL) AS helpers_cancelled
FROM volunteers v
JOIN events e ON e.id = v.event_id
WHERE e.start < ?1
"#;

pub async fn helper_totals(
    pool: &SqlitePool,
    as_of: DateTime<Utc>,
) -> sqlx::Result<HelperTotalsRow> {
    sqlx::query_as::<_, HelperTotalsRow>(SQL_HELPER_TOTALS)
        .bind(as_of)
        .fetch_one(pool)
        .await
}
