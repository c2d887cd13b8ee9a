//! Event clash detection. Two events clash when their half-open intervals
//! [start, end) intersect. The same test backs both the location check when
//! creating or editing an event and the personal-calendar check when
//! volunteering; only the scoping differs.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::event_repo;
use crate::models::EventRow;

pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Non-cancelled events at `location` overlapping [start, end), excluding
/// the event being edited (0 when creating).
pub async fn event_clashes(
    pool: &SqlitePool,
    location: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: i64,
) -> sqlx::Result<Vec<EventRow>> {
    event_repo::clashes_at_location(pool, location, start, end, exclude_id).await
}

/// Events the person has currently volunteered for that overlap the given
/// event, at any location.
pub async fn volunteer_clashes(
    pool: &SqlitePool,
    person_id: i64,
    event: &EventRow,
) -> sqlx::Result<Vec<EventRow>> {
    let commitments = event_repo::all_volunteered_by(pool, person_id).await?;
    Ok(commitments
        .into_iter()
        .filter(|c| c.id != event.id && overlaps(c.start, c.end, event.start, event.end))
        .collect())
}

/// One user-facing line per conflict, joined by the form error rendering.
pub fn describe_clashes(clashes: &[EventRow]) -> String {
    let lines: Vec<String> = clashes
        .iter()
        .map(|e| format!("{} ({})", e.location, e.short_when()))
        .collect();
    lines.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::{Duration, TimeZone};

    #[test]
    fn overlap_predicate_covers_all_relative_positions() {
        let start = Utc.with_ymd_and_hms(1960, 3, 5, 12, 0, 0).unwrap();
        let end = start + Duration::hours(2);

        let well_before = start - Duration::hours(2);
        let before = start - Duration::hours(1);
        let just_started = start + Duration::minutes(5);
        let middle = start + Duration::hours(1);
        let almost_finished = end - Duration::minutes(5);
        let after = end + Duration::hours(1);
        let well_after = end + Duration::hours(2);

        // Clear of the event, including exactly adjacent intervals
        assert!(!overlaps(well_before, before, start, end));
        assert!(!overlaps(before, start, start, end));
        assert!(!overlaps(end, after, start, end));
        assert!(!overlaps(after, well_after, start, end));

        // Everything touching the interior clashes
        assert!(overlaps(before, middle, start, end));
        assert!(overlaps(before, end, start, end));
        assert!(overlaps(before, after, start, end));
        assert!(overlaps(start, middle, start, end));
        assert!(overlaps(start, end, start, end));
        assert!(overlaps(start, after, start, end));
        assert!(overlaps(just_started, almost_finished, start, end));
        assert!(overlaps(middle, end, start, end));
        assert!(overlaps(middle, after, start, end));
    }

    #[tokio::test]
    async fn event_clashes_scope_to_location() {
        let pool = testutil::test_pool().await;
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;

        let start = Utc.with_ymd_and_hms(1960, 3, 5, 12, 0, 0).unwrap();
        let end = start + Duration::hours(2);
        testutil::create_event(&pool, start, end, "Little Shelford", 2, owner.id).await;

        let shifted_start = start + Duration::hours(1);
        let shifted_end = end + Duration::hours(1);

        let here = event_clashes(&pool, "Little Shelford", shifted_start, shifted_end, 0)
            .await
            .unwrap();
        assert_eq!(here.len(), 1);

        let elsewhere = event_clashes(&pool, "Whittlesford", shifted_start, shifted_end, 0)
            .await
            .unwrap();
        assert!(elsewhere.is_empty());

        // Adjacent interval does not clash
        let adjacent = event_clashes(&pool, "Little Shelford", end, end + Duration::hours(1), 0)
            .await
            .unwrap();
        assert!(adjacent.is_empty());
    }

    #[tokio::test]
    async fn cancelled_events_and_the_event_itself_are_ignored() {
        let pool = testutil::test_pool().await;
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;

        let start = Utc.with_ymd_and_hms(1960, 3, 5, 12, 0, 0).unwrap();
        let end = start + Duration::hours(2);
        let event_id =
            testutil::create_event(&pool, start, end, "Little Shelford", 2, owner.id).await;

        let excluding_self = event_clashes(&pool, "Little Shelford", start, end, event_id)
            .await
            .unwrap();
        assert!(excluding_self.is_empty());

        testutil::cancel_event(&pool, event_id, end).await;
        let after_cancel = event_clashes(&pool, "Little Shelford", start, end, 0)
            .await
            .unwrap();
        assert!(after_cancel.is_empty());
    }

    #[tokio::test]
    async fn volunteer_clashes_cover_any_location() {
        let pool = testutil::test_pool().await;
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;

        let start = Utc.with_ymd_and_hms(1960, 3, 5, 12, 0, 0).unwrap();
        let end = start + Duration::hours(2);
        let committed =
            testutil::create_event(&pool, start, end, "Little Shelford", 2, owner.id).await;
        testutil::add_helper(&pool, committed, helper.id).await;

        // Overlapping event somewhere else entirely
        let other_id = testutil::create_event(
            &pool,
            start + Duration::hours(1),
            end + Duration::hours(1),
            "Whittlesford",
            1,
            owner.id,
        )
        .await;
        let other = crate::database::event_repo::find_by_id(&pool, other_id)
            .await
            .unwrap()
            .unwrap();

        let clashes = volunteer_clashes(&pool, helper.id, &other).await.unwrap();
        assert_eq!(clashes.len(), 1);
        assert_eq!(clashes[0].id, committed);

        // A bystander has no commitments to clash with
        let clashes = volunteer_clashes(&pool, owner.id, &other).await.unwrap();
        assert!(clashes.is_empty());
    }
}
