//! The statistics screen: population totals plus a per-month breakdown of
//! events and helping, over everything that started before the report
//! instant.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::stats_repo::{
    self, EventTotalsRow, HelperTotalsRow, MonthEventsRow, MonthHelpersRow, PeopleTotalsRow,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthSummary {
    pub month: String,
    pub events: i64,
    pub cancelled_events: i64,
    pub owners: i64,
    pub locations: i64,
    pub helpers_wanted: i64,
    pub helpers_provided: i64,
    pub distinct_helpers: i64,
    pub helpers_cancelled: i64,
}

#[derive(Debug, Clone)]
pub struct StatsScreen {
    pub people: PeopleTotalsRow,
    pub months: Vec<MonthSummary>,
    pub event_totals: EventTotalsRow,
    pub helper_totals: HelperTotalsRow,
}

pub async fn build_stats_screen(pool: &SqlitePool, as_of: DateTime<Utc>) -> sqlx::Result<StatsScreen> {
    let people = stats_repo::people_totals(pool).await?;
    let events = stats_repo::events_by_month(pool, as_of).await?;
    let helpers = stats_repo::helpers_by_month(pool, as_of).await?;
    let event_totals = stats_repo::event_totals(pool, as_of).await?;
    let helper_totals = stats_repo::helper_totals(pool, as_of).await?;

    Ok(StatsScreen {
        people,
        months: zip_months(events, helpers),
        event_totals,
        helper_totals,
    })
}

/// Both queries come back ordered by month, but the helpers side can skip a
/// month with no volunteering at all, so this is a merge rather than a
/// straight zip.
fn zip_months(events: Vec<MonthEventsRow>, helpers: Vec<MonthHelpersRow>) -> Vec<MonthSummary> {
    let mut helpers = helpers.into_iter().peekable();
    let mut months = Vec::with_capacity(events.len());

    for e in events {
        let h = match helpers.peek() {
            Some(h) if h.month == e.month => helpers.next().unwrap(),
            _ => MonthHelpersRow {
                month: e.month.clone(),
                helpers_provided: 0,
                distinct_helpers: 0,
                helpers_cancelled: 0,
            },
        };
        months.push(MonthSummary {
            month: e.month,
            events: e.events,
            cancelled_events: e.cancelled_events,
            owners: e.owners,
            locations: e.locations,
            helpers_wanted: e.helpers_wanted,
            helpers_provided: h.helpers_provided,
            distinct_helpers: h.distinct_helpers,
            helpers_cancelled: h.helpers_cancelled,
        });
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, UserSpec};
    use chrono::{Duration, TimeZone};

    // The fixture: four users across the lifecycle buckets and six events
    // over March, April and (still in the future at report time) May 1960,
    // one of each cancelled. Expected numbers are computed by hand.
    #[tokio::test]
    async fn monthly_and_overall_totals() {
        let pool = testutil::test_pool().await;

        let base = Utc.with_ymd_and_hms(1960, 3, 5, 14, 0, 0).unwrap();
        let next_month = Utc.with_ymd_and_hms(1960, 4, 5, 14, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(1960, 5, 1, 14, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(1960, 5, 5, 14, 0, 0).unwrap();
        let hour = Duration::hours(1);
        let day = Duration::days(1);

        // Pending, two live, one cancelled
        let user1 = testutil::create_user(&pool, UserSpec { email: "user1@autoperry.test", ..Default::default() }).await;
        let user2 = testutil::live_user(&pool, "user2@autoperry.test").await;
        let user3 = testutil::live_user(&pool, "user3@autoperry.test").await;
        testutil::create_user(
            &pool,
            UserSpec {
                email: "user4@autoperry.test",
                email_validated: Some(base),
                approved: Some(base),
                cancelled: Some(base),
                ..Default::default()
            },
        )
        .await;

        let event1 =
            testutil::create_event(&pool, base, base + hour, "Little Shelford", 2, user2.id).await;
        testutil::add_helper(&pool, event1, user1.id).await;
        testutil::add_helper(&pool, event1, user2.id).await;

        let event2 = testutil::create_event(
            &pool,
            base + day,
            base + day + hour,
            "Little Shelford",
            1,
            user3.id,
        )
        .await;
        testutil::add_helper(&pool, event2, user1.id).await;

        let event3 = testutil::create_event(
            &pool,
            base + day * 2,
            base + day * 2 + hour,
            "Little Shelford",
            1,
            user2.id,
        )
        .await;
        testutil::add_helper(&pool, event3, user1.id).await;
        testutil::cancel_event(&pool, event3, next_month).await;

        let event4 = testutil::create_event(
            &pool,
            next_month,
            next_month + hour,
            "Little Shelford",
            1,
            user3.id,
        )
        .await;
        testutil::add_helper(&pool, event4, user1.id).await;

        // After the report instant: invisible to the screen
        let event5 =
            testutil::create_event(&pool, future, future + hour, "Little Shelford", 1, user2.id)
                .await;
        testutil::add_helper(&pool, event5, user1.id).await;

        let event6 = testutil::create_event(
            &pool,
            future + hour * 2,
            future + hour * 3,
            "Little Shelford",
            1,
            user2.id,
        )
        .await;
        testutil::cancel_event(&pool, event6, future + day).await;

        let screen = build_stats_screen(&pool, now).await.unwrap();

        assert_eq!(screen.people.live, 2);
        assert_eq!(screen.people.pending, 1);
        assert_eq!(screen.people.cancelled, 1);
        assert_eq!(screen.people.suspended, 0);

        assert_eq!(screen.months.len(), 2);
        assert_eq!(
            screen.months[0],
            MonthSummary {
                month: "1960-03".into(),
                events: 2,
                cancelled_events: 1,
                owners: 2,
                locations: 1,
                helpers_wanted: 3,
                helpers_provided: 3,
                distinct_helpers: 2,
                helpers_cancelled: 1,
            }
        );
        assert_eq!(
            screen.months[1],
            MonthSummary {
                month: "1960-04".into(),
                events: 1,
                cancelled_events: 0,
                owners: 1,
                locations: 1,
                helpers_wanted: 1,
                helpers_provided: 1,
                distinct_helpers: 1,
                helpers_cancelled: 0,
            }
        );

        assert_eq!(screen.event_totals.events, 3);
        assert_eq!(screen.event_totals.cancelled_events, 1);
        assert_eq!(screen.event_totals.owners, 2);
        assert_eq!(screen.event_totals.locations, 1);
        assert_eq!(screen.event_totals.helpers_wanted, 4);

        assert_eq!(screen.helper_totals.helpers_provided, 4);
        assert_eq!(screen.helper_totals.distinct_helpers, 2);
        assert_eq!(screen.helper_totals.helpers_cancelled, 1);
    }

    #[test]
    fn zip_handles_months_without_helpers() {
        let events = vec![
            MonthEventsRow {
                month: "1960-03".into(),
                events: 1,
                cancelled_events: 0,
                owners: 1,
                locations: 1,
                helpers_wanted: 2,
            },
            MonthEventsRow {
                month: "1960-04".into(),
                events: 1,
                cancelled_events: 0,
                owners: 1,
                locations: 1,
                helpers_wanted: 1,
            },
        ];
        let helpers = vec![MonthHelpersRow {
            month: "1960-04".into(),
            helpers_provided: 1,
            distinct_helpers: 1,
            helpers_cancelled: 0,
        }];

        let months = zip_months(events, helpers);
        assert_eq!(months[0].helpers_provided, 0);
        assert_eq!(months[1].helpers_provided, 1);
    }
}
