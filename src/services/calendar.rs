//! Per-user iCalendar feed: the future events they organise and the ones
//! they currently volunteer for, as one VCALENDAR.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::event_repo;
use crate::error::AppError;
use crate::models::{EventRow, UserRow};

const DTSTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub async fn user_calendar(
    pool: &SqlitePool,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let mut events = event_repo::future_owned_by(pool, user.id, now).await?;
    for event in event_repo::future_volunteered_by(pool, user.id, now).await? {
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event);
        }
    }
    events.sort_by_key(|e| e.start);
    Ok(render(&events, now))
}

fn render(events: &[EventRow], now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    out.push_str("PRODID:-//autoperry//calendar//EN\r\n");
    for event in events {
        out.push_str("BEGIN:VEVENT\r\n");
        out.push_str(&format!("UID:event-{}@autoperry\r\n", event.id));
        out.push_str(&format!("DTSTAMP:{}\r\n", now.format(DTSTAMP_FORMAT)));
        out.push_str(&format!("DTSTART:{}\r\n", event.start.format(DTSTAMP_FORMAT)));
        out.push_str(&format!("DTEND:{}\r\n", event.end.format(DTSTAMP_FORMAT)));
        out.push_str(&format!("SUMMARY:Ringing at {}\r\n", escape_text(&event.location)));
        out.push_str(&format!("LOCATION:{}\r\n", escape_text(&event.location)));
        if let Some(notes) = &event.notes {
            out.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(notes)));
        }
        out.push_str("END:VEVENT\r\n");
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

// RFC 5545 TEXT escaping
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::Duration;

    #[test]
    fn text_escaping() {
        assert_eq!(escape_text("plain"), "plain");
        assert_eq!(escape_text("a,b;c\\d"), "a\\,b\\;c\\\\d");
        assert_eq!(escape_text("two\nlines"), "two\\nlines");
    }

    #[tokio::test]
    async fn calendar_combines_owned_and_volunteered_without_duplicates() {
        let pool = testutil::test_pool().await;
        let now = Utc::now();
        let user = testutil::live_user(&pool, "ringer@autoperry.test").await;
        let other = testutil::live_user(&pool, "other@autoperry.test").await;

        let start = now + Duration::days(1);
        // Owned, and also volunteered for - must appear once
        let owned =
            testutil::create_event(&pool, start, start + Duration::hours(1), "Little Shelford", 2, user.id).await;
        testutil::add_helper(&pool, owned, user.id).await;

        // Someone else's event, volunteered for
        let helped = testutil::create_event(
            &pool,
            start + Duration::days(1),
            start + Duration::days(1) + Duration::hours(1),
            "Whittlesford",
            2,
            other.id,
        )
        .await;
        testutil::add_helper(&pool, helped, user.id).await;

        // In the past: excluded
        testutil::create_event(
            &pool,
            now - Duration::days(7),
            now - Duration::days(7) + Duration::hours(1),
            "Little Shelford",
            2,
            user.id,
        )
        .await;

        let ics = user_calendar(&pool, &user, now).await.unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(ics.matches(&format!("UID:event-{owned}@autoperry")).count(), 1);
        assert!(ics.contains(&format!("UID:event-{helped}@autoperry")));
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }
}
