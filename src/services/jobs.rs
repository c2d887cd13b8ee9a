//! The scheduled jobs behind the reminder and advert emails. Each takes a
//! `really` flag; without it the job only reports what it would do, so a
//! crontab entry can be rehearsed safely.

use askama::Template;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::database::{event_repo, user_repo, volunteer_repo};
use crate::error::AppError;
use crate::services::mailer::{AdminApprovalsEmail, AdvertEmail, HelperDigestEmail, Mailer, OwnerReminderEmail};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct JobReport {
    pub candidates: usize,
    pub sent: usize,
}

fn midnight_days_ahead(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    let date = now.date_naive() + Duration::days(days);
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is a valid time"))
}

/// Midnight at the start of the coming Monday; a week ahead if today is
/// already Monday.
pub fn next_monday(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_ahead = 7 - now.date_naive().weekday().num_days_from_monday() as i64;
    midnight_days_ahead(now, days_ahead)
}

/// One reminder per event to its organiser, shortly before it happens.
/// The `owner_reminded` stamp stops repeats.
pub async fn owner_reminders(
    pool: &SqlitePool,
    mailer: &Mailer,
    really: bool,
    now: DateTime<Utc>,
) -> Result<JobReport, AppError> {
    let cutoff = midnight_days_ahead(now, 3);
    let events = event_repo::owner_reminder_candidates(pool, now, cutoff).await?;
    let mut report = JobReport {
        candidates: events.len(),
        ..Default::default()
    };

    for event in events {
        let Some(owner) = user_repo::find_by_id(pool, event.owner_id).await? else {
            continue;
        };
        if !really {
            info!(
                "would remind \"{}\" about event {} \"{}\"",
                owner.full_name(),
                event.id,
                event.location
            );
            continue;
        }
        let helpers_available = volunteer_repo::count_current(pool, event.id).await?;
        let email = OwnerReminderEmail {
            first_name: &owner.first_name,
            when: event.when(),
            location: &event.location,
            helpers_available,
            helpers_required: event.helpers_required,
            event_url: format!("{}/event/{}/", mailer.base_url, event.id),
        };
        let body = email.render()?;
        mailer.send_to_user(&owner, false, &email.subject(), &body).await;
        event_repo::set_owner_reminded(pool, event.id, now).await?;
        report.sent += 1;
    }
    Ok(report)
}

/// A digest per helper of the events they volunteered for in the coming
/// window: the rest of this week, or all of next week. `reminded_upto`
/// records how far each helper has been told, so reruns are harmless.
pub async fn helper_digests(
    pool: &SqlitePool,
    mailer: &Mailer,
    this_week: bool,
    really: bool,
    now: DateTime<Utc>,
) -> Result<JobReport, AppError> {
    let monday = next_monday(now);
    let (from, until) = if this_week {
        (now, monday)
    } else {
        (monday, monday + Duration::days(7))
    };

    let mut report = JobReport::default();
    for user in user_repo::list_digest_recipients(pool).await? {
        if let Some(upto) = user.reminded_upto {
            if upto >= until {
                continue;
            }
        }
        let events = event_repo::volunteered_between(pool, user.id, from, until).await?;
        if events.is_empty() {
            continue;
        }
        report.candidates += 1;

        if !really {
            info!(
                "would send \"{}\" a digest of {} event(s)",
                user.full_name(),
                events.len()
            );
            continue;
        }
        let lines = events
            .iter()
            .map(|e| format!("{} at {}", e.short_when(), e.location))
            .collect();
        let email = HelperDigestEmail {
            first_name: &user.first_name,
            this_week,
            lines,
            base_url: &mailer.base_url,
        };
        let body = email.render()?;
        mailer.send_to_user(&user, false, email.subject(), &body).await;
        user_repo::set_reminded_upto(pool, user.id, until).await?;
        report.sent += 1;
    }
    Ok(report)
}

/// Nudge the administrators when accounts have been waiting for approval
/// for more than a day.
pub async fn admin_reminders(
    pool: &SqlitePool,
    mailer: &Mailer,
    really: bool,
    now: DateTime<Utc>,
) -> Result<JobReport, AppError> {
    let waiting = user_repo::list_awaiting_approval(pool, now - Duration::hours(24)).await?;
    let mut report = JobReport {
        candidates: waiting.len(),
        ..Default::default()
    };
    if waiting.is_empty() {
        return Ok(report);
    }

    let email = AdminApprovalsEmail {
        count: waiting.len(),
        base_url: &mailer.base_url,
    };
    let body = email.render()?;
    let admins = user_repo::list_admins(pool).await?;

    if !really {
        info!(
            "would tell {} administrator(s) about {} waiting account(s)",
            admins.len(),
            waiting.len()
        );
        return Ok(report);
    }
    if admins.is_empty() {
        // Nobody flagged as admin in the database; fall back on the robot's
        // own address, which the operators read
        mailer
            .send_to_address(&mailer.from_address().email.to_string(), &email.subject(), &body)
            .await;
        report.sent += 1;
    } else {
        for admin in &admins {
            mailer.send_to_address(&admin.email, &email.subject(), &body).await;
            report.sent += 1;
        }
    }
    Ok(report)
}

/// One advert to everyone who opted in, listing upcoming events that still
/// need helpers. Recipients go on BCC.
pub async fn advert(
    pool: &SqlitePool,
    mailer: &Mailer,
    weeks: i64,
    really: bool,
    now: DateTime<Utc>,
) -> Result<JobReport, AppError> {
    let events = event_repo::list_needing_helpers(pool, now, now + Duration::weeks(weeks)).await?;
    let mut report = JobReport {
        candidates: events.len(),
        ..Default::default()
    };
    if events.is_empty() {
        return Ok(report);
    }

    let recipients = user_repo::list_advert_recipients(pool).await?;
    if !really {
        info!(
            "would advertise {} event(s) to {} people",
            events.len(),
            recipients.len()
        );
        return Ok(report);
    }

    let lines = events
        .iter()
        .map(|e| {
            format!(
                "{} at {} ({} of {} helpers)",
                e.event.short_when(),
                e.event.location,
                e.helpers_available,
                e.event.helpers_required
            )
        })
        .collect();
    let email = AdvertEmail {
        weeks,
        lines,
        base_url: &mailer.base_url,
    };
    let body = email.render()?;
    let addresses: Vec<String> = recipients.iter().map(|u| u.email.clone()).collect();
    mailer.send_bcc(&addresses, email.subject(), &body).await;
    report.sent = addresses.len();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::TimeZone;
    use lettre::message::Mailbox;

    fn test_mailer() -> Mailer {
        let from: Mailbox = "AutoPerry <robot@autoperry.test>".parse().unwrap();
        Mailer::disabled(from, "http://localhost:3000".to_string())
    }

    #[test]
    fn next_monday_rolls_a_full_week_on_mondays() {
        // 1960-03-05 was a Saturday
        let saturday = Utc.with_ymd_and_hms(1960, 3, 5, 10, 0, 0).unwrap();
        assert_eq!(next_monday(saturday), Utc.with_ymd_and_hms(1960, 3, 7, 0, 0, 0).unwrap());

        let monday = Utc.with_ymd_and_hms(1960, 3, 7, 10, 0, 0).unwrap();
        assert_eq!(next_monday(monday), Utc.with_ymd_and_hms(1960, 3, 14, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn owner_reminders_stamp_only_when_real() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;

        let start = now + Duration::days(1);
        let id = testutil::create_event(&pool, start, start + Duration::hours(1), "Little Shelford", 2, owner.id).await;
        // Too far out to qualify
        let far = now + Duration::days(30);
        testutil::create_event(&pool, far, far + Duration::hours(1), "Whittlesford", 2, owner.id).await;

        let dry = owner_reminders(&pool, &mailer, false, now).await.unwrap();
        assert_eq!(dry, JobReport { candidates: 1, sent: 0 });

        let real = owner_reminders(&pool, &mailer, true, now).await.unwrap();
        assert_eq!(real, JobReport { candidates: 1, sent: 1 });

        let event = crate::database::event_repo::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(event.owner_reminded.is_some());

        // Stamped, so a rerun finds nothing
        let again = owner_reminders(&pool, &mailer, true, now).await.unwrap();
        assert_eq!(again, JobReport { candidates: 0, sent: 0 });
    }

    #[tokio::test]
    async fn helper_digest_covers_the_right_window_once() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        // A Saturday, so "this week" runs to Monday the 7th
        let now = Utc.with_ymd_and_hms(1960, 3, 5, 10, 0, 0).unwrap();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;

        // Sunday the 6th: inside this week's window
        let sunday = Utc.with_ymd_and_hms(1960, 3, 6, 10, 0, 0).unwrap();
        let soon = testutil::create_event(&pool, sunday, sunday + Duration::hours(1), "Little Shelford", 2, owner.id).await;
        testutil::add_helper(&pool, soon, helper.id).await;

        // Wednesday the 9th: next week's window
        let wednesday = Utc.with_ymd_and_hms(1960, 3, 9, 10, 0, 0).unwrap();
        let later = testutil::create_event(&pool, wednesday, wednesday + Duration::hours(1), "Whittlesford", 2, owner.id).await;
        testutil::add_helper(&pool, later, helper.id).await;

        let this_week = helper_digests(&pool, &mailer, true, true, now).await.unwrap();
        // The owner has no offers of help, so only the helper qualifies
        assert_eq!(this_week, JobReport { candidates: 1, sent: 1 });

        // reminded_upto now covers the window, so a rerun is silent
        let rerun = helper_digests(&pool, &mailer, true, true, now).await.unwrap();
        assert_eq!(rerun, JobReport { candidates: 0, sent: 0 });

        // The next-week run reaches further and digests the later event
        let next_week = helper_digests(&pool, &mailer, false, true, now).await.unwrap();
        assert_eq!(next_week, JobReport { candidates: 1, sent: 1 });
    }

    #[tokio::test]
    async fn admin_reminder_waits_a_day() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();

        let user = testutil::live_user(&pool, "fresh@autoperry.test").await;
        // Undo approval and backdate the join by two days
        sqlx::query("UPDATE users SET approved = NULL, created = ?2 WHERE id = ?1")
            .bind(user.id)
            .bind(now - Duration::days(2))
            .execute(&pool)
            .await
            .unwrap();

        let report = admin_reminders(&pool, &mailer, true, now).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.sent, 1);

        // A brand-new registration doesn't trigger anything yet
        sqlx::query("UPDATE users SET created = ?2 WHERE id = ?1")
            .bind(user.id)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        let report = admin_reminders(&pool, &mailer, true, now).await.unwrap();
        assert_eq!(report, JobReport { candidates: 0, sent: 0 });
    }

    #[tokio::test]
    async fn advert_goes_to_opted_in_users_only() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let reader = testutil::live_user(&pool, "reader@autoperry.test").await;
        sqlx::query("UPDATE users SET send_other = 1 WHERE id = ?1")
            .bind(reader.id)
            .execute(&pool)
            .await
            .unwrap();

        let start = now + Duration::days(3);
        testutil::create_event(&pool, start, start + Duration::hours(1), "Little Shelford", 2, owner.id).await;

        let dry = advert(&pool, &mailer, 2, false, now).await.unwrap();
        assert_eq!(dry, JobReport { candidates: 1, sent: 0 });

        let real = advert(&pool, &mailer, 2, true, now).await.unwrap();
        assert_eq!(real, JobReport { candidates: 1, sent: 1 });
    }
}
