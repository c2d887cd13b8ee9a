//! Offering, withdrawing and declining help. Withdrawn and declined offers
//! keep their rows (the statistics screen needs them); only a row with both
//! timestamps null counts towards an event's helpers.

use askama::Template;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::database::{user_repo, volunteer_repo};
use crate::error::AppError;
use crate::models::{EventRow, UserRow};
use crate::services::clash;
use crate::services::mailer::{
    Mailer, VolunteerAddedEmail, VolunteerDeclinedEmail, VolunteerWithdrawnEmail,
};
use crate::services::Outcome;

/// Why this user can't volunteer for this event right now, if they can't.
/// Shared by the confirmation page and the POST.
pub async fn volunteer_errors(
    pool: &SqlitePool,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();
    if event.is_past(now) {
        errors.push(
            "This event has already happened so you can't volunteer to help with it".to_string(),
        );
    } else if event.is_cancelled() {
        errors.push(
            "The request for help at this event has been cancelled so you can't volunteer \
             to help with it"
                .to_string(),
        );
    }
    if volunteer_repo::find_current(pool, event.id, user.id).await?.is_some() {
        errors.push("You have already volunteered to help at this event".to_string());
    }
    if volunteer_repo::count_current(pool, event.id).await? >= event.helpers_required {
        errors.push("This event already has all the helpers it needs".to_string());
    }
    let clashes = clash::volunteer_clashes(pool, user.id, event).await?;
    if !clashes.is_empty() {
        errors.push(format!(
            "You have already volunteered for an event then: {}",
            clash::describe_clashes(&clashes)
        ));
    }
    Ok(errors)
}

pub async fn volunteer(
    pool: &SqlitePool,
    mailer: &Mailer,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Outcome<i64>, AppError> {
    let errors = volunteer_errors(pool, event, user, now).await?;
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    // The capacity check rides inside the insert, so offers racing past the
    // errors above still can't overshoot the quota
    let id = match volunteer_repo::insert_if_capacity(
        pool,
        event.id,
        user.id,
        now,
        event.helpers_required,
    )
    .await
    {
        Ok(Some(id)) => id,
        Ok(None) => {
            return Ok(Outcome::rejected(
                "This event already has all the helpers it needs",
            ));
        }
        // Lost a race with themselves: the partial unique index caught a
        // concurrent duplicate offer
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Ok(Outcome::rejected(
                "You have already volunteered to help at this event",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "\"{}\" volunteered for event {} \"{}\"",
        user.full_name(),
        event.id,
        event.location
    );

    if let Some(owner) = user_repo::find_by_id(pool, event.owner_id).await? {
        let email = VolunteerAddedEmail {
            first_name: &owner.first_name,
            helper_name: user.full_name(),
            when: event.when(),
            location: &event.location,
            event_url: format!("{}/event/{}/", mailer.base_url, event.id),
        };
        let body = email.render()?;
        mailer.send_to_user(&owner, false, &email.subject(), &body).await;
    }

    Ok(Outcome::Ok(id))
}

pub async fn unvolunteer_errors(
    pool: &SqlitePool,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();
    if event.is_past(now) {
        errors.push(
            "This event has already happened so you can't withdraw your offer to help".to_string(),
        );
    }
    if volunteer_repo::find_current(pool, event.id, user.id).await?.is_none() {
        errors.push(
            "You are not a helper for this event so you can't withdraw your offer to help"
                .to_string(),
        );
    }
    Ok(errors)
}

pub async fn unvolunteer(
    pool: &SqlitePool,
    mailer: &Mailer,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Outcome<()>, AppError> {
    let errors = unvolunteer_errors(pool, event, user, now).await?;
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }
    let Some(row) = volunteer_repo::find_current(pool, event.id, user.id).await? else {
        return Ok(Outcome::rejected("You are not a helper for this event"));
    };
    if volunteer_repo::set_withdrawn(pool, row.id, now).await? == 0 {
        return Ok(Outcome::rejected("You are not a helper for this event"));
    }

    info!(
        "\"{}\" withdrew from event {} \"{}\"",
        user.full_name(),
        event.id,
        event.location
    );

    if let Some(owner) = user_repo::find_by_id(pool, event.owner_id).await? {
        let email = VolunteerWithdrawnEmail {
            first_name: &owner.first_name,
            helper_name: user.full_name(),
            when: event.when(),
            location: &event.location,
            event_url: format!("{}/event/{}/", mailer.base_url, event.id),
        };
        let body = email.render()?;
        mailer.send_to_user(&owner, false, &email.subject(), &body).await;
    }

    Ok(Outcome::Ok(()))
}

/// An organiser turning down an offer of help. The helper is told, with the
/// event's contact address in case they want to argue.
pub async fn decline(
    pool: &SqlitePool,
    mailer: &Mailer,
    event: &EventRow,
    actor: &UserRow,
    volunteer_id: i64,
    now: DateTime<Utc>,
) -> Result<Outcome<()>, AppError> {
    let mut errors = Vec::new();
    if actor.id != event.owner_id {
        errors.push(
            "You are not the owner of this event - only the owner can decline offers of help"
                .to_string(),
        );
    }
    if event.is_past(now) {
        errors.push("This event has already happened".to_string());
    }

    let row = volunteer_repo::find_by_id(pool, volunteer_id).await?;
    let row = match row {
        Some(row) if row.event_id == event.id => row,
        _ => return Err(AppError::NotFound),
    };
    if !row.is_current() {
        errors.push("That offer of help is no longer current".to_string());
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    if volunteer_repo::set_declined(pool, row.id, now).await? == 0 {
        return Ok(Outcome::rejected("That offer of help is no longer current"));
    }

    let Some(person) = user_repo::find_by_id(pool, row.person_id).await? else {
        return Ok(Outcome::Ok(()));
    };
    info!(
        "\"{}\" declined \"{}\" for event {} \"{}\"",
        actor.full_name(),
        person.full_name(),
        event.id,
        event.location
    );

    let owner_email = user_repo::find_by_id(pool, event.owner_id)
        .await?
        .map(|o| o.email)
        .unwrap_or_default();
    let email = VolunteerDeclinedEmail {
        first_name: &person.first_name,
        when: event.when(),
        location: &event.location,
        contact: event.contact(&owner_email),
    };
    let body = email.render()?;
    mailer.send_to_user(&person, false, &email.subject(), &body).await;

    Ok(Outcome::Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::event_repo;
    use crate::testutil;
    use chrono::Duration;
    use lettre::message::Mailbox;

    fn test_mailer() -> Mailer {
        let from: Mailbox = "AutoPerry <robot@autoperry.test>".parse().unwrap();
        Mailer::disabled(from, "http://localhost:3000".to_string())
    }

    async fn future_event(pool: &sqlx::SqlitePool, owner_id: i64, helpers_required: i64) -> EventRow {
        let start = Utc::now() + Duration::days(1);
        let id = testutil::create_event(
            pool,
            start,
            start + Duration::hours(2),
            "Little Shelford",
            helpers_required,
            owner_id,
        )
        .await;
        event_repo::find_by_id(pool, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn quota_past_and_cancelled_are_enforced() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let first = testutil::live_user(&pool, "first@autoperry.test").await;
        let second = testutil::live_user(&pool, "second@autoperry.test").await;

        let event = future_event(&pool, owner.id, 1).await;

        let Outcome::Ok(_) = volunteer(&pool, &mailer, &event, &first, now).await.unwrap() else {
            panic!("first volunteer rejected");
        };

        // Quota of one is now full
        let Outcome::Rejected(errors) =
            volunteer(&pool, &mailer, &event, &second, now).await.unwrap()
        else {
            panic!("quota not enforced");
        };
        assert!(errors.iter().any(|e| e.contains("all the helpers")));

        // Double-volunteering is its own error
        assert!(volunteer(&pool, &mailer, &event, &first, now).await.unwrap().is_rejected());

        // Past event
        let past_start = now - Duration::days(1);
        let past_id = testutil::create_event(
            &pool,
            past_start,
            past_start + Duration::hours(1),
            "Whittlesford",
            2,
            owner.id,
        )
        .await;
        let past = event_repo::find_by_id(&pool, past_id).await.unwrap().unwrap();
        assert!(volunteer(&pool, &mailer, &past, &second, now).await.unwrap().is_rejected());

        // Cancelled event
        let cancelled = future_event(&pool, owner.id, 2).await;
        testutil::cancel_event(&pool, cancelled.id, now).await;
        let cancelled = event_repo::find_by_id(&pool, cancelled.id).await.unwrap().unwrap();
        assert!(volunteer(&pool, &mailer, &cancelled, &second, now)
            .await
            .unwrap()
            .is_rejected());
    }

    #[tokio::test]
    async fn insert_guard_holds_at_capacity() {
        // The pre-check messages and the insert are separate statements, so
        // the insert itself must refuse once the quota is reached, or two
        // racing offers could both land.
        let pool = testutil::test_pool().await;
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let first = testutil::live_user(&pool, "first@autoperry.test").await;
        let second = testutil::live_user(&pool, "second@autoperry.test").await;

        let event = future_event(&pool, owner.id, 1).await;

        // Fill the single slot without going through volunteer_errors
        testutil::add_helper(&pool, event.id, first.id).await;

        // A straight repo call past the pre-check still bounces
        let slot = volunteer_repo::insert_if_capacity(&pool, event.id, second.id, now, event.helpers_required)
            .await
            .unwrap();
        assert!(slot.is_none());
        assert_eq!(volunteer_repo::count_current(&pool, event.id).await.unwrap(), 1);

        // Withdrawing reopens it
        let row = volunteer_repo::find_current(&pool, event.id, first.id).await.unwrap().unwrap();
        volunteer_repo::set_withdrawn(&pool, row.id, now).await.unwrap();
        let slot = volunteer_repo::insert_if_capacity(&pool, event.id, second.id, now, event.helpers_required)
            .await
            .unwrap();
        assert!(slot.is_some());
        assert_eq!(volunteer_repo::count_current(&pool, event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clashing_commitment_blocks_volunteering() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;

        let event = future_event(&pool, owner.id, 2).await;
        let Outcome::Ok(_) = volunteer(&pool, &mailer, &event, &helper, now).await.unwrap() else {
            panic!("volunteer rejected");
        };

        // Same time, different place
        let other_id = testutil::create_event(
            &pool,
            event.start,
            event.end,
            "Whittlesford",
            2,
            owner.id,
        )
        .await;
        let other = event_repo::find_by_id(&pool, other_id).await.unwrap().unwrap();
        let Outcome::Rejected(errors) =
            volunteer(&pool, &mailer, &other, &helper, now).await.unwrap()
        else {
            panic!("clash not detected");
        };
        assert!(errors.iter().any(|e| e.contains("already volunteered for an event then")));
    }

    #[tokio::test]
    async fn withdraw_frees_the_slot_and_allows_a_fresh_offer() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;

        let event = future_event(&pool, owner.id, 1).await;
        let Outcome::Ok(first_id) = volunteer(&pool, &mailer, &event, &helper, now).await.unwrap()
        else {
            panic!("volunteer rejected");
        };

        let Outcome::Ok(()) = unvolunteer(&pool, &mailer, &event, &helper, now).await.unwrap()
        else {
            panic!("withdraw rejected");
        };
        assert_eq!(volunteer_repo::count_current(&pool, event.id).await.unwrap(), 0);

        // Withdrawing again is an error
        assert!(unvolunteer(&pool, &mailer, &event, &helper, now).await.unwrap().is_rejected());

        // Re-volunteering makes a fresh row; the withdrawn one survives
        let Outcome::Ok(second_id) = volunteer(&pool, &mailer, &event, &helper, now).await.unwrap()
        else {
            panic!("re-volunteer rejected");
        };
        assert_ne!(first_id, second_id);
        assert_eq!(volunteer_repo::count_current(&pool, event.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn decline_is_owner_only_and_notifies() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;
        let other = testutil::live_user(&pool, "other@autoperry.test").await;

        let event = future_event(&pool, owner.id, 2).await;
        let Outcome::Ok(volunteer_id) =
            volunteer(&pool, &mailer, &event, &helper, now).await.unwrap()
        else {
            panic!("volunteer rejected");
        };

        assert!(decline(&pool, &mailer, &event, &other, volunteer_id, now)
            .await
            .unwrap()
            .is_rejected());

        let Outcome::Ok(()) = decline(&pool, &mailer, &event, &owner, volunteer_id, now)
            .await
            .unwrap()
        else {
            panic!("decline rejected");
        };
        assert_eq!(volunteer_repo::count_current(&pool, event.id).await.unwrap(), 0);

        // Already declined
        assert!(decline(&pool, &mailer, &event, &owner, volunteer_id, now)
            .await
            .unwrap()
            .is_rejected());

        // A declined offer doesn't block a fresh one
        let Outcome::Ok(_) = volunteer(&pool, &mailer, &event, &helper, now).await.unwrap() else {
            panic!("re-volunteer after decline rejected");
        };
    }
}
