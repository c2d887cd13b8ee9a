//! Event creation, editing and cancellation, with the guards the forms
//! re-render and the notification emails that follow a successful change.

use askama::Template;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::database::{event_repo, user_repo, volunteer_repo};
use crate::error::AppError;
use crate::models::{EventRow, UserRow};
use crate::services::clash;
use crate::services::mailer::{EventCancelledEmail, EventCreatedEmail, EventEditedEmail, Mailer};
use crate::services::Outcome;

#[derive(Debug, Clone)]
pub struct EventInput {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
    pub helpers_required: i64,
    pub contact_address: Option<String>,
    pub notes: Option<String>,
}

fn validate_input(input: &EventInput, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();
    if input.location.trim().is_empty() {
        errors.push("Please enter a location".to_string());
    }
    if input.helpers_required < 1 {
        errors.push("Events need at least one helper".to_string());
    }
    if input.end <= input.start {
        errors.push("The end time must be after the start time".to_string());
    }
    if input.start < now {
        errors.push("Events can't be created in the past".to_string());
    }
    errors
}

async fn clash_errors(
    pool: &SqlitePool,
    input: &EventInput,
    exclude_id: i64,
) -> Result<Vec<String>, AppError> {
    let clashes =
        clash::event_clashes(pool, input.location.trim(), input.start, input.end, exclude_id)
            .await?;
    if clashes.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![format!(
            "There is already an event at {} then: {}",
            input.location.trim(),
            clash::describe_clashes(&clashes)
        )])
    }
}

pub async fn create_event(
    pool: &SqlitePool,
    mailer: &Mailer,
    owner: &UserRow,
    input: EventInput,
    now: DateTime<Utc>,
) -> Result<Outcome<i64>, AppError> {
    let mut errors = validate_input(&input, now);
    if errors.is_empty() {
        errors.extend(clash_errors(pool, &input, 0).await?);
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    let id = event_repo::insert_event(
        pool,
        input.start,
        input.end,
        input.location.trim(),
        input.helpers_required,
        owner.id,
        now,
        input.contact_address.as_deref(),
        input.notes.as_deref(),
    )
    .await?;
    let event = event_repo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::NotFound)?;

    let email = EventCreatedEmail {
        first_name: &owner.first_name,
        when: event.when(),
        location: &event.location,
        event_url: format!("{}/event/{}/", mailer.base_url, id),
    };
    let body = email.render()?;
    mailer.send_to_user(owner, false, &email.subject(), &body).await;

    info!("event {} \"{}\" created by \"{}\"", id, event.location, owner.full_name());
    Ok(Outcome::Ok(id))
}

/// Why this event can't be edited right now, if it can't. Events are only
/// mutable while they are helper-free, in the future and uncancelled, and
/// only by their owner.
pub async fn edit_errors(
    pool: &SqlitePool,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();
    if user.id != event.owner_id {
        errors.push(
            "You are not the owner of this event - only the owner can edit it.".to_string(),
        );
    }
    if volunteer_repo::count_current(pool, event.id).await? > 0 {
        errors.push(
            "This event has helpers - details of events with helpers can't be edited. \
             Consider cancelling it."
                .to_string(),
        );
    }
    if event.is_past(now) {
        errors.push("This event has already happened - events in the past can't be edited.".to_string());
    } else if event.is_cancelled() {
        errors.push(
            "The request for help at this event has already been cancelled - cancelled \
             events can't be edited."
                .to_string(),
        );
    }
    Ok(errors)
}

pub async fn update_event(
    pool: &SqlitePool,
    mailer: &Mailer,
    event: &EventRow,
    user: &UserRow,
    input: EventInput,
    now: DateTime<Utc>,
) -> Result<Outcome<()>, AppError> {
    let mut errors = edit_errors(pool, event, user, now).await?;
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }
    errors = validate_input(&input, now);
    if errors.is_empty() {
        errors.extend(clash_errors(pool, &input, event.id).await?);
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    event_repo::update_event(
        pool,
        event.id,
        input.start,
        input.end,
        input.location.trim(),
        input.helpers_required,
        input.contact_address.as_deref(),
        input.notes.as_deref(),
    )
    .await?;
    let updated = event_repo::find_by_id(pool, event.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let email = EventEditedEmail {
        first_name: &user.first_name,
        when: updated.when(),
        location: &updated.location,
        event_url: format!("{}/event/{}/", mailer.base_url, event.id),
    };
    let body = email.render()?;
    mailer.send_to_user(user, false, &email.subject(), &body).await;

    info!("event {} \"{}\" updated by \"{}\"", event.id, updated.location, user.full_name());
    Ok(Outcome::Ok(()))
}

pub fn cancel_errors(event: &EventRow, user: &UserRow, now: DateTime<Utc>) -> Vec<String> {
    let mut errors = Vec::new();
    if user.id != event.owner_id {
        errors.push(
            "You are not the owner of this event - only the owner can cancel it".to_string(),
        );
    }
    if event.is_past(now) {
        errors.push("This event has already happened and so can't now be cancelled".to_string());
    } else if event.is_cancelled() {
        errors.push("The request for help at this event has already been cancelled".to_string());
    }
    errors
}

/// Cancellation is terminal. The database change commits first; the emails
/// to the current helpers follow and a failed send changes nothing.
pub async fn cancel_event(
    pool: &SqlitePool,
    mailer: &Mailer,
    event: &EventRow,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Outcome<()>, AppError> {
    let errors = cancel_errors(event, user, now);
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    let helpers = volunteer_repo::list_current_with_person(pool, event.id).await?;

    let mut tx = pool.begin().await.map_err(AppError::Database)?;
    let cancelled = event_repo::set_cancelled(&mut *tx, event.id, now).await?;
    if cancelled == 0 {
        tx.rollback().await.map_err(AppError::Database)?;
        return Ok(Outcome::rejected(
            "The request for help at this event has already been cancelled",
        ));
    }
    tx.commit().await.map_err(AppError::Database)?;

    info!("event {} \"{}\" cancelled by \"{}\"", event.id, event.location, user.full_name());

    for helper in helpers {
        let Some(person) = user_repo::find_by_id(pool, helper.volunteer.person_id).await? else {
            continue;
        };
        let email = EventCancelledEmail {
            first_name: &person.first_name,
            when: event.when(),
            location: &event.location,
        };
        let body = email.render()?;
        mailer.send_to_user(&person, false, &email.subject(), &body).await;
        info!(
            "notified \"{}\" that event {} has been cancelled",
            person.full_name(),
            event.id
        );
    }

    Ok(Outcome::Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use chrono::Duration;
    use lettre::message::Mailbox;

    fn test_mailer() -> Mailer {
        let from: Mailbox = "AutoPerry <robot@autoperry.test>".parse().unwrap();
        Mailer::disabled(from, "http://localhost:3000".to_string())
    }

    fn input(start: DateTime<Utc>, end: DateTime<Utc>) -> EventInput {
        EventInput {
            start,
            end,
            location: "Little Shelford".to_string(),
            helpers_required: 2,
            contact_address: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_bad_dates_and_clashes() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;

        let start = now + Duration::days(1);
        let end = start + Duration::hours(2);

        // Past event
        let past = input(now - Duration::days(1), now - Duration::days(1) + Duration::hours(1));
        assert!(create_event(&pool, &mailer, &owner, past, now).await.unwrap().is_rejected());

        // End before start
        assert!(create_event(&pool, &mailer, &owner, input(end, start), now)
            .await
            .unwrap()
            .is_rejected());

        // First one goes in, the overlapping second doesn't
        let Outcome::Ok(_) = create_event(&pool, &mailer, &owner, input(start, end), now)
            .await
            .unwrap()
        else {
            panic!("create rejected");
        };
        let overlapping = input(start + Duration::hours(1), end + Duration::hours(1));
        let Outcome::Rejected(errors) =
            create_event(&pool, &mailer, &owner, overlapping, now).await.unwrap()
        else {
            panic!("clash not detected");
        };
        assert!(errors[0].contains("already an event"));
    }

    #[tokio::test]
    async fn only_helper_free_future_events_editable() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let other = testutil::live_user(&pool, "other@autoperry.test").await;
        let helper = testutil::live_user(&pool, "helper@autoperry.test").await;

        let start = now + Duration::days(1);
        let id = testutil::create_event(&pool, start, start + Duration::hours(2), "Little Shelford", 2, owner.id).await;
        let event = event_repo::find_by_id(&pool, id).await.unwrap().unwrap();

        assert!(edit_errors(&pool, &event, &owner, now).await.unwrap().is_empty());
        assert!(!edit_errors(&pool, &event, &other, now).await.unwrap().is_empty());

        testutil::add_helper(&pool, id, helper.id).await;
        assert!(!edit_errors(&pool, &event, &owner, now).await.unwrap().is_empty());

        let moved = EventInput {
            start: start + Duration::days(1),
            end: start + Duration::days(1) + Duration::hours(2),
            ..input(start, start + Duration::hours(2))
        };
        assert!(update_event(&pool, &mailer, &event, &owner, moved, now)
            .await
            .unwrap()
            .is_rejected());
    }

    #[tokio::test]
    async fn cancel_is_owner_only_and_terminal() {
        let pool = testutil::test_pool().await;
        let mailer = test_mailer();
        let now = Utc::now();
        let owner = testutil::live_user(&pool, "owner@autoperry.test").await;
        let other = testutil::live_user(&pool, "other@autoperry.test").await;

        let start = now + Duration::days(1);
        let id = testutil::create_event(&pool, start, start + Duration::hours(2), "Little Shelford", 2, owner.id).await;
        let event = event_repo::find_by_id(&pool, id).await.unwrap().unwrap();

        assert!(cancel_event(&pool, &mailer, &event, &other, now).await.unwrap().is_rejected());

        let Outcome::Ok(()) = cancel_event(&pool, &mailer, &event, &owner, now).await.unwrap()
        else {
            panic!("cancel rejected");
        };

        let event = event_repo::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(event.is_cancelled());
        assert!(cancel_event(&pool, &mailer, &event, &owner, now).await.unwrap().is_rejected());
    }
}
