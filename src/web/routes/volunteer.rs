use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use chrono::Utc;

use crate::database::{event_repo, user_repo, volunteer_repo};
use crate::error::AppError;
use crate::models::{EventRow, UserRow};
use crate::services::volunteer;
use crate::services::Outcome;
use crate::web::middleware::auth::CurrentUser;
use crate::web::routes::{self, ConfirmTemplate};
use crate::web::state::AppState;

fn enabled_or_account(user: &UserRow) -> Option<Response> {
    if user.is_enabled() {
        None
    } else {
        Some(Redirect::to("/account/").into_response())
    }
}

async fn load_event(state: &AppState, id: i64) -> Result<EventRow, AppError> {
    event_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound)
}

fn volunteer_confirm(event: &EventRow, errors: Vec<String>) -> ConfirmTemplate {
    ConfirmTemplate {
        title: "Volunteer to help".to_string(),
        prompt: "Volunteer to help with the ringing at this event? The organiser will be told."
            .to_string(),
        errors,
        when: event.when(),
        location: event.location.clone(),
        action: format!("/event/{}/volunteer/", event.id),
        confirm_label: "Volunteer".to_string(),
    }
}

pub async fn volunteer_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    let errors = volunteer::volunteer_errors(&state.pool, &event, &user, Utc::now()).await?;
    routes::render(&volunteer_confirm(&event, errors))
}

pub async fn volunteer(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    match volunteer::volunteer(&state.pool, &state.mailer, &event, &user, Utc::now()).await? {
        Outcome::Ok(_) => {
            Ok(Redirect::to(&format!("/event/{id}/?notice=volunteered")).into_response())
        }
        Outcome::Rejected(errors) => routes::render(&volunteer_confirm(&event, errors)),
    }
}

fn unvolunteer_confirm(event: &EventRow, errors: Vec<String>) -> ConfirmTemplate {
    ConfirmTemplate {
        title: "Withdraw your offer".to_string(),
        prompt: "Withdraw your offer to help with this event? The organiser will be told."
            .to_string(),
        errors,
        when: event.when(),
        location: event.location.clone(),
        action: format!("/event/{}/unvolunteer/", event.id),
        confirm_label: "Withdraw".to_string(),
    }
}

pub async fn unvolunteer_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    let errors = volunteer::unvolunteer_errors(&state.pool, &event, &user, Utc::now()).await?;
    routes::render(&unvolunteer_confirm(&event, errors))
}

pub async fn unvolunteer(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    match volunteer::unvolunteer(&state.pool, &state.mailer, &event, &user, Utc::now()).await? {
        Outcome::Ok(()) => {
            Ok(Redirect::to(&format!("/event/{id}/?notice=withdrawn")).into_response())
        }
        Outcome::Rejected(errors) => routes::render(&unvolunteer_confirm(&event, errors)),
    }
}

async fn decline_confirm(
    state: &AppState,
    event: &EventRow,
    volunteer_id: i64,
    errors: Vec<String>,
) -> Result<ConfirmTemplate, AppError> {
    let row = volunteer_repo::find_by_id(&state.pool, volunteer_id).await?;
    let row = match row {
        Some(row) if row.event_id == event.id => row,
        _ => return Err(AppError::NotFound),
    };
    let helper_name = user_repo::find_by_id(&state.pool, row.person_id)
        .await?
        .map(|p| p.full_name())
        .unwrap_or_default();
    Ok(ConfirmTemplate {
        title: "Decline an offer of help".to_string(),
        prompt: format!(
            "Decline {helper_name}'s offer to help with this event? They will be told, \
             with the event's contact address in case they want to get in touch."
        ),
        errors,
        when: event.when(),
        location: event.location.clone(),
        action: format!("/event/{}/decline/{}/", event.id, volunteer_id),
        confirm_label: "Decline".to_string(),
    })
}

pub async fn decline_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((id, volunteer_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    let template = decline_confirm(&state, &event, volunteer_id, Vec::new()).await?;
    routes::render(&template)
}

pub async fn decline(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((id, volunteer_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    match volunteer::decline(&state.pool, &state.mailer, &event, &user, volunteer_id, Utc::now())
        .await?
    {
        Outcome::Ok(()) => {
            Ok(Redirect::to(&format!("/event/{id}/?notice=declined")).into_response())
        }
        Outcome::Rejected(errors) => {
            let template = decline_confirm(&state, &event, volunteer_id, errors).await?;
            routes::render(&template)
        }
    }
}
