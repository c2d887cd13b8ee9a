use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;

use crate::database::{event_repo, user_repo, volunteer_repo};
use crate::error::AppError;
use crate::models::{EventRow, UserRow};
use crate::services::event::{self, EventInput};
use crate::services::Outcome;
use crate::web::middleware::auth::CurrentUser;
use crate::web::routes::{self, ConfirmTemplate, EventView};
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

pub struct HelperView {
    pub volunteer_id: i64,
    pub name: String,
}

#[derive(Template)]
#[template(path = "event.html")]
pub struct EventTemplate {
    pub event: EventView,
    pub notes: String,
    pub contact: String,
    pub owner_name: String,
    pub helpers: Vec<HelperView>,
    pub is_owner: bool,
    pub is_helper: bool,
    pub can_volunteer: bool,
    pub editable: bool,
    pub notice: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

pub async fn detail_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let now = Utc::now();
    let event = load_event(&state, id).await?;
    let owner = user_repo::find_by_id(&state.pool, event.owner_id).await?;
    let owner_email = owner.as_ref().map(|o| o.email.clone()).unwrap_or_default();
    let owner_name = owner.map(|o| o.full_name()).unwrap_or_default();

    let helper_rows = volunteer_repo::list_current_with_person(&state.pool, event.id).await?;
    let is_owner = user.id == event.owner_id;
    let is_helper = helper_rows.iter().any(|h| h.volunteer.person_id == user.id);
    let helpers_available = helper_rows.len() as i64;
    let helpers = helper_rows
        .iter()
        .map(|h| HelperView {
            volunteer_id: h.volunteer.id,
            name: h.person_name(),
        })
        .collect();

    let can_volunteer = !event.is_past(now)
        && !event.is_cancelled()
        && !is_helper
        && helpers_available < event.helpers_required;
    let editable = is_owner
        && helpers_available == 0
        && !event.is_past(now)
        && !event.is_cancelled();

    let view = EventView {
        id: event.id,
        when: event.when(),
        short_when: event.short_when(),
        location: event.location.clone(),
        helpers_available,
        helpers_required: event.helpers_required,
        needs_helpers: !event.is_cancelled()
            && !event.is_past(now)
            && helpers_available < event.helpers_required,
        cancelled: event.is_cancelled(),
        past: event.is_past(now),
    };

    routes::render(&EventTemplate {
        event: view,
        notes: event.notes.clone().unwrap_or_default(),
        contact: event.contact(&owner_email).to_string(),
        owner_name,
        helpers,
        is_owner,
        is_helper,
        can_volunteer,
        editable,
        notice: query
            .notice
            .as_deref()
            .map(routes::notice_message)
            .unwrap_or_default(),
    })
}

#[derive(Template)]
#[template(path = "event_form.html")]
pub struct EventFormTemplate {
    pub heading: String,
    pub action: String,
    pub errors: Vec<String>,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub helpers_required: String,
    pub contact_address: String,
    pub notes: String,
    pub locations: Vec<String>,
}

impl EventFormTemplate {
    fn blank(heading: &str, action: &str, locations: Vec<String>) -> Self {
        EventFormTemplate {
            heading: heading.to_string(),
            action: action.to_string(),
            errors: Vec::new(),
            date: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            location: String::new(),
            helpers_required: "1".to_string(),
            contact_address: String::new(),
            notes: String::new(),
            locations,
        }
    }

    fn prefilled(heading: &str, action: &str, event: &EventRow, locations: Vec<String>) -> Self {
        EventFormTemplate {
            heading: heading.to_string(),
            action: action.to_string(),
            errors: Vec::new(),
            date: event.start.format("%Y-%m-%d").to_string(),
            start_time: event.start.format("%H:%M").to_string(),
            end_time: event.end.format("%H:%M").to_string(),
            location: event.location.clone(),
            helpers_required: event.helpers_required.to_string(),
            contact_address: event.contact_address.clone().unwrap_or_default(),
            notes: event.notes.clone().unwrap_or_default(),
            locations,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventForm {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub helpers_required: String,
    #[serde(default)]
    pub contact_address: String,
    #[serde(default)]
    pub notes: String,
}

fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_event_form(form: &EventForm) -> Result<EventInput, Vec<String>> {
    let mut errors = Vec::new();

    let date = NaiveDate::parse_from_str(form.date.trim(), "%Y-%m-%d");
    let start_time = NaiveTime::parse_from_str(form.start_time.trim(), "%H:%M");
    let end_time = NaiveTime::parse_from_str(form.end_time.trim(), "%H:%M");
    let (start, end) = match (date, start_time, end_time) {
        (Ok(date), Ok(start_time), Ok(end_time)) => (
            Utc.from_utc_datetime(&date.and_time(start_time)),
            Utc.from_utc_datetime(&date.and_time(end_time)),
        ),
        _ => {
            errors.push("Please enter a valid date and start and end times".to_string());
            return Err(errors);
        }
    };

    let helpers_required = match form.helpers_required.trim().parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            errors.push("Please enter the number of helpers needed".to_string());
            return Err(errors);
        }
    };

    Ok(EventInput {
        start,
        end,
        location: form.location.trim().to_string(),
        helpers_required,
        contact_address: blank_to_none(&form.contact_address),
        notes: blank_to_none(&form.notes),
    })
}

fn refill(template: &mut EventFormTemplate, form: &EventForm, errors: Vec<String>) {
    template.errors = errors;
    template.date = form.date.clone();
    template.start_time = form.start_time.clone();
    template.end_time = form.end_time.clone();
    template.location = form.location.clone();
    template.helpers_required = form.helpers_required.clone();
    template.contact_address = form.contact_address.clone();
    template.notes = form.notes.clone();
}

pub async fn create_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let locations = event_repo::list_locations(&state.pool).await?;
    routes::render(&EventFormTemplate::blank("New event", "/event/create/", locations))
}

/// A fresh create form pre-filled from an existing event. Dates are usually
/// the only thing that changes week to week.
pub async fn clone_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event = load_event(&state, id).await?;
    let locations = event_repo::list_locations(&state.pool).await?;
    routes::render(&EventFormTemplate::prefilled(
        "New event",
        "/event/create/",
        &event,
        locations,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<EventForm>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let now = Utc::now();
    let input = match parse_event_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            let locations = event_repo::list_locations(&state.pool).await?;
            let mut template = EventFormTemplate::blank("New event", "/event/create/", locations);
            refill(&mut template, &form, errors);
            return routes::render(&template);
        }
    };
    match event::create_event(&state.pool, &state.mailer, &user, input, now).await? {
        Outcome::Ok(id) => Ok(Redirect::to(&format!("/event/{id}/?notice=created")).into_response()),
        Outcome::Rejected(errors) => {
            let locations = event_repo::list_locations(&state.pool).await?;
            let mut template = EventFormTemplate::blank("New event", "/event/create/", locations);
            refill(&mut template, &form, errors);
            routes::render(&template)
        }
    }
}

pub async fn edit_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let now = Utc::now();
    let event_row = load_event(&state, id).await?;
    let errors = event::edit_errors(&state.pool, &event_row, &user, now).await?;
    let locations = event_repo::list_locations(&state.pool).await?;
    let mut template = EventFormTemplate::prefilled(
        "Edit event",
        &format!("/event/{id}/edit/"),
        &event_row,
        locations,
    );
    template.errors = errors;
    routes::render(&template)
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(form): Form<EventForm>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let now = Utc::now();
    let event_row = load_event(&state, id).await?;
    let action = format!("/event/{id}/edit/");

    let input = match parse_event_form(&form) {
        Ok(input) => input,
        Err(errors) => {
            let locations = event_repo::list_locations(&state.pool).await?;
            let mut template =
                EventFormTemplate::prefilled("Edit event", &action, &event_row, locations);
            refill(&mut template, &form, errors);
            return routes::render(&template);
        }
    };
    match event::update_event(&state.pool, &state.mailer, &event_row, &user, input, now).await? {
        Outcome::Ok(()) => Ok(Redirect::to(&format!("/event/{id}/?notice=updated")).into_response()),
        Outcome::Rejected(errors) => {
            let locations = event_repo::list_locations(&state.pool).await?;
            let mut template =
                EventFormTemplate::prefilled("Edit event", &action, &event_row, locations);
            refill(&mut template, &form, errors);
            routes::render(&template)
        }
    }
}

fn cancel_confirm(event: &EventRow, errors: Vec<String>) -> ConfirmTemplate {
    ConfirmTemplate {
        title: "Cancel event".to_string(),
        prompt: "Cancel the request for help at this event? Everyone who has volunteered \
                 will be told. This can't be undone."
            .to_string(),
        errors,
        when: event.when(),
        location: event.location.clone(),
        action: format!("/event/{}/cancel/", event.id),
        confirm_label: "Cancel event".to_string(),
    }
}

pub async fn cancel_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event_row = load_event(&state, id).await?;
    let errors = event::cancel_errors(&event_row, &user, Utc::now());
    routes::render(&cancel_confirm(&event_row, errors))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if let Some(response) = enabled_or_account(&user) {
        return Ok(response);
    }
    let event_row = load_event(&state, id).await?;
    match event::cancel_event(&state.pool, &state.mailer, &event_row, &user, Utc::now()).await? {
        Outcome::Ok(()) => {
            Ok(Redirect::to(&format!("/event/{id}/?notice=cancelled")).into_response())
        }
        Outcome::Rejected(errors) => routes::render(&cancel_confirm(&event_row, errors)),
    }
}
