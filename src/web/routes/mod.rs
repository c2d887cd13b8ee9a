pub mod account;
pub mod admin;
pub mod calendar;
pub mod event;
pub mod events;
pub mod index;
pub mod volunteer;

use askama::Template;
use axum::http::header::SET_COOKIE;
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};

use crate::error::AppError;
use crate::models::EventWithHelpersRow;
use crate::web::middleware::auth;
use crate::web::state::AppState;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(index::index_page).post(index::login))
        .route(
            "/account/create/",
            get(account::create_page).post(account::create),
        )
        .route("/account/confirm/:user_id/:token", get(account::confirm))
        .route("/logout", post(account::logout));

    let protected = Router::new()
        .route("/account/", get(account::account_page))
        .route("/account/edit/", get(account::edit_page).post(account::edit))
        .route(
            "/account/cancel/",
            get(account::cancel_page).post(account::cancel),
        )
        .route("/account/resend/", post(account::resend))
        .route("/account/calendar.ics", get(calendar::calendar_feed))
        .route("/events/", get(events::events_page))
        .route("/event/create/", get(event::create_page).post(event::create))
        .route("/event/:id/", get(event::detail_page))
        .route("/event/:id/clone/", get(event::clone_page))
        .route("/event/:id/edit/", get(event::edit_page).post(event::edit))
        .route(
            "/event/:id/cancel/",
            get(event::cancel_page).post(event::cancel),
        )
        .route(
            "/event/:id/volunteer/",
            get(volunteer::volunteer_page).post(volunteer::volunteer),
        )
        .route(
            "/event/:id/unvolunteer/",
            get(volunteer::unvolunteer_page).post(volunteer::unvolunteer),
        )
        .route(
            "/event/:id/decline/:volunteer_id/",
            get(volunteer::decline_page).post(volunteer::decline),
        )
        .route("/admin/account-list/", get(admin::account_list))
        .route("/admin/account-approve-list/", get(admin::approve_list))
        .route(
            "/admin/account-approve/:id/",
            get(admin::approve_page).post(admin::approve),
        )
        .route("/admin/account-toggle/:action/:id/", post(admin::toggle))
        .route(
            "/admin/send-emails/",
            get(admin::send_emails_page).post(admin::send_emails),
        )
        .route("/admin/stats/", get(admin::stats_page))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    public.merge(protected).with_state(state)
}

pub(crate) fn render<T: Template>(template: &T) -> Result<Response, AppError> {
    Ok(Html(template.render()?).into_response())
}

pub(crate) fn session_cookie_header(session_id: &str) -> String {
    Cookie::build(("session", session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
        .to_string()
}

pub(crate) fn clear_session_cookie_header() -> String {
    Cookie::build(("session", ""))
        .path("/")
        .http_only(true)
        .max_age(cookie::time::Duration::ZERO)
        .build()
        .to_string()
}

pub(crate) fn redirect_with_cookie(target: &str, cookie: String) -> Response {
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(target)).into_response()
}

/// Human text behind the `?notice=` keys the POST handlers redirect with.
pub(crate) fn notice_message(key: &str) -> String {
    match key {
        "created" => "Your event has been created".to_string(),
        "updated" => "Your event has been updated".to_string(),
        "cancelled" => "The request for help at this event has been cancelled".to_string(),
        "volunteered" => "Thank you for volunteering to help".to_string(),
        "withdrawn" => "Your offer to help has been withdrawn".to_string(),
        "declined" => "The offer of help has been declined".to_string(),
        "details-updated" => "Your account details have been updated".to_string(),
        "confirmation-sent" => "A confirmation email is on its way to you".to_string(),
        "approved" => "The account has been approved".to_string(),
        "suspended" => "The account has been suspended".to_string(),
        "enabled" => "The account has been re-enabled".to_string(),
        _ => String::new(),
    }
}

/// One row of any events table: everything precomputed so the templates
/// just print.
pub struct EventView {
    pub id: i64,
    pub when: String,
    pub short_when: String,
    pub location: String,
    pub helpers_available: i64,
    pub helpers_required: i64,
    pub needs_helpers: bool,
    pub cancelled: bool,
    pub past: bool,
}

impl EventView {
    pub fn from_row(row: &EventWithHelpersRow, now: DateTime<Utc>) -> Self {
        EventView {
            id: row.event.id,
            when: row.event.when(),
            short_when: row.event.short_when(),
            location: row.event.location.clone(),
            helpers_available: row.helpers_available,
            helpers_required: row.event.helpers_required,
            needs_helpers: !row.event.is_cancelled()
                && !row.event.is_past(now)
                && row.helpers_available < row.event.helpers_required,
            cancelled: row.event.is_cancelled(),
            past: row.event.is_past(now),
        }
    }
}

/// A simple titled message page, for outcomes that don't belong to a form.
#[derive(Template)]
#[template(path = "message.html")]
pub struct MessageTemplate {
    pub title: String,
    pub messages: Vec<String>,
}

/// Are-you-sure page shared by the cancel, volunteer, withdraw and decline
/// actions. The button only appears while there are no errors.
#[derive(Template)]
#[template(path = "confirm.html")]
pub struct ConfirmTemplate {
    pub title: String,
    pub prompt: String,
    pub errors: Vec<String>,
    pub when: String,
    pub location: String,
    pub action: String,
    pub confirm_label: String,
}
