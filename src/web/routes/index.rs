use askama::Template;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::database::event_repo;
use crate::error::AppError;
use crate::services::account;
use crate::services::Outcome;
use crate::web::middleware::auth;
use crate::web::routes::{self, EventView};
use crate::web::state::AppState;

const DEFAULT_WINDOW_DAYS: i64 = 14;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub logged_in: bool,
    pub user_name: String,
    pub errors: Vec<String>,
    pub events: Vec<EventView>,
    pub days: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct IndexQuery {
    pub days: Option<i64>,
}

/// The front page. Logged out it carries the login form; logged in it lists
/// the upcoming events that still need helpers.
pub async fn index_page(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(user) = auth::maybe_user(&state, &headers).await else {
        return routes::render(&IndexTemplate {
            logged_in: false,
            user_name: String::new(),
            errors: Vec::new(),
            events: Vec::new(),
            days: DEFAULT_WINDOW_DAYS,
        });
    };
    if !user.is_enabled() {
        return Ok(Redirect::to("/account/").into_response());
    }

    let days = match query.days {
        Some(d @ (14 | 28 | 56)) => d,
        _ => DEFAULT_WINDOW_DAYS,
    };
    let now = Utc::now();
    let rows = event_repo::list_needing_helpers(&state.pool, now, now + Duration::days(days)).await?;
    let events = rows.iter().map(|r| EventView::from_row(r, now)).collect();

    routes::render(&IndexTemplate {
        logged_in: true,
        user_name: user.full_name(),
        errors: Vec::new(),
        events,
        days,
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let now = Utc::now();
    match account::login(&state.pool, &form.email, &form.password, now).await? {
        Outcome::Ok((user, session_id)) => {
            let target = if user.is_enabled() { "/events/" } else { "/account/" };
            Ok(routes::redirect_with_cookie(
                target,
                routes::session_cookie_header(&session_id),
            ))
        }
        Outcome::Rejected(errors) => routes::render(&IndexTemplate {
            logged_in: false,
            user_name: String::new(),
            errors,
            events: Vec::new(),
            days: DEFAULT_WINDOW_DAYS,
        }),
    }
}
