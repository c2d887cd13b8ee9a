use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::Utc;

use crate::error::AppError;
use crate::services::calendar;
use crate::web::middleware::auth::CurrentUser;
use crate::web::state::AppState;

/// The per-user iCalendar feed. Available as soon as the account exists so
/// people can subscribe their calendar app while still awaiting approval.
pub async fn calendar_feed(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    let ics = calendar::user_calendar(&state.pool, &user, Utc::now()).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        ics,
    )
        .into_response())
}
