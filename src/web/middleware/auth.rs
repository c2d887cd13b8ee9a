use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::error;

use crate::database::session_repo;
use crate::models::UserRow;
use crate::web::state::AppState;

/// The logged-in user, injected by [`require_auth`] for every protected
/// handler. Pages beyond the account screen additionally check
/// `is_enabled()` themselves.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserRow);

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split("; ")
                .find_map(|c| c.strip_prefix("session="))
        })
        .map(|v| v.to_string())
}

/// Resolve the session cookie to a user, if there is one. For public pages
/// that render differently when someone is logged in.
pub async fn maybe_user(state: &AppState, headers: &HeaderMap) -> Option<UserRow> {
    let session_id = session_cookie(headers)?;
    match session_repo::find_user(&state.pool, &session_id).await {
        Ok(Some(user)) if user.cancelled.is_none() && user.suspended.is_none() => Some(user),
        Ok(_) => None,
        Err(e) => {
            error!("session lookup failed: {}", e);
            None
        }
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(session_id) = session_cookie(request.headers()) {
        match session_repo::find_user(&state.pool, &session_id).await {
            // Suspension and cancellation kill sessions server-side too, but
            // the cookie may outlive them
            Ok(Some(user)) if user.cancelled.is_none() && user.suspended.is_none() => {
                request.extensions_mut().insert(CurrentUser(user));
                return next.run(request).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!("session lookup failed: {}", e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }
    Redirect::to("/").into_response()
}
