use askama::Template;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;

use crate::database::event_repo::{self, EventFilters};
use crate::error::AppError;
use crate::web::middleware::auth::CurrentUser;
use crate::web::routes::{self, EventView};
use crate::web::state::AppState;

const PAGE_SIZE: i64 = 20;

/// Clamp a requested page against a total row count. Returns the page, the
/// page count, and the half-open slice of rows to show.
fn page_bounds(total: usize, requested: Option<i64>) -> (i64, i64, usize, usize) {
    let page_count = ((total as i64 + PAGE_SIZE - 1) / PAGE_SIZE).max(1);
    let page = requested.unwrap_or(1).clamp(1, page_count);
    let start = ((page - 1) * PAGE_SIZE) as usize;
    let end = (start + PAGE_SIZE as usize).min(total);
    (page, page_count, start, end)
}

#[derive(Template)]
#[template(path = "events.html")]
pub struct EventsTemplate {
    pub events: Vec<EventView>,
    pub include_past: bool,
    pub include_cancelled: bool,
    pub mine: bool,
    pub by_location: bool,
    pub page: i64,
    pub page_count: i64,
    /// The filter flags as a query-string fragment, so the pagination links
    /// carry them along.
    pub flags_query: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    pub page: Option<i64>,
    /// Present whenever the filter form was submitted; checkboxes are
    /// otherwise indistinguishable from the first visit.
    pub f: Option<String>,
    pub past: Option<String>,
    pub cancelled: Option<String>,
    pub mine: Option<String>,
    pub bylocation: Option<String>,
}

pub async fn events_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, AppError> {
    if !user.is_enabled() {
        return Ok(Redirect::to("/account/").into_response());
    }
    let now = Utc::now();

    let (include_past, include_cancelled, mine, by_location) = if query.f.is_some() {
        (
            query.past.is_some(),
            query.cancelled.is_some(),
            query.mine.is_some(),
            query.bylocation.is_some(),
        )
    } else {
        (false, true, false, false)
    };
    let filters = EventFilters {
        include_past,
        include_cancelled,
        sort_by_location: by_location,
    };

    let mut flags_query = String::from("f=1");
    if include_past {
        flags_query.push_str("&past=on");
    }
    if include_cancelled {
        flags_query.push_str("&cancelled=on");
    }
    if mine {
        flags_query.push_str("&mine=on");
    }
    if by_location {
        flags_query.push_str("&bylocation=on");
    }

    if mine {
        let mut rows = event_repo::list_owned(&state.pool, &filters, now, user.id).await?;
        for row in event_repo::list_volunteered(&state.pool, &filters, now, user.id).await? {
            if !rows.iter().any(|r| r.event.id == row.event.id) {
                rows.push(row);
            }
        }
        if by_location {
            rows.sort_by(|a, b| {
                (&a.event.location, a.event.start).cmp(&(&b.event.location, b.event.start))
            });
        } else {
            rows.sort_by_key(|r| r.event.start);
        }
        let (page, page_count, start, end) = page_bounds(rows.len(), query.page);
        let events = rows[start..end].iter().map(|r| EventView::from_row(r, now)).collect();
        return routes::render(&EventsTemplate {
            events,
            include_past,
            include_cancelled,
            mine,
            by_location,
            page,
            page_count,
            flags_query,
        });
    }

    let total = event_repo::count_matching(&state.pool, &filters, now).await?;
    let (page, page_count, _, _) = page_bounds(total as usize, query.page);
    let rows =
        event_repo::list_page(&state.pool, &filters, now, PAGE_SIZE, (page - 1) * PAGE_SIZE).await?;
    let events = rows.iter().map(|r| EventView::from_row(r, now)).collect();

    routes::render(&EventsTemplate {
        events,
        include_past,
        include_cancelled,
        mine,
        by_location,
        page,
        page_count,
        flags_query,
    })
}
