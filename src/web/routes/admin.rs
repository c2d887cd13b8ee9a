use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::database::user_repo;
use crate::error::AppError;
use crate::models::UserRow;
use crate::services::account;
use crate::services::stats::{self, StatsScreen};
use crate::services::Outcome;
use crate::web::middleware::auth::CurrentUser;
use crate::web::routes::{self, MessageTemplate};
use crate::web::state::AppState;

fn require_admin(user: &UserRow) -> Result<(), AppError> {
    if user.is_administrator() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub struct AccountView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub tower: String,
    pub joined: String,
    pub status: String,
    pub pending: bool,
    pub suspended: bool,
    pub cancelled: bool,
}

impl AccountView {
    fn from_row(user: &UserRow) -> Self {
        let status = if user.cancelled.is_some() {
            "cancelled"
        } else if user.suspended.is_some() {
            "suspended"
        } else if user.is_enabled() {
            "live"
        } else if user.email_validated.is_none() {
            "awaiting email confirmation"
        } else {
            "awaiting approval"
        };
        AccountView {
            id: user.id,
            name: user.full_name(),
            email: user.email.clone(),
            tower: user.tower.clone().unwrap_or_default(),
            joined: user.created.format("%-d %b %Y").to_string(),
            status: status.to_string(),
            pending: user.is_pending() && user.email_validated.is_some(),
            suspended: user.suspended.is_some(),
            cancelled: user.cancelled.is_some(),
        }
    }
}

#[derive(Template)]
#[template(path = "admin/accounts.html")]
pub struct AccountListTemplate {
    pub accounts: Vec<AccountView>,
    pub notice: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

pub async fn account_list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let users = user_repo::list_all(&state.pool).await?;
    routes::render(&AccountListTemplate {
        accounts: users.iter().map(AccountView::from_row).collect(),
        notice: query
            .notice
            .as_deref()
            .map(routes::notice_message)
            .unwrap_or_default(),
    })
}

#[derive(Template)]
#[template(path = "admin/approvals.html")]
pub struct ApprovalListTemplate {
    pub accounts: Vec<AccountView>,
    pub notice: String,
}

pub async fn approve_list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let users = user_repo::list_awaiting_approval(&state.pool, Utc::now()).await?;
    routes::render(&ApprovalListTemplate {
        accounts: users.iter().map(AccountView::from_row).collect(),
        notice: query
            .notice
            .as_deref()
            .map(routes::notice_message)
            .unwrap_or_default(),
    })
}

#[derive(Template)]
#[template(path = "admin/approve.html")]
pub struct ApproveTemplate {
    pub name: String,
    pub email: String,
    pub action: String,
}

pub async fn approve_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let subject = user_repo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound)?;
    routes::render(&ApproveTemplate {
        name: subject.full_name(),
        email: subject.email.clone(),
        action: format!("/admin/account-approve/{id}/"),
    })
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    match account::approve_account(&state.pool, &state.mailer, id, Utc::now()).await? {
        Outcome::Ok(_) => {
            Ok(Redirect::to("/admin/account-approve-list/?notice=approved").into_response())
        }
        Outcome::Rejected(errors) => routes::render(&MessageTemplate {
            title: "Approval failed".to_string(),
            messages: errors,
        }),
    }
}

pub async fn toggle(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((action, id)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let suspend = match action.as_str() {
        "suspend" => true,
        "enable" => false,
        _ => return Err(AppError::NotFound),
    };
    match account::set_suspension(&state.pool, id, suspend, Utc::now()).await? {
        Outcome::Ok(_) => {
            let notice = if suspend { "suspended" } else { "enabled" };
            Ok(Redirect::to(&format!("/admin/account-list/?notice={notice}")).into_response())
        }
        Outcome::Rejected(errors) => routes::render(&MessageTemplate {
            title: "Account unchanged".to_string(),
            messages: errors,
        }),
    }
}

#[derive(Template)]
#[template(path = "admin/send_emails.html")]
pub struct SendEmailsTemplate {
    pub errors: Vec<String>,
    pub notice: String,
    pub subject: String,
    pub message: String,
}

pub async fn send_emails_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    routes::render(&SendEmailsTemplate {
        errors: Vec::new(),
        notice: String::new(),
        subject: String::new(),
        message: String::new(),
    })
}

#[derive(Debug, Deserialize)]
pub struct BroadcastForm {
    pub subject: String,
    pub message: String,
    /// Also reach people who opted out of general email. For service
    /// announcements only.
    pub force: Option<String>,
}

pub async fn send_emails(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<BroadcastForm>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let mut errors = Vec::new();
    if form.subject.trim().is_empty() {
        errors.push("Please enter a subject".to_string());
    }
    if form.message.trim().is_empty() {
        errors.push("Please enter a message".to_string());
    }
    if !errors.is_empty() {
        return routes::render(&SendEmailsTemplate {
            errors,
            notice: String::new(),
            subject: form.subject,
            message: form.message,
        });
    }

    let forced = form.force.is_some();
    let addresses: Vec<String> = user_repo::list_all(&state.pool)
        .await?
        .iter()
        .filter(|u| u.may_email(forced))
        .map(|u| u.email.clone())
        .collect();
    state
        .mailer
        .send_bcc(&addresses, form.subject.trim(), &form.message)
        .await;
    info!(
        "\"{}\" broadcast \"{}\" to {} people",
        user.full_name(),
        form.subject.trim(),
        addresses.len()
    );

    routes::render(&SendEmailsTemplate {
        errors: Vec::new(),
        notice: format!("Sent to {} people", addresses.len()),
        subject: String::new(),
        message: String::new(),
    })
}

#[derive(Template)]
#[template(path = "admin/stats.html")]
pub struct StatsTemplate {
    pub stats: StatsScreen,
}

pub async fn stats_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    require_admin(&user)?;
    let stats = stats::build_stats_screen(&state.pool, Utc::now()).await?;
    routes::render(&StatsTemplate { stats })
}
