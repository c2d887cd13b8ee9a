use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Form};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::services::account::{self, DetailsUpdate, Registration};
use crate::services::Outcome;
use crate::web::middleware::auth::{self, CurrentUser};
use crate::web::routes::{self, MessageTemplate};
use crate::web::state::AppState;

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Template)]
#[template(path = "account_create.html")]
pub struct AccountCreateTemplate {
    pub errors: Vec<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tower: String,
    pub phone_number: String,
}

impl AccountCreateTemplate {
    fn empty() -> Self {
        AccountCreateTemplate {
            errors: Vec::new(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            tower: String::new(),
            phone_number: String::new(),
        }
    }
}

pub async fn create_page() -> Result<Response, AppError> {
    routes::render(&AccountCreateTemplate::empty())
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password1: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub tower: String,
    #[serde(default)]
    pub phone_number: String,
}

pub async fn create(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let rerender = |errors| AccountCreateTemplate {
        errors,
        email: form.email.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        tower: form.tower.clone(),
        phone_number: form.phone_number.clone(),
    };

    if form.password1 != form.password2 {
        return routes::render(&rerender(vec!["The two passwords don't match".to_string()]));
    }

    let registration = Registration {
        email: form.email.trim().to_string(),
        password: form.password1.clone(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        tower: blank_to_none(form.tower.clone()),
        phone_number: blank_to_none(form.phone_number.clone()),
    };
    match account::register(&state.pool, &state.mailer, &state.secret, registration, Utc::now())
        .await?
    {
        Outcome::Ok(_) => routes::render(&MessageTemplate {
            title: "Account created".to_string(),
            messages: vec![
                "Thank you for registering. We have sent you an email with a link to confirm \
                 your address - please click it."
                    .to_string(),
                "Once your address is confirmed an administrator will review your account."
                    .to_string(),
            ],
        }),
        Outcome::Rejected(errors) => routes::render(&rerender(errors)),
    }
}

pub async fn confirm(
    State(state): State<AppState>,
    Path((user_id, token)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    match account::confirm_email(&state.pool, &state.secret, user_id, &token, Utc::now()).await? {
        Outcome::Ok(user) => {
            let mut messages = vec!["Thank you - your email address is confirmed.".to_string()];
            if user.approved.is_none() {
                messages.push(
                    "An administrator still has to approve your account before you can use it; \
                     you will get an email when that happens."
                        .to_string(),
                );
            }
            routes::render(&MessageTemplate {
                title: "Email address confirmed".to_string(),
                messages,
            })
        }
        Outcome::Rejected(errors) => routes::render(&MessageTemplate {
            title: "Confirmation failed".to_string(),
            messages: errors,
        }),
    }
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if let Some(session_id) = auth::session_cookie(&headers) {
        account::logout(&state.pool, &session_id).await?;
    }
    Ok(routes::redirect_with_cookie(
        "/",
        routes::clear_session_cookie_header(),
    ))
}

#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub name: String,
    pub email: String,
    pub tower: String,
    pub phone_number: String,
    pub send_notifications: bool,
    pub send_other: bool,
    pub needs_confirmation: bool,
    pub needs_approval: bool,
    pub is_admin: bool,
    pub notice: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

pub async fn account_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<NoticeQuery>,
) -> Result<Response, AppError> {
    routes::render(&AccountTemplate {
        name: user.full_name(),
        email: user.email.clone(),
        tower: user.tower.clone().unwrap_or_default(),
        phone_number: user.phone_number.clone().unwrap_or_default(),
        send_notifications: user.send_notifications != 0,
        send_other: user.send_other != 0,
        needs_confirmation: user.email_validated.is_none(),
        needs_approval: user.email_validated.is_some() && user.approved.is_none(),
        is_admin: user.is_administrator(),
        notice: query
            .notice
            .as_deref()
            .map(routes::notice_message)
            .unwrap_or_default(),
    })
}

#[derive(Template)]
#[template(path = "account_edit.html")]
pub struct AccountEditTemplate {
    pub errors: Vec<String>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tower: String,
    pub phone_number: String,
    pub send_notifications: bool,
    pub send_other: bool,
}

pub async fn edit_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    routes::render(&AccountEditTemplate {
        errors: Vec::new(),
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        tower: user.tower.clone().unwrap_or_default(),
        phone_number: user.phone_number.clone().unwrap_or_default(),
        send_notifications: user.send_notifications != 0,
        send_other: user.send_other != 0,
    })
}

#[derive(Debug, Deserialize)]
pub struct DetailsForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub tower: String,
    #[serde(default)]
    pub phone_number: String,
    pub send_notifications: Option<String>,
    pub send_other: Option<String>,
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<DetailsForm>,
) -> Result<Response, AppError> {
    let update = DetailsUpdate {
        email: form.email.trim().to_string(),
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        tower: blank_to_none(form.tower.clone()),
        phone_number: blank_to_none(form.phone_number.clone()),
        send_notifications: form.send_notifications.is_some(),
        send_other: form.send_other.is_some(),
    };
    match account::update_details(&state.pool, &state.mailer, &state.secret, &user, update).await? {
        Outcome::Ok(()) => Ok(Redirect::to("/account/?notice=details-updated").into_response()),
        Outcome::Rejected(errors) => routes::render(&AccountEditTemplate {
            errors,
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
            tower: form.tower,
            phone_number: form.phone_number,
            send_notifications: form.send_notifications.is_some(),
            send_other: form.send_other.is_some(),
        }),
    }
}

pub async fn resend(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    match account::resend_confirmation(&state.mailer, &state.secret, &user).await? {
        Outcome::Ok(()) => Ok(Redirect::to("/account/?notice=confirmation-sent").into_response()),
        Outcome::Rejected(_) => Ok(Redirect::to("/account/").into_response()),
    }
}

#[derive(Template)]
#[template(path = "account_cancel.html")]
pub struct AccountCancelTemplate {
    pub errors: Vec<String>,
    pub can_cancel: bool,
}

pub async fn cancel_page(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    let errors = account::cancellation_errors(&state.pool, &user, Utc::now()).await?;
    let can_cancel = errors.is_empty();
    routes::render(&AccountCancelTemplate { errors, can_cancel })
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    match account::cancel_account(&state.pool, &user, Utc::now()).await? {
        Outcome::Ok(()) => Ok(routes::redirect_with_cookie(
            "/",
            routes::clear_session_cookie_header(),
        )),
        Outcome::Rejected(errors) => routes::render(&AccountCancelTemplate {
            errors,
            can_cancel: false,
        }),
    }
}
