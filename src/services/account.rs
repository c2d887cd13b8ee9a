//! Account lifecycle: registration, email confirmation, login sessions,
//! detail edits, cancellation, and the administrator approve/suspend
//! actions.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use askama::Template;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::database::{event_repo, session_repo, user_repo};
use crate::error::AppError;
use crate::models::UserRow;
use crate::services::mailer::{AccountApprovedEmail, AccountConfirmEmail, Mailer};
use crate::services::Outcome;

type HmacSha256 = Hmac<Sha256>;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        // Cancelled accounts carry an empty, unusable hash
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Token for the email-confirmation link: HMAC over the id and the address
/// so a change of address invalidates outstanding links.
pub fn confirmation_token(secret: &str, user_id: i64, email: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(format!("{user_id}:{email}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn confirmation_token_matches(secret: &str, user: &UserRow, token: &str) -> bool {
    let Ok(given) = hex::decode(token) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(format!("{}:{}", user.id, user.email).as_bytes());
    mac.verify_slice(&given).is_ok()
}

pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub tower: Option<String>,
    pub phone_number: Option<String>,
}

pub async fn register(
    pool: &SqlitePool,
    mailer: &Mailer,
    secret: &str,
    registration: Registration,
    now: DateTime<Utc>,
) -> Result<Outcome<UserRow>, AppError> {
    let mut errors = Vec::new();
    if !registration.email.contains('@') {
        errors.push("Please enter a valid email address".to_string());
    }
    if registration.password.len() < 8 {
        errors.push("Passwords must be at least 8 characters long".to_string());
    }
    if registration.first_name.trim().is_empty() || registration.last_name.trim().is_empty() {
        errors.push("Please enter your name".to_string());
    }
    if user_repo::find_by_email(pool, &registration.email)
        .await?
        .is_some()
    {
        errors.push("An account with that email address already exists".to_string());
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    let password_hash = hash_password(&registration.password)?;
    let id = user_repo::insert_user(
        pool,
        &registration.email,
        &password_hash,
        registration.first_name.trim(),
        registration.last_name.trim(),
        registration.tower.as_deref(),
        registration.phone_number.as_deref(),
        now,
    )
    .await?;
    let user = user_repo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::NotFound)?;

    send_confirmation(mailer, secret, &user).await?;
    info!("\"{}\" registered", user.full_name());
    Ok(Outcome::Ok(user))
}

pub async fn send_confirmation(
    mailer: &Mailer,
    secret: &str,
    user: &UserRow,
) -> Result<(), AppError> {
    let token = confirmation_token(secret, user.id, &user.email);
    let email = AccountConfirmEmail {
        first_name: &user.first_name,
        confirm_url: format!("{}/account/confirm/{}/{}", mailer.base_url, user.id, token),
    };
    let body = email.render()?;
    mailer.send_to_user(user, true, email.subject(), &body).await;
    Ok(())
}

pub async fn confirm_email(
    pool: &SqlitePool,
    secret: &str,
    user_id: i64,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Outcome<UserRow>, AppError> {
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !confirmation_token_matches(secret, &user, token) {
        return Ok(Outcome::rejected(
            "That confirmation link is not valid for this account",
        ));
    }
    if user.email_validated.is_none() {
        user_repo::set_email_validated(pool, user.id, now).await?;
        info!("\"{}\" confirmed their email address", user.full_name());
    }
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Outcome::Ok(user))
}

pub async fn resend_confirmation(
    mailer: &Mailer,
    secret: &str,
    user: &UserRow,
) -> Result<Outcome<()>, AppError> {
    if user.email_validated.is_some() {
        return Ok(Outcome::rejected(
            "Your email address has already been confirmed",
        ));
    }
    send_confirmation(mailer, secret, user).await?;
    Ok(Outcome::Ok(()))
}

pub async fn login(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<Outcome<(UserRow, String)>, AppError> {
    let Some(user) = user_repo::find_by_email(pool, email).await? else {
        return Ok(Outcome::rejected("Bad email address or password"));
    };
    if !verify_password(password, &user.password_hash) {
        return Ok(Outcome::rejected("Bad email address or password"));
    }
    if user.cancelled.is_some() {
        return Ok(Outcome::rejected("Bad email address or password"));
    }
    if user.suspended.is_some() {
        info!("login attempt by suspended user \"{}\"", user.full_name());
        return Ok(Outcome::rejected(
            "Your account is suspended - please contact the administrators",
        ));
    }

    let session_id = Uuid::new_v4().to_string();
    session_repo::create(pool, &session_id, user.id, now).await?;
    info!("\"{}\" logged in", user.full_name());
    Ok(Outcome::Ok((user, session_id)))
}

pub async fn logout(pool: &SqlitePool, session_id: &str) -> Result<(), AppError> {
    session_repo::delete(pool, session_id).await?;
    Ok(())
}

pub struct DetailsUpdate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tower: Option<String>,
    pub phone_number: Option<String>,
    pub send_notifications: bool,
    pub send_other: bool,
}

pub async fn update_details(
    pool: &SqlitePool,
    mailer: &Mailer,
    secret: &str,
    user: &UserRow,
    update: DetailsUpdate,
) -> Result<Outcome<()>, AppError> {
    let mut errors = Vec::new();
    if !update.email.contains('@') {
        errors.push("Please enter a valid email address".to_string());
    }
    if update.first_name.trim().is_empty() || update.last_name.trim().is_empty() {
        errors.push("Please enter your name".to_string());
    }
    if update.email != user.email {
        if let Some(other) = user_repo::find_by_email(pool, &update.email).await? {
            if other.id != user.id {
                errors.push("An account with that email address already exists".to_string());
            }
        }
    }
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    let email_changed = update.email != user.email;
    user_repo::update_details(
        pool,
        user.id,
        &update.email,
        update.first_name.trim(),
        update.last_name.trim(),
        update.tower.as_deref(),
        update.phone_number.as_deref(),
        update.send_notifications,
        update.send_other,
    )
    .await?;
    if email_changed {
        // The new address has to be confirmed before it counts
        user_repo::clear_email_validated(pool, user.id).await?;
        if let Some(updated) = user_repo::find_by_id(pool, user.id).await? {
            send_confirmation(mailer, secret, &updated).await?;
        }
    }
    info!("\"{}\" updated account details", user.full_name());
    Ok(Outcome::Ok(()))
}

/// Guards alone; shared by the GET confirm page and the POST.
pub async fn cancellation_errors(
    pool: &SqlitePool,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Vec<String>, AppError> {
    let mut errors = Vec::new();
    if user.cancelled.is_some() {
        errors.push("This account has already been cancelled".to_string());
        return Ok(errors);
    }
    if !event_repo::future_owned_by(pool, user.id, now).await?.is_empty() {
        errors.push(
            "You are the organiser of events that have yet to happen. You must cancel them \
             or wait for them to happen before you can cancel your account."
                .to_string(),
        );
    }
    if !event_repo::future_volunteered_by(pool, user.id, now)
        .await?
        .is_empty()
    {
        errors.push(
            "You have volunteered to help with events that have yet to happen. You must \
             withdraw your offer or wait for them to happen before you can cancel your account."
                .to_string(),
        );
    }
    if user.is_administrator() {
        errors.push("Administrator accounts can't be cancelled here.".to_string());
    }
    Ok(errors)
}

/// Terminal. Scrubs the personal fields, disables the login and drops any
/// live sessions, all in one transaction.
pub async fn cancel_account(
    pool: &SqlitePool,
    user: &UserRow,
    now: DateTime<Utc>,
) -> Result<Outcome<()>, AppError> {
    let errors = cancellation_errors(pool, user, now).await?;
    if !errors.is_empty() {
        return Ok(Outcome::Rejected(errors));
    }

    // Capture the name before the scrub destroys it
    let log_message = format!("\"{}\" cancelled their account", user.full_name());

    let mut tx = pool.begin().await.map_err(AppError::Database)?;
    let scrubbed = user_repo::cancel_and_scrub(&mut *tx, user.id, now).await?;
    if scrubbed == 0 {
        // Lost the race with another cancel
        tx.rollback().await.map_err(AppError::Database)?;
        return Ok(Outcome::rejected("This account has already been cancelled"));
    }
    session_repo::delete_for_user(&mut *tx, user.id).await?;
    tx.commit().await.map_err(AppError::Database)?;

    info!("{}", log_message);
    Ok(Outcome::Ok(()))
}

pub async fn approve_account(
    pool: &SqlitePool,
    mailer: &Mailer,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Outcome<UserRow>, AppError> {
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if user.cancelled.is_some() {
        return Ok(Outcome::rejected("That account has been cancelled"));
    }
    if user.approved.is_some() {
        return Ok(Outcome::rejected("That account is already approved"));
    }

    user_repo::set_approved(pool, user.id, now).await?;
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let email = AccountApprovedEmail {
        first_name: &user.first_name,
        base_url: &mailer.base_url,
    };
    let body = email.render()?;
    mailer.send_to_user(&user, true, email.subject(), &body).await;

    info!("\"{}\" approved", user.full_name());
    Ok(Outcome::Ok(user))
}

/// Suspension is the reversible half of the lifecycle; `suspend = false`
/// re-enables the account.
pub async fn set_suspension(
    pool: &SqlitePool,
    user_id: i64,
    suspend: bool,
    now: DateTime<Utc>,
) -> Result<Outcome<UserRow>, AppError> {
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if user.cancelled.is_some() {
        return Ok(Outcome::rejected("That account has been cancelled"));
    }

    let at = if suspend { Some(now) } else { None };
    user_repo::set_suspended(pool, user.id, at).await?;
    if suspend {
        session_repo::delete_for_user(pool, user.id).await?;
        info!("\"{}\" suspended", user.full_name());
    } else {
        info!("\"{}\" re-enabled", user.full_name());
    }
    let user = user_repo::find_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Outcome::Ok(user))
}
