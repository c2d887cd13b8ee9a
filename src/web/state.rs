use sqlx::SqlitePool;

use crate::services::mailer::Mailer;

/// Everything a handler needs: the pool, the outgoing mailer and the secret
/// behind email-confirmation tokens.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub mailer: Mailer,
    pub secret: String,
}
