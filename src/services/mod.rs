pub mod account;
pub mod calendar;
pub mod clash;
pub mod event;
pub mod jobs;
pub mod mailer;
pub mod stats;
pub mod volunteer;

/// A service action either goes through or comes back with user-facing
/// error messages for the form to re-render. Database and programming
/// failures travel separately as `AppError`.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Rejected(Vec<String>),
}

impl<T> Outcome<T> {
    pub fn rejected(message: impl Into<String>) -> Self {
        Outcome::Rejected(vec![message.into()])
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }
}
