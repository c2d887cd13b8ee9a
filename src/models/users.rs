use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub tower: Option<String>,
    pub phone_number: Option<String>,
    pub created: DateTime<Utc>,
    pub email_validated: Option<DateTime<Utc>>,
    pub approved: Option<DateTime<Utc>>,
    pub suspended: Option<DateTime<Utc>>,
    pub cancelled: Option<DateTime<Utc>>,
    pub email_blocked: Option<DateTime<Utc>>,
    pub reminded_upto: Option<DateTime<Utc>>,
    pub send_notifications: i64,
    pub send_other: i64,
    pub is_admin: i64,
}

impl UserRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Live accounts have confirmed their email address and been approved by
    /// an administrator, and are neither suspended nor cancelled. This is the
    /// single predicate gating every core (non-public) page.
    pub fn is_enabled(&self) -> bool {
        self.email_validated.is_some()
            && self.approved.is_some()
            && self.suspended.is_none()
            && self.cancelled.is_none()
    }

    /// Registered but not yet live, and not suspended or cancelled either.
    pub fn is_pending(&self) -> bool {
        (self.email_validated.is_none() || self.approved.is_none())
            && self.suspended.is_none()
            && self.cancelled.is_none()
    }

    pub fn is_administrator(&self) -> bool {
        self.is_admin != 0
    }

    /// Whether this user may be sent an email. Cancelled, suspended and
    /// bounce-blocked accounts never receive mail. A forced send (account
    /// confirmation and the like) skips the validated-address and
    /// notification-preference checks; nothing skips the first three.
    pub fn may_email(&self, forced: bool) -> bool {
        if self.cancelled.is_some() || self.suspended.is_some() || self.email_blocked.is_some() {
            return false;
        }
        forced || (self.email_validated.is_some() && self.send_notifications != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> UserRow {
        UserRow {
            id: 1,
            email: "ringer@example.org".into(),
            password_hash: String::new(),
            first_name: "Betty".into(),
            last_name: "Ringer".into(),
            tower: Some("Little Shelford".into()),
            phone_number: None,
            created: Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap(),
            email_validated: None,
            approved: None,
            suspended: None,
            cancelled: None,
            email_blocked: None,
            reminded_upto: None,
            send_notifications: 1,
            send_other: 0,
            is_admin: 0,
        }
    }

    #[test]
    fn enabled_requires_both_validation_and_approval() {
        let now = Utc::now();
        let mut u = user();
        assert!(!u.is_enabled());
        assert!(u.is_pending());

        u.email_validated = Some(now);
        assert!(!u.is_enabled());

        u.approved = Some(now);
        assert!(u.is_enabled());
        assert!(!u.is_pending());

        u.suspended = Some(now);
        assert!(!u.is_enabled());
        assert!(!u.is_pending());
    }

    #[test]
    fn may_email_gates_on_flags() {
        let now = Utc::now();
        let mut u = user();

        // Unvalidated address: only forced mail goes out
        assert!(!u.may_email(false));
        assert!(u.may_email(true));

        u.email_validated = Some(now);
        assert!(u.may_email(false));

        u.send_notifications = 0;
        assert!(!u.may_email(false));
        assert!(u.may_email(true));
    }

    #[test]
    fn cancelled_and_suspended_never_emailed_even_forced() {
        let now = Utc::now();
        let mut u = user();
        u.email_validated = Some(now);
        u.approved = Some(now);

        u.suspended = Some(now);
        assert!(!u.may_email(true));

        u.suspended = None;
        u.cancelled = Some(now);
        assert!(!u.may_email(true));

        u.cancelled = None;
        u.email_blocked = Some(now);
        assert!(!u.may_email(true));
    }
}
