use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VolunteerRow {
    pub id: i64,
    pub event_id: i64,
    pub person_id: i64,
    pub created: DateTime<Utc>,
    pub withdrawn: Option<DateTime<Utc>>,
    pub declined: Option<DateTime<Utc>>,
}

impl VolunteerRow {
    /// An offer counts while it has been neither withdrawn nor declined.
    pub fn is_current(&self) -> bool {
        self.withdrawn.is_none() && self.declined.is_none()
    }
}

/// A volunteer row joined with the person it belongs to, for the event
/// detail page and cancellation notices.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VolunteerWithPersonRow {
    #[sqlx(flatten)]
    pub volunteer: VolunteerRow,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl VolunteerWithPersonRow {
    pub fn person_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
