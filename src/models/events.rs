use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
    pub helpers_required: i64,
    pub owner_id: i64,
    pub created: DateTime<Utc>,
    pub cancelled: Option<DateTime<Utc>>,
    pub contact_address: Option<String>,
    pub notes: Option<String>,
    pub owner_reminded: Option<DateTime<Utc>>,
}

impl EventRow {
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.start < now
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_some()
    }

    /// Contact address for the event, defaulting to the owner's address.
    pub fn contact<'a>(&'a self, owner_email: &'a str) -> &'a str {
        self.contact_address.as_deref().unwrap_or(owner_email)
    }

    /// "Saturday, 5 March 1960, 2:00 to 4:00 pm". The start only carries an
    /// am marker when the event spans midday.
    pub fn when(&self) -> String {
        let am = if self.start.hour() < 12 && self.end.hour() >= 12 {
            " am"
        } else {
            ""
        };
        format!(
            "{}{} to {}",
            self.start.format("%A, %-d %B %Y, %-I:%M"),
            am,
            self.end.format("%-I:%M %P")
        )
    }

    /// "Sat, 5 Mar, 2:00-4:00 pm"; the year only appears around the turn of
    /// the year (December and January) when it stops being obvious.
    pub fn short_when(&self) -> String {
        let year = if self.start.month() == 1 || self.start.month() == 12 {
            " %Y"
        } else {
            ""
        };
        let am = if self.start.hour() < 12 && self.end.hour() >= 12 {
            " am"
        } else {
            ""
        };
        format!(
            "{}{}-{}",
            self.start.format(&format!("%a, %-d %b{year}, %-I:%M")),
            am,
            self.end.format("%-I:%M %P")
        )
    }
}

/// An event joined with its current helper count, for list pages and the
/// advert job.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventWithHelpersRow {
    #[sqlx(flatten)]
    pub event: EventRow,
    pub helpers_available: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(start: DateTime<Utc>, end: DateTime<Utc>) -> EventRow {
        EventRow {
            id: 1,
            start,
            end,
            location: "Little Shelford".into(),
            helpers_required: 2,
            owner_id: 1,
            created: start,
            cancelled: None,
            contact_address: None,
            notes: None,
            owner_reminded: None,
        }
    }

    #[test]
    fn when_marks_am_only_across_midday() {
        let morning = event(
            Utc.with_ymd_and_hms(1960, 3, 5, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1960, 3, 5, 11, 30, 0).unwrap(),
        );
        assert_eq!(morning.when(), "Saturday, 5 March 1960, 10:00 to 11:30 am");

        let spanning = event(
            Utc.with_ymd_and_hms(1960, 3, 5, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1960, 3, 5, 14, 0, 0).unwrap(),
        );
        assert_eq!(
            spanning.when(),
            "Saturday, 5 March 1960, 10:00 am to 2:00 pm"
        );
    }

    #[test]
    fn short_when_includes_year_only_near_new_year() {
        let march = event(
            Utc.with_ymd_and_hms(1960, 3, 5, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1960, 3, 5, 16, 0, 0).unwrap(),
        );
        assert_eq!(march.short_when(), "Sat, 5 Mar, 2:00-4:00 pm");

        let december = event(
            Utc.with_ymd_and_hms(1960, 12, 3, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1960, 12, 3, 16, 0, 0).unwrap(),
        );
        assert_eq!(december.short_when(), "Sat, 3 Dec 1960, 2:00-4:00 pm");
    }

    #[test]
    fn contact_defaults_to_owner_address() {
        let mut e = event(
            Utc.with_ymd_and_hms(1960, 3, 5, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1960, 3, 5, 16, 0, 0).unwrap(),
        );
        assert_eq!(e.contact("owner@example.org"), "owner@example.org");
        e.contact_address = Some("tower@example.org".into());
        assert_eq!(e.contact("owner@example.org"), "tower@example.org");
    }
}
