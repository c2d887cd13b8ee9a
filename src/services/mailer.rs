//! Outgoing email. Sends are synchronous and best-effort: a failed delivery
//! is logged and swallowed, and never rolls back the database change it
//! accompanied.

use askama::Template;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::models::UserRow;

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    pub base_url: String,
}

impl Mailer {
    pub fn new(
        relay: &str,
        username: String,
        password: String,
        from: Mailbox,
        base_url: String,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Mailer {
            transport: Some(transport),
            from,
            base_url,
        })
    }

    /// No SMTP relay configured: log what would have been sent. Used in
    /// development, tests and job dry runs.
    pub fn disabled(from: Mailbox, base_url: String) -> Self {
        Mailer {
            transport: None,
            from,
            base_url,
        }
    }

    pub fn from_address(&self) -> &Mailbox {
        &self.from
    }

    /// Send to a user, honouring their lifecycle and notification flags.
    /// `forced` is for mail the user needs regardless of preferences, such
    /// as the address-confirmation message; it never overrides cancellation
    /// or suspension.
    pub async fn send_to_user(&self, user: &UserRow, forced: bool, subject: &str, body: &str) {
        if !user.may_email(forced) {
            info!("not emailing {} \"{}\": gated", user.email, subject);
            return;
        }
        self.send_to_address(&user.email, subject, body).await;
    }

    pub async fn send_to_address(&self, to: &str, subject: &str, body: &str) {
        let mailbox: Mailbox = match to.parse() {
            Ok(mb) => mb,
            Err(e) => {
                error!("bad recipient address {}: {}", to, e);
                return;
            }
        };
        let message = Message::builder()
            .from(self.from.clone())
            .to(mailbox)
            .subject(subject)
            .body(body.to_string());
        match message {
            Ok(message) => self.deliver(message, to, subject).await,
            Err(e) => error!("building email to {} failed: {}", to, e),
        }
    }

    /// One message, all recipients on BCC, ourselves on CC so the admin sees
    /// what went out. Used by the advert job and the broadcast screen.
    pub async fn send_bcc(&self, addresses: &[String], subject: &str, body: &str) {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .cc(self.from.clone())
            .subject(subject);
        for address in addresses {
            match address.parse::<Mailbox>() {
                Ok(mb) => builder = builder.bcc(mb),
                Err(e) => error!("bad bcc address {}: {}", address, e),
            }
        }
        match builder.body(body.to_string()) {
            Ok(message) => self.deliver(message, "bcc list", subject).await,
            Err(e) => error!("building bcc email failed: {}", e),
        }
    }

    async fn deliver(&self, message: Message, to: &str, subject: &str) {
        match &self.transport {
            Some(transport) => match transport.send(message).await {
                Ok(_) => info!("emailed {} \"{}\"", to, subject),
                Err(e) => error!("email to {} \"{}\" failed: {}", to, subject, e),
            },
            None => info!("email suppressed (no relay): {} \"{}\"", to, subject),
        }
    }
}

// Template pairs, subject beside body. View code fills these with
// precomputed strings so the text templates just print.

#[derive(Template)]
#[template(path = "email/account_confirm.txt")]
pub struct AccountConfirmEmail<'a> {
    pub first_name: &'a str,
    pub confirm_url: String,
}

impl AccountConfirmEmail<'_> {
    pub fn subject(&self) -> &'static str {
        "AutoPerry: please confirm your email address"
    }
}

#[derive(Template)]
#[template(path = "email/account_approved.txt")]
pub struct AccountApprovedEmail<'a> {
    pub first_name: &'a str,
    pub base_url: &'a str,
}

impl AccountApprovedEmail<'_> {
    pub fn subject(&self) -> &'static str {
        "AutoPerry: your account has been approved"
    }
}

#[derive(Template)]
#[template(path = "email/event_created.txt")]
pub struct EventCreatedEmail<'a> {
    pub first_name: &'a str,
    pub when: String,
    pub location: &'a str,
    pub event_url: String,
}

impl EventCreatedEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: event created at {}", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/event_edited.txt")]
pub struct EventEditedEmail<'a> {
    pub first_name: &'a str,
    pub when: String,
    pub location: &'a str,
    pub event_url: String,
}

impl EventEditedEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: event at {} updated", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/event_cancelled.txt")]
pub struct EventCancelledEmail<'a> {
    pub first_name: &'a str,
    pub when: String,
    pub location: &'a str,
}

impl EventCancelledEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: event at {} cancelled", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/volunteer_added.txt")]
pub struct VolunteerAddedEmail<'a> {
    pub first_name: &'a str,
    pub helper_name: String,
    pub when: String,
    pub location: &'a str,
    pub event_url: String,
}

impl VolunteerAddedEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: new helper for {}", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/volunteer_withdrawn.txt")]
pub struct VolunteerWithdrawnEmail<'a> {
    pub first_name: &'a str,
    pub helper_name: String,
    pub when: String,
    pub location: &'a str,
    pub event_url: String,
}

impl VolunteerWithdrawnEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: a helper has withdrawn from {}", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/volunteer_declined.txt")]
pub struct VolunteerDeclinedEmail<'a> {
    pub first_name: &'a str,
    pub when: String,
    pub location: &'a str,
    pub contact: &'a str,
}

impl VolunteerDeclinedEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: your offer to help at {} was declined", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/owner_reminder.txt")]
pub struct OwnerReminderEmail<'a> {
    pub first_name: &'a str,
    pub when: String,
    pub location: &'a str,
    pub helpers_available: i64,
    pub helpers_required: i64,
    pub event_url: String,
}

impl OwnerReminderEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: your event at {} is coming up", self.location)
    }
}

#[derive(Template)]
#[template(path = "email/helper_digest.txt")]
pub struct HelperDigestEmail<'a> {
    pub first_name: &'a str,
    pub this_week: bool,
    pub lines: Vec<String>,
    pub base_url: &'a str,
}

impl HelperDigestEmail<'_> {
    pub fn subject(&self) -> &'static str {
        if self.this_week {
            "AutoPerry: your ringing this week"
        } else {
            "AutoPerry: your ringing next week"
        }
    }
}

#[derive(Template)]
#[template(path = "email/admin_approvals.txt")]
pub struct AdminApprovalsEmail<'a> {
    pub count: usize,
    pub base_url: &'a str,
}

impl AdminApprovalsEmail<'_> {
    pub fn subject(&self) -> String {
        format!("AutoPerry: {} account(s) awaiting approval", self.count)
    }
}

#[derive(Template)]
#[template(path = "email/advert.txt")]
pub struct AdvertEmail<'a> {
    pub weeks: i64,
    pub lines: Vec<String>,
    pub base_url: &'a str,
}

impl AdvertEmail<'_> {
    pub fn subject(&self) -> &'static str {
        "AutoPerry: upcoming events needing helpers"
    }
}
