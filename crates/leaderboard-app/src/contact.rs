//! Contact form: validation, sanitization and hand-off to a mail relay.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::config::MailConfig;

/// Reply sent after a message was handed to the relay.
pub const SUCCESS_MESSAGE: &str = "Your message has been sent successfully!";

/// Whether a request from `origin` may proceed. Passes when either side is
/// unknown.
pub fn origin_allowed(origin: Option<&str>, allowed: Option<&str>) -> bool {
    match (origin, allowed) {
        (Some(origin), Some(allowed)) => origin == allowed,
        _ => true,
    }
}

/// Body of `POST /api/contact`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_owned(),
            message: message.to_owned(),
        }
    }
}

/// A validated form, trimmed, escaped and normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactForm {
    /// Check every field, collecting all failures.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.name.chars().count() < 2 {
            errors.push(FieldError::new("name", "Name must be at least 2 characters."));
        }
        if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email address."));
        }
        if self.message.chars().count() < 10 {
            errors.push(FieldError::new("message", "Message must be at least 10 characters."));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Sanitized copy for inclusion in an email.
    pub fn sanitize(&self) -> Submission {
        let email = self.email.trim();
        Submission {
            name: escape_html(self.name.trim()),
            email: normalize_email(email).unwrap_or_else(|| email.to_owned()),
            message: escape_html(self.message.trim()),
        }
    }
}

fn is_valid_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.rsplit_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c));
    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    local_ok && domain_ok
}

/// Replace characters significant in HTML with entities.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            other => out.push(other),
        }
    }
    out
}

/// Canonical form of an address: lower-cased, and for Gmail with dots and
/// `+tag` removed from the local part. `None` for text that is not an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let (local, domain) = raw.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    let local = local.to_lowercase();
    let domain = domain.to_lowercase();
    let (local, domain) = match domain.as_str() {
        "gmail.com" | "googlemail.com" => {
            let base = local.split('+').next().unwrap_or_default().replace('.', "");
            (base, "gmail.com".to_owned())
        }
        "outlook.com" | "hotmail.com" | "live.com" | "icloud.com" | "me.com" => {
            (local.split('+').next().unwrap_or_default().to_owned(), domain)
        }
        _ => (local, domain),
    };
    if local.is_empty() {
        return None;
    }
    Some(format!("{local}@{domain}"))
}

/// Finished message ready for a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Submission {
    /// Compose the notification for `from` → `to`.
    pub fn compose(&self, from: &str, to: &str) -> OutgoingMail {
        OutgoingMail {
            from: from.to_owned(),
            to: to.to_owned(),
            subject: format!("New Contact Form Submission from {}", self.name),
            text: format!(
                "You have received a new message from your website contact form.\n\nName: {}\nEmail: {}\nMessage:\n{}\n",
                self.name, self.email, self.message
            ),
            html: format!(
                "<p>You have received a new message from your website contact form.</p>\n<p><strong>Name:</strong> {}</p>\n<p><strong>Email:</strong> {}</p>\n<p><strong>Message:</strong></p>\n<p>{}</p>\n",
                self.name,
                self.email,
                self.message.replace('\n', "<br>")
            ),
        }
    }
}

/// Relay failure.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("mail relay is missing {0}")]
    NotConfigured(&'static str),
    #[error("mail spool unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("clock formatting failed: {0}")]
    Clock(#[from] time::error::Format),
}

/// Something that accepts finished messages for delivery.
pub trait MailRelay: Send + Sync + 'static {
    /// Check that the relay can accept messages.
    fn verify(&self) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Hand `mail` over. Returns the message id.
    fn send(&self, mail: &OutgoingMail) -> impl Future<Output = Result<String, RelayError>> + Send;
}

/// Relay that drops RFC 5322 messages into a directory for an MTA to pick up.
#[derive(Debug)]
pub struct SpoolRelay {
    dir: PathBuf,
    host: String,
    sequence: AtomicU64,
}

impl SpoolRelay {
    /// Spool into `dir`; `host` names the message-id domain.
    pub fn new(dir: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            host: host.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Spool relay described by the `[mail]` block.
    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(
            config.spool_dir.clone(),
            config.host.clone().unwrap_or_else(|| "localhost".to_owned()),
        )
    }

    /// Spool directory.
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

fn header_value(raw: &str) -> String {
    raw.replace(['\r', '\n'], " ")
}

fn render(mail: &OutgoingMail, message_id: &str, date: &str, boundary: &str) -> String {
    format!(
        "Date: {date}\r\nFrom: {from}\r\nTo: {to}\r\nSubject: {subject}\r\nMessage-ID: {message_id}\r\nMIME-Version: 1.0\r\nContent-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n--{boundary}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{text}\r\n--{boundary}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{html}\r\n--{boundary}--\r\n",
        from = header_value(&mail.from),
        to = header_value(&mail.to),
        subject = header_value(&mail.subject),
        text = mail.text.replace('\n', "\r\n"),
        html = mail.html.replace('\n', "\r\n"),
    )
}

impl MailRelay for SpoolRelay {
    async fn verify(&self) -> Result<(), RelayError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<String, RelayError> {
        let now = OffsetDateTime::now_utc();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stem = format!("{}.{seq}", now.unix_timestamp_nanos());
        let message_id = format!("<{stem}@{}>", self.host);
        let body = render(mail, &message_id, &now.format(&Rfc2822)?, &format!("=_{stem}"));

        let staged = self.dir.join(format!(".{stem}.tmp"));
        tokio::fs::write(&staged, body).await?;
        tokio::fs::rename(&staged, self.dir.join(format!("{stem}.eml"))).await?;
        Ok(message_id)
    }
}

/// Why a contact submission was not sent.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("Unauthorized request origin.")]
    Forbidden,
    #[error("invalid contact form")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Accepts contact submissions and relays them.
pub struct ContactService<M> {
    relay: M,
    from: Option<String>,
    to: Option<String>,
    allowed_origin: Option<String>,
}

impl<M: MailRelay> ContactService<M> {
    /// Service relaying through `relay` with the addresses of `mail`.
    pub fn new(relay: M, mail: &MailConfig, allowed_origin: Option<String>) -> Self {
        Self {
            relay,
            from: mail.from.clone(),
            to: mail.to.clone(),
            allowed_origin,
        }
    }

    /// Validate, sanitize and relay a submission. Returns the message id.
    pub async fn submit(&self, origin: Option<&str>, body: &[u8]) -> Result<String, ContactError> {
        if !origin_allowed(origin, self.allowed_origin.as_deref()) {
            return Err(ContactError::Forbidden);
        }
        let form: ContactForm = serde_json::from_slice(body).map_err(|err| {
            ContactError::Validation(vec![FieldError::new("body", &format!("Invalid JSON body: {err}"))])
        })?;
        form.validate().map_err(ContactError::Validation)?;
        let submission = form.sanitize();

        let from = self.from.as_deref().ok_or(RelayError::NotConfigured("EMAIL_FROM"))?;
        let to = self.to.as_deref().ok_or(RelayError::NotConfigured("EMAIL_TO"))?;
        let mail = submission.compose(from, to);

        self.relay.verify().await.inspect_err(|err| error!(%err, "Mail relay check failed"))?;
        let message_id = self
            .relay
            .send(&mail)
            .await
            .inspect_err(|err| error!(%err, "Contact form submission error"))?;
        info!(%message_id, "Message sent");
        Ok(message_id)
    }
}
