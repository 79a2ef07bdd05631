//! Outbound mail gateway.
//!
//! Sends the submitter-facing notices for terminal workflow transitions.
//! Delivery is fire and forget: the SMTP server's acceptance is the only
//! confirmation surfaced to the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config;
use crate::model::{prettify_backend_date, SubmissionKind, WorkoutEntry};

#[async_trait]
pub trait MailService: Send + Sync {
    async fn send(&self, subject: &str, recipients: &[String], html_body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

impl SmtpMailer {
    pub fn from_config(cfg: &config::Smtp) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .with_context(|| format!("invalid SMTP host: {}", cfg.host))?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        let from = cfg
            .from_address
            .parse()
            .with_context(|| format!("invalid from address: {}", cfg.from_address))?;
        let reply_to = cfg
            .reply_to
            .as_deref()
            .map(|addr| {
                addr.parse()
                    .with_context(|| format!("invalid reply-to address: {addr}"))
            })
            .transpose()?;
        Ok(Self {
            transport,
            from,
            reply_to,
        })
    }
}

#[async_trait]
impl MailService for SmtpMailer {
    async fn send(&self, subject: &str, recipients: &[String], html_body: &str) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        for recipient in recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .with_context(|| format!("invalid recipient address: {recipient}"))?;
            builder = builder.to(mailbox);
        }
        let message = builder
            .body(html_body.to_string())
            .context("failed to build email")?;
        self.transport
            .send(message)
            .await
            .context("failed to send email")?;
        Ok(())
    }
}

fn table_row(label: &str, value: &str) -> String {
    format!("<tr><td><b>{label}</b></td><td>{value}</td></tr>")
}

/// Invisible snippet shown by mail clients as the message preview.
fn preview_div(text: &str) -> String {
    format!(r#"<div style="display: none; max-height: 0px; overflow: hidden;">{text}</div>"#)
}

/// Body of the approval notice, with the full field table so the submitter
/// can spot a mistake without visiting the map.
pub fn approval_body(entry: &WorkoutEntry, kind: SubmissionKind, base_url: &str) -> String {
    let mut body = preview_div(&format!(
        "{} -> {} @ {}",
        kind.as_str(),
        entry.workout_name,
        entry.region
    ));
    body.push_str(&format!(
        r#"<p>Your map request has been approved and should show up on the map within the hour. If you see a mistake, use this <a href="{base_url}/map-changes">link</a> to submit a correction. Reply to this email with any other issues.</p>"#
    ));
    body.push_str(r#"<table border="1" style="border-collapse:collapse" cellpadding="5">"#);
    for (label, value) in [
        ("Region", entry.region.as_str()),
        ("Workout Name", entry.workout_name.as_str()),
        ("Street 1", entry.street_1.as_str()),
        ("Street 2", entry.street_2.as_str()),
        ("City", entry.city.as_str()),
        ("State", entry.state.as_str()),
        ("ZIP Code", entry.zip_code.as_str()),
        ("Country", entry.country.as_str()),
        ("Latitude", entry.latitude.as_str()),
        ("Longitude", entry.longitude.as_str()),
        ("Weekday", entry.weekday.as_str()),
        ("Time", entry.time.as_str()),
        ("Type", entry.workout_type.as_str()),
        ("Region Website", entry.website.as_str()),
        ("Region Logo", entry.logo.as_str()),
        ("Notes", entry.notes.as_str()),
        ("Submitter", entry.submitter_name.as_str()),
        ("Submitter Email", entry.submitter_email.as_str()),
    ] {
        body.push_str(&table_row(label, value));
    }
    body.push_str(&table_row(
        "Request Created",
        &prettify_backend_date(&entry.date_created),
    ));
    body.push_str(&table_row(
        "Request Updated",
        &prettify_backend_date(&entry.date_updated),
    ));
    body.push_str("</table>");
    body
}

/// Body of the notice sent when a delete request is carried out.
pub fn deletion_body(workout_name: &str, region: &str) -> String {
    let mut body = preview_div(&format!("Deleted -> {workout_name} @ {region}"));
    body.push_str(&format!(
        "<p>Your request to remove <b>{workout_name}</b> ({region}) from the map has been processed. The workout should disappear from the map within the hour. Reply to this email with any issues.</p>"
    ));
    body
}

/// Body of the notice sent when a delete request is rejected.
pub fn rejection_body(workout_name: &str, region: &str) -> String {
    let mut body = preview_div(&format!("Kept -> {workout_name} @ {region}"));
    body.push_str(&format!(
        "<p>Your request to remove <b>{workout_name}</b> ({region}) from the map was reviewed and declined, so the workout stays on the map. Reply to this email if you believe this is a mistake.</p>"
    ));
    body
}
