//! Outgoing email.

use anyhow::Context;
use askama::Template;
use mailgun_v3::email::{self, Message, MessageBody};
use mailgun_v3::{Credentials, EmailAddress};
use tracing::{debug, info};

pub mod reminder;
pub mod reset_password;

pub const MAILGUN_NAME: &str = "Cadence";
pub const MAILGUN_EMAIL: &str = "mail@cadence.band";
pub const MAILGUN_DOMAIN: &str = "mail.cadence.band";

pub struct Recipient<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

pub trait Email: Template {
    fn subject(&self) -> String;
    fn recipient(&self) -> Recipient<'_>;
}

/// Where emails go. Without a Mailgun token, emails are only logged.
#[derive(Clone, Debug)]
pub enum Mailer {
    Mailgun { token: String },
    Log,
}

impl Mailer {
    pub fn new(mailgun_token: Option<String>) -> Self {
        match mailgun_token {
            Some(token) => Mailer::Mailgun { token },
            None => Mailer::Log,
        }
    }

    pub async fn send(&self, email: impl Email) -> anyhow::Result<()> {
        let subject = email.subject();
        let body = email.render().context("Failed to render email")?;
        let recipient = email.recipient();

        match self {
            Mailer::Log => {
                info!(to = recipient.email, %subject, "not sending email without a Mailgun token");
                debug!("{}", body);
                Ok(())
            }
            Mailer::Mailgun { token } => {
                let creds = Credentials::new(token, MAILGUN_DOMAIN);
                let sender = EmailAddress::name_address(MAILGUN_NAME, MAILGUN_EMAIL);
                let message = Message {
                    to: vec![EmailAddress::name_address(recipient.name, recipient.email)],
                    subject,
                    body: MessageBody::Html(body),
                    ..Default::default()
                };

                email::async_impl::send_email(&creds, &sender, message)
                    .await
                    .map(|_| ())
                    .map_err(|err| anyhow::anyhow!("Failed to send email: {err}"))
            }
        }
    }
}
