use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;
use crate::error::AppError;

/// A file attached to an outgoing email.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// An outgoing email with plain-text and HTML bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
}

/// Trait for sending email, enabling mock testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), AppError>;
}

/// SMTP implementation of the Mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the transport for `config.server`; STARTTLS relay when
    /// `use_tls` is set, plain SMTP otherwise.
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        let host = config
            .server
            .as_deref()
            .ok_or_else(|| AppError::Config("mail.server not set".into()))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| AppError::Email(format!("SMTP connection failed: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        let subject = email.subject.clone();
        let message = build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Email(format!("Failed to send '{subject}': {e}")))?;

        Ok(())
    }
}

/// Mailer used when no mail server is configured: drops every message.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        tracing::warn!(
            "Mail server not configured, dropping '{}' to {:?}",
            email.subject,
            email.recipients
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AppError> {
    address
        .parse()
        .map_err(|e| AppError::Email(format!("Invalid address '{address}': {e}")))
}

/// Assemble a multipart/mixed message: a plain/HTML alternative followed by
/// one part per attachment.
pub fn build_message(email: Email) -> Result<Message, AppError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&email.sender)?)
        .subject(email.subject);

    for recipient in &email.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
        email.text_body,
        email.html_body,
    ));

    for attachment in email.attachments {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
            AppError::Email(format!(
                "Invalid content type '{}': {e}",
                attachment.content_type
            ))
        })?;
        body = body.singlepart(MailAttachment::new(attachment.filename).body(attachment.content, content_type));
    }

    builder
        .multipart(body)
        .map_err(|e| AppError::Email(format!("Failed to build email: {e}")))
}
