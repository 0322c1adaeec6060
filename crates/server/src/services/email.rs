//! Templated transactional email.
//!
//! The signup flow only needs [`MailDispatcher::send_templated`]. Production
//! uses [`SmtpMailer`] (SMTP via lettre, Askama text + HTML bodies); local
//! runs without SMTP settings and the test suites use [`OutboxMailer`].

use std::sync::atomic::{AtomicBool, Ordering};

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::sync::Mutex;

use signup_core::{Email, Otp};

use crate::config::EmailConfig;

/// HTML template for the passcode email.
#[derive(Template)]
#[template(path = "email/otp.html")]
struct OtpEmailHtml<'a> {
    code: &'a str,
    expiry_minutes: u32,
}

/// Plain text template for the passcode email.
#[derive(Template)]
#[template(path = "email/otp.txt")]
struct OtpEmailText<'a> {
    code: &'a str,
    expiry_minutes: u32,
}

/// HTML template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    name: &'a str,
}

/// Plain text template for the welcome email.
#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    name: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The dispatcher refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// One message per template, with the fields that template needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTemplate {
    /// Passcode for the verification stage.
    Otp {
        code: Otp,
        /// Advisory lifetime stated in the message.
        expiry_minutes: u32,
    },
    /// Sent once the account exists.
    Welcome { name: String },
}

impl MailTemplate {
    /// Stable template name, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Otp { .. } => "otp",
            Self::Welcome { .. } => "welcome",
        }
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::Otp { .. } => "Your OTP Verification Code".to_owned(),
            Self::Welcome { name } => format!("Welcome, {name}!"),
        }
    }

    /// Render the plain text and HTML bodies.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Template` if rendering fails.
    pub fn render(&self) -> Result<(String, String), MailError> {
        match self {
            Self::Otp {
                code,
                expiry_minutes,
            } => {
                let code = code.to_string();
                let text = OtpEmailText {
                    code: &code,
                    expiry_minutes: *expiry_minutes,
                }
                .render()?;
                let html = OtpEmailHtml {
                    code: &code,
                    expiry_minutes: *expiry_minutes,
                }
                .render()?;
                Ok((text, html))
            }
            Self::Welcome { name } => {
                let text = WelcomeEmailText { name }.render()?;
                let html = WelcomeEmailHtml { name }.render()?;
                Ok((text, html))
            }
        }
    }
}

/// Sends templated email.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    /// Render `template` and deliver it to `to`.
    ///
    /// # Errors
    ///
    /// Returns `MailError` if rendering or delivery fails.
    async fn send_templated(&self, to: &Email, template: &MailTemplate) -> Result<(), MailError>;
}

/// SMTP mail dispatcher.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new SMTP dispatcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl MailDispatcher for SmtpMailer {
    async fn send_templated(&self, to: &Email, template: &MailTemplate) -> Result<(), MailError> {
        let (text, html) = template.render()?;
        self.send_multipart_email(to.as_str(), &template.subject(), text, html)
            .await
    }
}

/// A message recorded by [`OutboxMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: Email,
    pub subject: String,
    pub template: MailTemplate,
    pub text: String,
}

/// Dispatcher that keeps messages in memory instead of delivering them.
///
/// Can be switched to reject every message to exercise dispatch failures.
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<SentMail>>,
    rejecting: AtomicBool,
}

impl OutboxMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject (`true`) or accept (`false`) subsequent messages.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Every accepted message, oldest first.
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    /// The most recent passcode sent to `to`.
    pub async fn last_otp_for(&self, to: &Email) -> Option<Otp> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .filter(|mail| &mail.to == to)
            .find_map(|mail| match mail.template {
                MailTemplate::Otp { code, .. } => Some(code),
                MailTemplate::Welcome { .. } => None,
            })
    }
}

#[async_trait]
impl MailDispatcher for OutboxMailer {
    async fn send_templated(&self, to: &Email, template: &MailTemplate) -> Result<(), MailError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(MailError::Rejected(format!(
                "outbox is rejecting {} mail",
                template.name()
            )));
        }

        let (text, _html) = template.render()?;
        let subject = template.subject();
        tracing::info!(to = %to, template = template.name(), subject = %subject, "Email queued in outbox");
        tracing::debug!(body = %text, "Outbox message body");

        self.sent.lock().await.push(SentMail {
            to: to.clone(),
            subject,
            template: template.clone(),
            text,
        });
        Ok(())
    }
}
