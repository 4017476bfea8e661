/// Out-of-band email notifications for exchange participants
use crate::config::EmailSettings;
use crate::error::{AppError, Result};
use crate::models::User;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewMessage,
    ScheduleUpdated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewMessage => "new_message",
            NotificationKind::ScheduleUpdated => "schedule_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContext {
    pub sender_name: String,
    pub message_preview: Option<String>,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// The `notify` capability. Callers log failures and carry on.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &User,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<()>;
}

/// Plain-text rendering of each notification kind
pub fn render(
    kind: NotificationKind,
    recipient: &User,
    context: &NotificationContext,
    base_url: &str,
) -> RenderedEmail {
    match kind {
        NotificationKind::NewMessage => {
            let preview = context
                .message_preview
                .as_deref()
                .map(|m| truncate_message_preview(m, PREVIEW_MAX_CHARS))
                .unwrap_or_default();
            RenderedEmail {
                subject: format!("New message from {}", context.sender_name),
                body: format!(
                    "Hi {},\n\n{} sent you a message:\n\n{}\n\nReply on Bazaar: {}/messages\n",
                    recipient.profile.name, context.sender_name, preview, base_url
                ),
            }
        }
        NotificationKind::ScheduleUpdated => RenderedEmail {
            subject: format!("Update on your exchange with {}", context.sender_name),
            body: format!(
                "Hi {},\n\nYour exchange with {} has been updated! Please log on to Bazaar to review it.\n",
                recipient.profile.name, context.sender_name
            ),
        },
    }
}

/// Truncate message preview to a maximum length, adding ellipsis if needed
pub fn truncate_message_preview(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        message.to_string()
    } else {
        let truncated: String = message.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// SMTP notifier, or a logging no-op when no host is configured
#[derive(Clone)]
pub struct EmailNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    base_url: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; email notifier will operate in no-op mode");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| AppError::Config(format!("Failed to configure SMTP transport: {}", e)))?
            .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self {
            transport,
            from,
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn send_mail(&self, recipient: &str, email: &RenderedEmail) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                subject = %email.subject,
                recipient, "email notifier in no-op mode; skipping send"
            );
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| AppError::Validation(format!("Invalid recipient email address: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(header::ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| AppError::Notification(format!("Failed to build email message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::Transport(format!("SMTP send failed: {}", e)))?;
        info!(subject = %email.subject, "email sent");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        recipient: &User,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<()> {
        let email = render(kind, recipient, context, &self.base_url);
        self.send_mail(&recipient.email, &email).await
    }
}
