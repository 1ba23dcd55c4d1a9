use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::config::MailerConfig;

/// Outbound mail, kept behind a trait per spec §4.J's "external collaborator,
/// interface only" framing — swapped for a fake in tests.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invite(&self, to: &str, room_name: &str, url: &str) -> anyhow::Result<()>;
}

/// SMTP-backed default, built the way the reference backend builds its S3
/// client: a thin `from_config` constructor over a third-party transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn from_config(config: &MailerConfig) -> anyhow::Result<Self> {
        let transport = if config.smtp_username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .port(config.smtp_port)
                .credentials(Credentials::new(
                    config.smtp_username.clone(),
                    config.smtp_password.clone(),
                ))
                .build()
        };

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invite(&self, to: &str, room_name: &str, url: &str) -> anyhow::Result<()> {
        let body = format!(
            "<p>You've been invited to the file room \"{room_name}\".</p><p><a href=\"{url}\">{url}</a></p>"
        );

        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(format!("You're invited to \"{room_name}\""))
            .header(ContentType::TEXT_HTML)
            .body(body)?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// Used in tests and anywhere a live SMTP relay shouldn't be required.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_invite(&self, _to: &str, _room_name: &str, _url: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
