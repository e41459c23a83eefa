use futures::future::BoxFuture;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use epistle_core::config::SmtpConfig;
use epistle_core::error::{EpistleError, Result};
use epistle_core::traits::MailTransport;
use epistle_core::types::OutboundMail;

/// SMTP mailer over an implicit-TLS (SMTPS) relay.
///
/// The configured username doubles as the From address.
#[derive(Debug)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .username
            .parse()
            .map_err(|e| EpistleError::Mail(format!("invalid sender address: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| EpistleError::Mail(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutboundMail) -> BoxFuture<'_, Result<()>> {
        let mail = mail.clone();
        Box::pin(async move {
            let to: Mailbox = mail
                .to
                .parse()
                .map_err(|e| EpistleError::Mail(format!("invalid recipient address: {}", e)))?;

            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(mail.subject)
                .body(mail.body)
                .map_err(|e| EpistleError::Mail(e.to_string()))?;

            self.transport
                .send(message)
                .await
                .map_err(|e| EpistleError::Mail(e.to_string()))?;

            info!(to = %mail.to, "Email delivered");
            Ok(())
        })
    }
}
