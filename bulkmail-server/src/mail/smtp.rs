//! SMTP delivery via lettre

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use super::{MailError, MailTransport, OutgoingMail, SmtpAccount, TransportFactory};

/// Port on which TLS is negotiated before any SMTP traffic
const IMPLICIT_TLS_PORT: u16 = 465;

const OCTET_STREAM: &str = "application/octet-stream";

/// Connections kept open per sender during a send
const POOL_SIZE: u32 = 4;

/// Builds pooled lettre transports
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpTransportFactory;

impl TransportFactory for SmtpTransportFactory {
    fn connect(&self, account: &SmtpAccount) -> Result<Box<dyn MailTransport>, MailError> {
        let credentials = Credentials::new(account.email.clone(), account.password.clone());

        let builder = if !account.tls {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&account.server)
        } else if account.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&account.server)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&account.server)
                .map_err(|e| MailError::Transport(e.to_string()))?
        };

        let transport = builder
            .port(account.port)
            .credentials(credentials)
            .pool_config(PoolConfig::new().max_size(POOL_SIZE))
            .build();

        debug!(
            sender = %account.email,
            server = %account.server,
            port = account.port,
            tls = account.tls,
            "SMTP transport created"
        );

        Ok(Box::new(SmtpTransport { transport }))
    }
}

/// Pooled connection to one sender's server
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn verify(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Transport(
                "server did not accept the connection".to_string(),
            )),
            Err(e) => Err(classify(e)),
        }
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(mail)?;
        self.transport.send(message).await.map_err(classify)?;
        Ok(())
    }
}

/// Build the MIME message: HTML body plus attachments.
pub fn build_message(mail: &OutgoingMail) -> Result<Message, MailError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|_| MailError::InvalidAddress(mail.from.clone()))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?;

    let builder = Message::builder().from(from).to(to).subject(&mail.subject);

    if mail.attachments.is_empty() {
        return builder
            .singlepart(SinglePart::html(mail.html.clone()))
            .map_err(|e| MailError::Build(e.to_string()));
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html.clone()));
    for attachment in mail.attachments.iter() {
        let content_type = ContentType::parse(&attachment.content_type)
            .or_else(|_| ContentType::parse(OCTET_STREAM))
            .map_err(|e| MailError::Build(e.to_string()))?;
        body = body.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.content.clone(), content_type),
        );
    }

    builder
        .multipart(body)
        .map_err(|e| MailError::Build(e.to_string()))
}

/// Split lettre errors into server rejections (with a reply code) and
/// transport failures.
fn classify(err: lettre::transport::smtp::Error) -> MailError {
    match err.status().and_then(|code| code.to_string().parse::<u16>().ok()) {
        Some(code) => MailError::Rejected {
            code,
            message: err.to_string(),
        },
        None => MailError::Transport(err.to_string()),
    }
}
