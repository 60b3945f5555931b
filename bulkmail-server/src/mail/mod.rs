//! Outbound mail
//!
//! Provides traits for delivering messages, with:
//! - Real SMTP implementation using lettre, one transport per sender account
//! - Mock implementation for testing
//! - The campaign HTML wrapper with the tracking pixel

pub mod smtp;
pub mod template;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

pub use smtp::SmtpTransportFactory;

/// Mail delivery error
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    /// The server answered with an error reply
    #[error("SMTP {code}: {message}")]
    Rejected { code: u16, message: String },

    /// Connection, TLS or protocol failure without a reply code
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

impl MailError {
    /// SMTP reply code, when the server gave one.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Credentials and server of one sender account
#[derive(Clone)]
pub struct SmtpAccount {
    pub email: String,
    pub password: String,
    pub server: String,
    pub port: u16,
    /// TLS on: implicit TLS on port 465, STARTTLS elsewhere
    pub tls: bool,
}

impl std::fmt::Debug for SmtpAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpAccount")
            .field("email", &self.email)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

/// File attached to every message of a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// One rendered message for one recipient
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Arc<[MailAttachment]>,
}

/// An open connection to a sender's SMTP server (testable)
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Check that the server accepts the account's credentials.
    async fn verify(&self) -> Result<(), MailError>;

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Builds a transport per sender account
pub trait TransportFactory: Send + Sync {
    fn connect(&self, account: &SmtpAccount) -> Result<Box<dyn MailTransport>, MailError>;
}

/// Mock transport factory for testing
///
/// Every transport it builds records delivered mail into a shared log and
/// fails recipients listed in `failures`.
#[derive(Default, Clone)]
pub struct MockTransportFactory {
    inner: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    delivered: Mutex<Vec<OutgoingMail>>,
    failures: Mutex<Vec<(String, MailError)>>,
    refuse_verify: Mutex<Vec<String>>,
    connected: Mutex<Vec<String>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make delivery to `recipient` fail with `error`.
    pub fn fail_recipient(&self, recipient: &str, error: MailError) {
        lock(&self.inner.failures).push((recipient.to_string(), error));
    }

    /// Make `verify` fail for the account with this address.
    pub fn refuse_account(&self, email: &str) {
        lock(&self.inner.refuse_verify).push(email.to_string());
    }

    /// Messages accepted so far, in send order.
    pub fn delivered(&self) -> Vec<OutgoingMail> {
        lock(&self.inner.delivered).clone()
    }

    /// Sender addresses a transport was built for, in order.
    pub fn connected(&self) -> Vec<String> {
        lock(&self.inner.connected).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct MockTransport {
    account: String,
    state: Arc<MockState>,
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn verify(&self) -> Result<(), MailError> {
        if lock(&self.state.refuse_verify).contains(&self.account) {
            return Err(MailError::Transport(format!(
                "authentication failed for {}",
                self.account
            )));
        }
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let failure = lock(&self.state.failures)
            .iter()
            .find(|(to, _)| *to == mail.to)
            .map(|(_, err)| err.clone());

        match failure {
            Some(err) => Err(err),
            None => {
                lock(&self.state.delivered).push(mail.clone());
                Ok(())
            }
        }
    }
}

impl TransportFactory for MockTransportFactory {
    fn connect(&self, account: &SmtpAccount) -> Result<Box<dyn MailTransport>, MailError> {
        lock(&self.inner.connected).push(account.email.clone());
        Ok(Box::new(MockTransport {
            account: account.email.clone(),
            state: Arc::clone(&self.inner),
        }))
    }
}
