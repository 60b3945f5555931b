//! Campaign dispatch
//!
//! A dispatch sends one message to every member of a list, spreading the
//! recipients over one or more sender accounts:
//!
//! 1. validate the request and the sender capacity
//! 2. open a send row (`sending`)
//! 3. per sender: verify its SMTP account, then deliver its slice in
//!    batches with a pause between batches
//! 4. record one outcome per recipient, then close the send (`completed`)
//!
//! Any failure after step 2 closes the send as `error`.

pub mod attachments;
pub mod ledger;
pub mod plan;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub use attachments::{AttachmentError, AttachmentSource};
pub use ledger::{MemoryLedger, PgLedger, SendLedger};
pub use plan::OverCapacity;

use crate::config::DispatchSettings;
use crate::db::{Contact, DbError, NewSend, RecipientOutcome};
use crate::mail::{
    template, MailAttachment, MailError, MailTransport, OutgoingMail, SmtpAccount,
    TransportFactory,
};

/// Lowest SMTP reply code recorded as a bounce
const BOUNCE_CODE_MIN: u16 = 400;

/// Dispatch request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub list_id: Option<i64>,
    /// Single sender; takes precedence over `sender_ids`
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub sender_ids: Vec<i64>,
    #[serde(default)]
    pub attachments: Vec<AttachmentSource>,
}

impl DispatchRequest {
    pub fn senders(&self) -> Vec<i64> {
        match self.sender_id {
            Some(id) => vec![id],
            None => self.sender_ids.clone(),
        }
    }
}

/// Outcome of a completed dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub message: String,
    pub subject: String,
    pub list_id: i64,
    pub sender_ids: Vec<i64>,
    pub total_recipients: usize,
    pub sent: usize,
    pub bounced: usize,
    pub batches: usize,
    pub send_id: i64,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: u64,
}

/// Why a send stopped before completing
#[derive(Debug, thiserror::Error)]
pub enum AbortReason {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("list_id is required")]
    MissingList,

    #[error("at least one sender is required")]
    NoSenders,

    #[error("the list has no contacts")]
    EmptyList,

    #[error(transparent)]
    OverCapacity(#[from] OverCapacity),

    /// Failure before a send row existed
    #[error(transparent)]
    Db(#[from] DbError),

    /// Failure after the send row was opened; the send is marked `error`
    #[error("send {send_id} failed: {reason}")]
    Aborted {
        send_id: i64,
        #[source]
        reason: AbortReason,
    },
}

#[derive(Debug, Default)]
struct Tally {
    sent: usize,
    bounced: usize,
    batches: usize,
}

/// Per-request dispatcher
pub struct Dispatcher<'a> {
    ledger: &'a dyn SendLedger,
    transports: &'a dyn TransportFactory,
    http: &'a reqwest::Client,
    settings: &'a DispatchSettings,
    tracking_base_url: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        ledger: &'a dyn SendLedger,
        transports: &'a dyn TransportFactory,
        http: &'a reqwest::Client,
        settings: &'a DispatchSettings,
        tracking_base_url: &'a str,
    ) -> Self {
        Self {
            ledger,
            transports,
            http,
            settings,
            tracking_base_url,
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchReport, DispatchError> {
        let started = Instant::now();

        let list_id = request.list_id.ok_or(DispatchError::MissingList)?;
        let sender_ids = request.senders();
        if sender_ids.is_empty() {
            return Err(DispatchError::NoSenders);
        }

        let recipients = self.ledger.recipients(list_id).await?;
        if recipients.is_empty() {
            return Err(DispatchError::EmptyList);
        }
        plan::check_capacity(
            recipients.len(),
            sender_ids.len(),
            self.settings.max_per_sender,
        )?;

        let send_id = self
            .ledger
            .open(&NewSend {
                subject: request.subject.clone(),
                body: request.body.clone(),
                user_id: sender_ids[0],
                list_id,
                total_recipients: i32::try_from(recipients.len()).unwrap_or(i32::MAX),
            })
            .await?;

        info!(
            send_id,
            list_id,
            recipients = recipients.len(),
            senders = sender_ids.len(),
            "dispatch started"
        );

        let tally = match self.run(send_id, &request, &sender_ids, &recipients).await {
            Ok(tally) => tally,
            Err(reason) => {
                warn!(send_id, error = %reason, "dispatch aborted");
                if let Err(e) = self.ledger.fail(send_id, &reason.to_string()).await {
                    warn!(send_id, error = %e, "failed to mark send as error");
                }
                return Err(DispatchError::Aborted { send_id, reason });
            }
        };

        let duration_secs = started.elapsed().as_secs();
        info!(
            send_id,
            sent = tally.sent,
            bounced = tally.bounced,
            batches = tally.batches,
            duration_secs,
            "dispatch completed"
        );

        Ok(DispatchReport {
            message: format!(
                "Campaign sent to {} of {} recipients",
                tally.sent,
                recipients.len()
            ),
            subject: request.subject,
            list_id,
            sender_ids,
            total_recipients: recipients.len(),
            sent: tally.sent,
            bounced: tally.bounced,
            batches: tally.batches,
            send_id,
            timestamp: Utc::now(),
            duration_secs,
        })
    }

    async fn run(
        &self,
        send_id: i64,
        request: &DispatchRequest,
        sender_ids: &[i64],
        recipients: &[Contact],
    ) -> Result<Tally, AbortReason> {
        let attachments: Arc<[MailAttachment]> =
            attachments::fetch_all(self.http, &request.attachments)
                .await?
                .into();

        let mut tally = Tally::default();
        let slices = plan::partition(recipients, sender_ids.len(), self.settings.max_per_sender);

        for (&sender_id, slice) in sender_ids.iter().zip(slices) {
            if slice.is_empty() {
                continue;
            }

            let Some(user) = self.ledger.sender(sender_id).await? else {
                warn!(send_id, sender_id, "sender not found, skipping its recipients");
                continue;
            };
            let Some(account) = user.smtp_account() else {
                warn!(
                    send_id,
                    sender_id,
                    username = %user.username,
                    "sender has no SMTP credentials, skipping its recipients"
                );
                continue;
            };

            let transport = self.transports.connect(&account)?;
            transport.verify().await?;

            let batches: Vec<&[Contact]> = slice.chunks(self.settings.batch_size.max(1)).collect();
            for (i, batch) in batches.iter().enumerate() {
                tally.batches += 1;
                info!(
                    send_id,
                    batch = tally.batches,
                    sender = %account.email,
                    size = batch.len(),
                    "sending batch"
                );

                for contact in batch.iter() {
                    let outcome = self
                        .deliver(transport.as_ref(), &account, request, contact, &attachments)
                        .await;
                    match outcome {
                        RecipientOutcome::Sent { .. } => tally.sent += 1,
                        RecipientOutcome::Bounced { .. } => tally.bounced += 1,
                    }
                    self.ledger.record(send_id, contact.id, &outcome).await?;
                }

                if i + 1 < batches.len() {
                    tokio::time::sleep(self.settings.batch_delay).await;
                }
            }
        }

        self.ledger
            .complete(
                send_id,
                i32::try_from(tally.sent).unwrap_or(i32::MAX),
                i32::try_from(tally.bounced).unwrap_or(i32::MAX),
            )
            .await?;

        Ok(tally)
    }

    /// Send to one recipient; failures become bounce outcomes.
    async fn deliver(
        &self,
        transport: &dyn MailTransport,
        account: &SmtpAccount,
        request: &DispatchRequest,
        contact: &Contact,
        attachments: &Arc<[MailAttachment]>,
    ) -> RecipientOutcome {
        let token = Uuid::new_v4();
        let pixel = template::tracking_url(self.tracking_base_url, token);

        let mail = OutgoingMail {
            from: account.email.clone(),
            to: contact.email.clone(),
            subject: request.subject.clone(),
            html: template::render_campaign(&request.body, &pixel),
            attachments: Arc::clone(attachments),
        };

        match transport.send(&mail).await {
            Ok(()) => RecipientOutcome::Sent {
                tracking_token: token,
            },
            Err(e) => {
                warn!(to = %contact.email, error = %e, "delivery failed");
                RecipientOutcome::Bounced {
                    reason: e.to_string(),
                    smtp_code: e.reply_code().filter(|code| *code >= BOUNCE_CODE_MIN),
                }
            }
        }
    }
}
