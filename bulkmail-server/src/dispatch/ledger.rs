//! Persistence seam of the dispatcher
//!
//! Provides a trait over everything a send reads and writes, with:
//! - Postgres implementation composing the repositories
//! - In-memory implementation for testing

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::{
    Contact, DbError, ListRepo, NewSend, RecipientOutcome, SendRepo, SendStatus, UserRecord,
    UserRepo,
};

/// Storage used by a send (testable)
#[async_trait]
pub trait SendLedger: Send + Sync {
    /// Members of the target list, ordered by email.
    async fn recipients(&self, list_id: i64) -> Result<Vec<Contact>, DbError>;

    async fn sender(&self, user_id: i64) -> Result<Option<UserRecord>, DbError>;

    /// Create the send row in `sending` state and return its id.
    async fn open(&self, send: &NewSend) -> Result<i64, DbError>;

    async fn record(
        &self,
        send_id: i64,
        contact_id: i64,
        outcome: &RecipientOutcome,
    ) -> Result<(), DbError>;

    async fn complete(&self, send_id: i64, sent: i32, bounced: i32) -> Result<(), DbError>;

    async fn fail(&self, send_id: i64, message: &str) -> Result<(), DbError>;
}

/// Postgres-backed ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendLedger for PgLedger {
    async fn recipients(&self, list_id: i64) -> Result<Vec<Contact>, DbError> {
        ListRepo::new(&self.pool).contacts(list_id).await
    }

    async fn sender(&self, user_id: i64) -> Result<Option<UserRecord>, DbError> {
        UserRepo::new(&self.pool).find(user_id).await
    }

    async fn open(&self, send: &NewSend) -> Result<i64, DbError> {
        SendRepo::new(&self.pool).open(send).await
    }

    async fn record(
        &self,
        send_id: i64,
        contact_id: i64,
        outcome: &RecipientOutcome,
    ) -> Result<(), DbError> {
        SendRepo::new(&self.pool)
            .record(send_id, contact_id, outcome)
            .await
    }

    async fn complete(&self, send_id: i64, sent: i32, bounced: i32) -> Result<(), DbError> {
        SendRepo::new(&self.pool)
            .complete(send_id, sent, bounced)
            .await
    }

    async fn fail(&self, send_id: i64, message: &str) -> Result<(), DbError> {
        SendRepo::new(&self.pool).fail(send_id, message).await
    }
}

/// Final state of a send held by `MemoryLedger`
#[derive(Debug, Clone)]
pub struct MemorySend {
    pub send: NewSend,
    pub status: SendStatus,
    pub sent: i32,
    pub bounced: i32,
    pub error_message: Option<String>,
}

/// In-memory ledger for testing
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<i64, Vec<Contact>>,
    users: HashMap<i64, UserRecord>,
    sends: Vec<MemorySend>,
    outcomes: Vec<(i64, i64, RecipientOutcome)>,
    fail_records: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_list(&self, list_id: i64, emails: &[&str]) {
        let contacts = emails
            .iter()
            .enumerate()
            .map(|(i, email)| Contact {
                id: list_id * 100_000 + i as i64,
                email: (*email).to_string(),
            })
            .collect();
        self.lock().lists.insert(list_id, contacts);
    }

    pub fn add_user(&self, user: UserRecord) {
        self.lock().users.insert(user.id, user);
    }

    /// Make every `record` call fail.
    pub fn fail_records(&self) {
        self.lock().fail_records = true;
    }

    /// Sends in creation order; the id of each is its index plus one.
    pub fn sends(&self) -> Vec<MemorySend> {
        self.lock().sends.clone()
    }

    /// Recorded outcomes as `(send_id, contact_id, outcome)`.
    pub fn outcomes(&self) -> Vec<(i64, i64, RecipientOutcome)> {
        self.lock().outcomes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_send(&self, send_id: i64, update: impl FnOnce(&mut MemorySend)) -> Result<(), DbError> {
        let mut state = self.lock();
        let send = usize::try_from(send_id - 1)
            .ok()
            .and_then(|idx| state.sends.get_mut(idx))
            .ok_or_else(|| DbError::not_found("send", send_id))?;
        update(send);
        Ok(())
    }
}

#[async_trait]
impl SendLedger for MemoryLedger {
    async fn recipients(&self, list_id: i64) -> Result<Vec<Contact>, DbError> {
        let mut contacts = self.lock().lists.get(&list_id).cloned().unwrap_or_default();
        contacts.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(contacts)
    }

    async fn sender(&self, user_id: i64) -> Result<Option<UserRecord>, DbError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn open(&self, send: &NewSend) -> Result<i64, DbError> {
        let mut state = self.lock();
        state.sends.push(MemorySend {
            send: send.clone(),
            status: SendStatus::Sending,
            sent: 0,
            bounced: 0,
            error_message: None,
        });
        Ok(state.sends.len() as i64)
    }

    async fn record(
        &self,
        send_id: i64,
        contact_id: i64,
        outcome: &RecipientOutcome,
    ) -> Result<(), DbError> {
        let mut state = self.lock();
        if state.fail_records {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        state.outcomes.push((send_id, contact_id, outcome.clone()));
        Ok(())
    }

    async fn complete(&self, send_id: i64, sent: i32, bounced: i32) -> Result<(), DbError> {
        self.with_send(send_id, |send| {
            send.status = SendStatus::Completed;
            send.sent = sent;
            send.bounced = bounced;
        })
    }

    async fn fail(&self, send_id: i64, message: &str) -> Result<(), DbError> {
        self.with_send(send_id, |send| {
            send.status = SendStatus::Error;
            send.error_message = Some(message.to_string());
        })
    }
}
