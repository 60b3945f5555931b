//! Repositories: borrowed-pool wrappers with one method per query
//!
//! Counters on `sends` are updated in SQL, never read-modify-write.

pub mod contacts;
pub mod lists;
pub mod sends;
pub mod tracking;
pub mod users;

pub use contacts::{Contact, ContactRepo};
pub use lists::{ImportSummary, ListRepo, MailingList};
pub use sends::{
    NewSend, RecipientOutcome, SendDetail, SendOverview, SendRecord, SendRepo, SendStats,
    SendStatus, SendSummary,
};
pub use tracking::TrackingRepo;
pub use users::{NewUser, SmtpSettings, UserProfile, UserRecord, UserRepo, UserUpdate};

/// Database error type
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("{resource} already exists")]
    Conflict { resource: &'static str },
}

impl DbError {
    pub(crate) fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Map a unique-constraint violation to `Conflict`, anything else to `Sqlx`.
    pub(crate) fn conflict_or(err: sqlx::Error, resource: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict { resource },
            _ => Self::Sqlx(err),
        }
    }
}
